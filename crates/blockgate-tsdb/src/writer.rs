use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use blockgate_types::paths::{base_name, segment_path, CHUNKS_DIRNAME, INDEX_FILENAME, META_FILENAME};
use blockgate_types::{BlockFile, BlockId, BlockStats, Compaction, ExtMeta, Meta, TSDB_VERSION_1};
use tracing::debug;

use crate::chunks::{encode_samples, ChunkEncoding, ChunkRef, Sample, SegmentWriter, DEFAULT_MAX_SEGMENT_SIZE};
use crate::error::{TsdbError, TsdbResult};
use crate::index::{ChunkMeta, IndexWriter};
use crate::labels::Labels;

/// Samples per chunk before a new chunk is cut.
pub const SAMPLES_PER_CHUNK: usize = 120;

/// Writes a complete block directory: chunk segments, index and `meta.json`.
///
/// ```text
/// <parent>/<block id>/
///     chunks/000001
///     index
///     meta.json
/// ```
pub struct BlockWriter {
    id: BlockId,
    min_time: i64,
    max_time: i64,
    labels: BTreeMap<String, String>,
    series: Vec<(Labels, Vec<Sample>)>,
    max_segment_size: usize,
}

impl BlockWriter {
    pub fn new(min_time: i64, max_time: i64) -> Self {
        Self {
            id: BlockId::new(),
            min_time,
            max_time,
            labels: BTreeMap::new(),
            series: Vec::new(),
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
        }
    }

    pub fn with_id(mut self, id: BlockId) -> Self {
        self.id = id;
        self
    }

    /// External labels recorded in `meta.json`.
    pub fn with_external_label(mut self, name: &str, value: &str) -> Self {
        self.labels.insert(name.to_string(), value.to_string());
        self
    }

    /// Start a new segment once the current one grows past `bytes`.
    pub fn with_max_segment_size(mut self, bytes: usize) -> Self {
        self.max_segment_size = bytes;
        self
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn add_series(&mut self, labels: Labels, samples: Vec<Sample>) {
        self.series.push((labels, samples));
    }

    /// Write the block under `parent` and return its directory.
    pub fn write(self, parent: &Path) -> TsdbResult<PathBuf> {
        let dir = parent.join(self.id.to_string());
        let chunks_dir = dir.join(CHUNKS_DIRNAME);
        std::fs::create_dir_all(&chunks_dir)?;

        let mut stats = BlockStats::default();
        let mut index = IndexWriter::new();
        let mut seq = 1u32;
        let mut segment = SegmentWriter::new();

        for (labels, samples) in &self.series {
            let mut metas = Vec::new();
            for chunk in samples.chunks(SAMPLES_PER_CHUNK) {
                if !segment.is_empty() && segment.len() >= self.max_segment_size {
                    flush_segment(&chunks_dir, seq, std::mem::take(&mut segment))?;
                    seq += 1;
                }
                let offset = segment.append(ChunkEncoding::Raw, &encode_samples(chunk));
                metas.push(ChunkMeta {
                    min_time: chunk[0].timestamp,
                    max_time: chunk[chunk.len() - 1].timestamp,
                    chunk_ref: ChunkRef::new(seq, offset),
                });
                stats.num_chunks += 1;
                stats.num_samples += chunk.len() as u64;
            }
            stats.num_series += 1;
            index.add_series(labels.clone(), metas);
        }
        flush_segment(&chunks_dir, seq, segment)?;
        std::fs::write(dir.join(INDEX_FILENAME), index.finish())?;

        let meta = Meta {
            ulid: self.id,
            min_time: self.min_time,
            max_time: self.max_time,
            stats,
            compaction: Compaction {
                level: 1,
                sources: vec![self.id],
                parents: None,
            },
            version: TSDB_VERSION_1,
            ext: ExtMeta {
                labels: self.labels,
                files: gather_file_stats(&dir)?,
                ..Default::default()
            },
        };
        let json = meta
            .to_json()
            .map_err(|e| TsdbError::Serialization(e.to_string()))?;
        std::fs::write(dir.join(META_FILENAME), json)?;

        debug!(block = %self.id, segments = seq, "block written");
        Ok(dir)
    }
}

fn flush_segment(chunks_dir: &Path, seq: u32, segment: SegmentWriter) -> TsdbResult<()> {
    let name = segment_path(seq);
    std::fs::write(chunks_dir.join(base_name(&name)), segment.finish())?;
    Ok(())
}

/// Describe the files of the block at `dir`: every chunk segment and the
/// index with their sizes, plus a sizeless `meta.json` entry. Sorted by path.
pub fn gather_file_stats(dir: &Path) -> TsdbResult<Vec<BlockFile>> {
    let mut files = Vec::new();

    let chunks_dir = dir.join(CHUNKS_DIRNAME);
    for entry in walkdir::WalkDir::new(&chunks_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(walk_error)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let size = entry.metadata().map_err(walk_error)?.len();
        files.push(BlockFile::new(
            format!("{CHUNKS_DIRNAME}/{}", entry.file_name().to_string_lossy()),
            size as i64,
        ));
    }

    let index_size = std::fs::metadata(dir.join(INDEX_FILENAME))?.len();
    files.push(BlockFile::new(INDEX_FILENAME, index_size as i64));
    files.push(BlockFile::new(META_FILENAME, 0));
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

fn walk_error(e: walkdir::Error) -> TsdbError {
    let msg = e.to_string();
    match e.into_io_error() {
        Some(io) => TsdbError::Io(io),
        None => TsdbError::corrupt(0, msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexReader;

    fn samples(from: i64, n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample {
                timestamp: from + i as i64 * 1_000,
                value: i as f64,
            })
            .collect()
    }

    #[test]
    fn writes_block_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let mut w = BlockWriter::new(0, 1_000_000).with_external_label("__compactor_shard_id__", "1_of_2");
        w.add_series(Labels::from_pairs(&[("job", "a")]), samples(0, 300));
        w.add_series(Labels::from_pairs(&[("job", "b")]), samples(500, 5));
        let id = w.id();
        let dir = w.write(tmp.path()).unwrap();

        assert_eq!(dir, tmp.path().join(id.to_string()));
        let meta = Meta::from_json(&std::fs::read(dir.join(META_FILENAME)).unwrap()).unwrap();
        assert_eq!(meta.ulid, id);
        assert_eq!(meta.stats.num_series, 2);
        assert_eq!(meta.stats.num_chunks, 4);
        assert_eq!(meta.stats.num_samples, 305);
        assert_eq!(meta.compaction.sources, vec![id]);
        assert_eq!(meta.ext.labels["__compactor_shard_id__"], "1_of_2");

        let paths: Vec<_> = meta.ext.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["chunks/000001", "index", "meta.json"]);
        let index_size = std::fs::metadata(dir.join("index")).unwrap().len() as i64;
        assert_eq!(meta.file("index").unwrap().size_bytes, index_size);

        let index = IndexReader::open(&dir.join("index")).unwrap();
        assert_eq!(index.series().len(), 2);
    }

    #[test]
    fn empty_block_still_has_a_segment() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = BlockWriter::new(0, 10).write(tmp.path()).unwrap();
        let seg = std::fs::metadata(dir.join("chunks/000001")).unwrap();
        assert_eq!(seg.len(), 8);
    }

    #[test]
    fn rolls_segments() {
        let tmp = tempfile::tempdir().unwrap();
        let mut w = BlockWriter::new(0, 10_000_000).with_max_segment_size(64);
        for i in 0..4 {
            let v = i.to_string();
            w.add_series(Labels::from_pairs(&[("i", v.as_str())]), samples(0, 10));
        }
        let dir = w.write(tmp.path()).unwrap();
        let files = gather_file_stats(&dir).unwrap();
        let segments = files.iter().filter(|f| f.rel_path.starts_with("chunks/")).count();
        assert!(segments > 1, "{files:?}");
    }
}
