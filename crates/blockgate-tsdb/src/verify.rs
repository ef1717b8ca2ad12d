use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use blockgate_types::paths::{CHUNKS_DIRNAME, INDEX_FILENAME, SEGMENT_DIGITS};
use tracing::{debug, warn};

use crate::chunks::{map_segment, verify_segment};
use crate::error::{TsdbError, TsdbResult};
use crate::index::IndexReader;

/// Series between two cancellation polls while scanning the index.
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// What to check and against which time range.
#[derive(Clone, Copy, Debug)]
pub struct VerifyOptions {
    pub min_time: i64,
    pub max_time: i64,
    /// Also open every chunk segment and verify record checksums.
    pub check_chunks: bool,
}

/// Summary of a block that passed verification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockHealth {
    pub num_series: usize,
    pub num_chunks: usize,
    pub segments_checked: usize,
}

/// Verify the block directory `dir`.
pub fn verify_block(dir: &Path, opts: &VerifyOptions) -> TsdbResult<BlockHealth> {
    verify_block_with(dir, opts, &|| false)
}

/// Verify the block directory `dir`, polling `is_cancelled` between units of
/// work and returning [`TsdbError::Cancelled`] once it reports true.
///
/// Checks, in order:
///
/// 1. the index opens: non-empty, valid magic and version, section checksums
/// 2. every series in posting order has strictly sorted labels
/// 3. every chunk lies inside `[min_time, max_time]`
/// 4. with `check_chunks`, every segment has a valid header and record
///    checksums, and every chunk reference resolves to a record
pub fn verify_block_with(
    dir: &Path,
    opts: &VerifyOptions,
    is_cancelled: &dyn Fn() -> bool,
) -> TsdbResult<BlockHealth> {
    let index = IndexReader::open(&dir.join(INDEX_FILENAME))
        .map_err(|e| TsdbError::OpenIndex(Box::new(e)))?;

    let mut health = BlockHealth {
        num_series: index.series().len(),
        ..Default::default()
    };
    let mut out_of_order = 0;
    let mut outside = 0;
    for (i, series) in index.series_by_postings().enumerate() {
        if i % CANCEL_CHECK_INTERVAL == 0 && is_cancelled() {
            return Err(TsdbError::Cancelled);
        }
        if !series.labels.is_strictly_sorted() {
            warn!(labels = %series.labels, "series with out of order labels");
            out_of_order += 1;
        }
        for c in &series.chunks {
            if c.min_time < opts.min_time || c.max_time > opts.max_time {
                outside += 1;
            }
        }
        health.num_chunks += series.chunks.len();
    }
    if out_of_order > 0 {
        return Err(TsdbError::OutOfOrderLabels(out_of_order));
    }
    if outside > 0 {
        return Err(TsdbError::ChunksOutsideRange {
            count: outside,
            min_time: opts.min_time,
            max_time: opts.max_time,
        });
    }

    if opts.check_chunks {
        let records = verify_segments(&dir.join(CHUNKS_DIRNAME), is_cancelled)?;
        health.segments_checked = records.len();
        for series in index.series() {
            for c in &series.chunks {
                let found = records
                    .get(&c.chunk_ref.segment())
                    .is_some_and(|offs| offs.contains(&c.chunk_ref.offset()));
                if !found {
                    return Err(TsdbError::DanglingChunkRef(c.chunk_ref.0));
                }
            }
        }
    }

    debug!(
        dir = %dir.display(),
        series = health.num_series,
        chunks = health.num_chunks,
        segments = health.segments_checked,
        "block verified"
    );
    Ok(health)
}

/// Verify every segment under `chunks_dir`, returning record offsets keyed by
/// segment sequence number.
fn verify_segments(
    chunks_dir: &Path,
    is_cancelled: &dyn Fn() -> bool,
) -> TsdbResult<BTreeMap<u32, BTreeSet<u32>>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(chunks_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    let mut records = BTreeMap::new();
    for name in names {
        let rel = format!("{CHUNKS_DIRNAME}/{name}");
        let seq = parse_segment_name(&name).ok_or_else(|| TsdbError::Segment {
            name: rel.clone(),
            source: Box::new(TsdbError::corrupt(0, "not a chunk segment name")),
        })?;
        let wrap = |e: TsdbError| TsdbError::Segment {
            name: rel.clone(),
            source: Box::new(e),
        };
        let map = map_segment(&chunks_dir.join(&name)).map_err(wrap)?;
        let offsets = verify_segment(&map, is_cancelled).map_err(|e| match e {
            TsdbError::Cancelled => e,
            other => wrap(other),
        })?;
        records.insert(seq, offsets.into_iter().collect());
    }
    Ok(records)
}

fn parse_segment_name(name: &str) -> Option<u32> {
    if name.len() != SEGMENT_DIGITS || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::chunks::{Sample, SegmentWriter};
    use crate::labels::Labels;
    use crate::writer::BlockWriter;

    const MAX_TIME: i64 = 1_000_000;

    fn opts(check_chunks: bool) -> VerifyOptions {
        VerifyOptions {
            min_time: 0,
            max_time: MAX_TIME,
            check_chunks,
        }
    }

    fn samples(from: i64, n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample {
                timestamp: from + i as i64 * 1_000,
                value: 1.0,
            })
            .collect()
    }

    fn write_block(tmp: &Path, series: Vec<(Labels, Vec<Sample>)>) -> PathBuf {
        let mut w = BlockWriter::new(0, MAX_TIME);
        for (labels, s) in series {
            w.add_series(labels, s);
        }
        w.write(tmp).unwrap()
    }

    fn healthy_block(tmp: &Path) -> PathBuf {
        write_block(
            tmp,
            vec![
                (Labels::from_pairs(&[("a", "1"), ("b", "2")]), samples(0, 200)),
                (Labels::from_pairs(&[("a", "2")]), samples(10, 3)),
            ],
        )
    }

    fn flip_byte(path: &Path, at: usize) {
        let mut data = std::fs::read(path).unwrap();
        data[at] ^= 0xFF;
        std::fs::write(path, data).unwrap();
    }

    #[test]
    fn healthy() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = healthy_block(tmp.path());
        let h = verify_block(&dir, &opts(true)).unwrap();
        assert_eq!(h.num_series, 2);
        assert_eq!(h.num_chunks, 3);
        assert_eq!(h.segments_checked, 1);
    }

    #[test]
    fn missing_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = healthy_block(tmp.path());
        std::fs::remove_file(dir.join("index")).unwrap();
        let err = verify_block(&dir, &opts(false)).unwrap_err();
        assert!(err.to_string().starts_with("open index file"), "{err}");
    }

    #[test]
    fn empty_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = healthy_block(tmp.path());
        std::fs::write(dir.join("index"), b"").unwrap();
        let err = verify_block(&dir, &opts(false)).unwrap_err();
        assert!(err.to_string().contains("size 0"), "{err}");
    }

    #[test]
    fn index_magic_flipped() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = healthy_block(tmp.path());
        flip_byte(&dir.join("index"), 0);
        let err = verify_block(&dir, &opts(false)).unwrap_err();
        assert!(err.to_string().contains("invalid magic number"), "{err}");
    }

    #[test]
    fn out_of_order_labels() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_block(
            tmp.path(),
            vec![
                (Labels::from_unsorted(&[("d", "4"), ("a", "1")]), samples(0, 5)),
                (Labels::from_pairs(&[("a", "1"), ("b", "1")]), samples(0, 5)),
            ],
        );
        let err = verify_block(&dir, &opts(false)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "index contains 1 postings with out of order labels"
        );
    }

    #[test]
    fn chunks_outside_block_range() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_block(
            tmp.path(),
            vec![(Labels::from_pairs(&[("a", "1")]), samples(MAX_TIME - 1_000, 5))],
        );
        let err = verify_block(&dir, &opts(false)).unwrap_err();
        assert!(matches!(err, TsdbError::ChunksOutsideRange { count: 1, .. }), "{err}");
    }

    #[test]
    fn segment_magic_flipped() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = healthy_block(tmp.path());
        flip_byte(&dir.join("chunks/000001"), 0);
        let err = verify_block(&dir, &opts(true)).unwrap_err();
        assert!(err.to_string().contains("invalid magic number"), "{err}");
        assert!(err.to_string().contains("chunks/000001"), "{err}");

        // Chunk checks are opt-in.
        verify_block(&dir, &opts(false)).unwrap();
    }

    #[test]
    fn segment_data_flipped() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = healthy_block(tmp.path());
        flip_byte(&dir.join("chunks/000001"), 12);
        let err = verify_block(&dir, &opts(true)).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"), "{err}");
    }

    #[test]
    fn empty_segment_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = healthy_block(tmp.path());
        std::fs::write(dir.join("chunks/000001"), b"").unwrap();
        let err = verify_block(&dir, &opts(true)).unwrap_err();
        assert!(err.to_string().contains("size 0"), "{err}");
    }

    #[test]
    fn dangling_chunk_reference() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = healthy_block(tmp.path());
        std::fs::write(dir.join("chunks/000001"), SegmentWriter::new().finish()).unwrap();
        let err = verify_block(&dir, &opts(true)).unwrap_err();
        assert!(matches!(err, TsdbError::DanglingChunkRef(_)), "{err}");
    }

    #[test]
    fn cancellation() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = healthy_block(tmp.path());
        let err = verify_block_with(&dir, &opts(true), &|| true).unwrap_err();
        assert!(matches!(err, TsdbError::Cancelled));
    }

    #[test]
    fn segment_names() {
        assert_eq!(parse_segment_name("000001"), Some(1));
        assert_eq!(parse_segment_name("1"), None);
        assert_eq!(parse_segment_name("00000a"), None);
    }
}
