use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::block_id::BlockId;
use crate::error::TypeError;
use crate::paths::META_FILENAME;

/// The only block format version accepted for upload.
pub const TSDB_VERSION_1: u32 = 1;

/// Source tag stamped on blocks that arrived through the upload API.
pub const UPLOAD_SOURCE: &str = "upload";

/// Block metadata, serialized as `meta.json`.
///
/// Field names follow the on-disk JSON layout shared with the rest of the
/// block ecosystem. Optional sections are skipped when empty so that a
/// decoded and re-encoded document is byte-for-byte stable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub ulid: BlockId,
    #[serde(rename = "minTime")]
    pub min_time: i64,
    #[serde(rename = "maxTime")]
    pub max_time: i64,
    #[serde(default, skip_serializing_if = "BlockStats::is_empty")]
    pub stats: BlockStats,
    #[serde(default)]
    pub compaction: Compaction,
    pub version: u32,
    #[serde(rename = "thanos", default)]
    pub ext: ExtMeta,
}

/// Summary counters of a block's content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStats {
    #[serde(rename = "numSamples", default, skip_serializing_if = "is_zero")]
    pub num_samples: u64,
    #[serde(rename = "numSeries", default, skip_serializing_if = "is_zero")]
    pub num_series: u64,
    #[serde(rename = "numChunks", default, skip_serializing_if = "is_zero")]
    pub num_chunks: u64,
}

impl BlockStats {
    fn is_empty(&self) -> bool {
        self.num_samples == 0 && self.num_series == 0 && self.num_chunks == 0
    }
}

/// Compaction lineage of a block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compaction {
    #[serde(default)]
    pub level: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<BlockId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<BlockDesc>>,
}

/// Reference to a parent block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDesc {
    pub ulid: BlockId,
    #[serde(rename = "minTime")]
    pub min_time: i64,
    #[serde(rename = "maxTime")]
    pub max_time: i64,
}

/// Storage-level extension of the metadata: external labels, downsampling,
/// origin and the list of files making up the block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtMeta {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub downsample: Downsample,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<BlockFile>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downsample {
    #[serde(default)]
    pub resolution: i64,
}

/// One file of a block, relative to the block directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFile {
    pub rel_path: String,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub size_bytes: i64,
}

impl BlockFile {
    pub fn new(rel_path: impl Into<String>, size_bytes: i64) -> Self {
        Self {
            rel_path: rel_path.into(),
            size_bytes,
        }
    }

    /// Whether this entry describes the metadata file itself.
    pub fn is_meta(&self) -> bool {
        self.rel_path == META_FILENAME
    }
}

impl Meta {
    /// Decode from JSON.
    pub fn from_json(data: &[u8]) -> Result<Self, TypeError> {
        serde_json::from_slice(data).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Encode as JSON followed by a newline.
    pub fn to_json(&self) -> Result<Vec<u8>, TypeError> {
        let mut buf =
            serde_json::to_vec(self).map_err(|e| TypeError::Serialization(e.to_string()))?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Look up a file entry by relative path.
    pub fn file(&self, rel_path: &str) -> Option<&BlockFile> {
        self.ext.files.iter().find(|f| f.rel_path == rel_path)
    }

    /// Total declared size of all files, see [`total_size`].
    pub fn block_bytes(&self) -> Result<i64, TypeError> {
        total_size(&self.ext.files)
    }
}

/// Sum of the declared sizes of `files`.
///
/// Negative sizes and arithmetic overflow are errors rather than being
/// clamped, so a crafted file list cannot slip under a size limit.
pub fn total_size(files: &[BlockFile]) -> Result<i64, TypeError> {
    files.iter().try_fold(0i64, |acc, f| {
        if f.size_bytes < 0 {
            return Err(TypeError::NegativeFileSize);
        }
        acc.checked_add(f.size_bytes).ok_or(TypeError::SizeOverflow)
    })
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"ulid":"01G3FZ0JWJYJC0ZM6Y9S4VRJWC","minTime":1000,"maxTime":2000,"stats":{"numSamples":300,"numSeries":3,"numChunks":3},"compaction":{"level":1,"sources":["01G3FZ0JWJYJC0ZM6Y9S4VRJWC"]},"version":1,"thanos":{"labels":{"__compactor_shard_id__":"1_of_2"},"downsample":{"resolution":0},"source":"receive","files":[{"rel_path":"chunks/000001","size_bytes":1024},{"rel_path":"index","size_bytes":256},{"rel_path":"meta.json"}]}}
"#;

    #[test]
    fn decode_sample() {
        let meta = Meta::from_json(SAMPLE.as_bytes()).unwrap();
        assert_eq!(meta.min_time, 1000);
        assert_eq!(meta.max_time, 2000);
        assert_eq!(meta.version, TSDB_VERSION_1);
        assert_eq!(meta.stats.num_series, 3);
        assert_eq!(meta.ext.files.len(), 3);
        assert_eq!(meta.file("index").unwrap().size_bytes, 256);
        assert!(meta.file("meta.json").unwrap().is_meta());
        assert_eq!(meta.compaction.parents, None);
    }

    #[test]
    fn reencode_is_byte_stable() {
        let meta = Meta::from_json(SAMPLE.as_bytes()).unwrap();
        let encoded = meta.to_json().unwrap();
        assert_eq!(String::from_utf8(encoded).unwrap(), SAMPLE);
    }

    #[test]
    fn missing_sections_default() {
        let meta = Meta::from_json(br#"{"ulid":"01G3FZ0JWJYJC0ZM6Y9S4VRJWC","minTime":0,"maxTime":0,"version":1}"#)
            .unwrap();
        assert!(meta.ext.files.is_empty());
        assert!(meta.ext.labels.is_empty());
        assert_eq!(meta.ext.downsample.resolution, 0);
    }

    #[test]
    fn malformed_json_is_error() {
        assert!(Meta::from_json(b"{").is_err());
        assert!(Meta::from_json(b"").is_err());
        assert!(Meta::from_json(br#"{"ulid":"bogus","minTime":0,"maxTime":0,"version":1}"#).is_err());
    }

    #[test]
    fn total_size_sums() {
        let files = vec![BlockFile::new("index", 10), BlockFile::new("chunks/000001", 20)];
        assert_eq!(total_size(&files).unwrap(), 30);
        assert_eq!(total_size(&[]).unwrap(), 0);
    }

    #[test]
    fn total_size_rejects_negative() {
        let files = vec![BlockFile::new("index", 10), BlockFile::new("chunks/000001", -1)];
        assert_eq!(total_size(&files), Err(TypeError::NegativeFileSize));
    }

    #[test]
    fn total_size_rejects_overflow() {
        let files = vec![
            BlockFile::new("index", i64::MAX),
            BlockFile::new("chunks/000001", 1),
        ];
        assert_eq!(total_size(&files), Err(TypeError::SizeOverflow));
    }
}
