use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TsdbError {
    #[error("invalid magic number {actual:#010x}, expected {expected:#010x}")]
    InvalidMagic { expected: u32, actual: u32 },

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),

    #[error("{}: size 0: empty file", .0.display())]
    EmptyFile(PathBuf),

    #[error("checksum mismatch in {what}: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        what: String,
        expected: u32,
        computed: u32,
    },

    #[error("corrupt data at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("open index file: {0}")]
    OpenIndex(Box<TsdbError>),

    #[error("segment {name}: {source}")]
    Segment {
        name: String,
        #[source]
        source: Box<TsdbError>,
    },

    #[error("index contains {0} postings with out of order labels")]
    OutOfOrderLabels(usize),

    #[error("index contains {count} chunks outside of the block time range [{min_time}, {max_time}]")]
    ChunksOutsideRange {
        count: usize,
        min_time: i64,
        max_time: i64,
    },

    #[error("chunk reference {0:#018x} does not point at a chunk")]
    DanglingChunkRef(u64),

    #[error("verification cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TsdbError {
    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            offset: offset as u64,
            reason: reason.into(),
        }
    }
}

pub type TsdbResult<T> = Result<T, TsdbError>;
