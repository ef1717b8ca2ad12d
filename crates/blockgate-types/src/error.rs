use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid block ID: {0}")]
    InvalidBlockId(String),

    #[error("invalid shard ID label value: {0:?}")]
    InvalidShardId(String),

    #[error("invalid negative file size in block metadata")]
    NegativeFileSize,

    #[error("block size overflows")]
    SizeOverflow,

    #[error("serialization error: {0}")]
    Serialization(String),
}
