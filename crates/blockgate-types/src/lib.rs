//! Foundation types for blockgate.
//!
//! blockgate accepts pre-built time-series blocks pushed by external clients
//! and validates them before they join the durable corpus. This crate holds
//! the vocabulary shared by every other crate.
//!
//! # Key Types
//!
//! - [`BlockId`]: ULID identifying a block
//! - [`Meta`]: block metadata as stored in `meta.json`
//! - [`BlockFile`]: a file descriptor (relative path and size)
//! - [`ShardId`]: parsed `"<i>_of_<n>"` shard label value
//!
//! Object naming lives in [`paths`].

pub mod block_id;
pub mod error;
pub mod meta;
pub mod paths;
pub mod shard;

pub use block_id::BlockId;
pub use error::TypeError;
pub use meta::{
    total_size, BlockDesc, BlockFile, BlockStats, Compaction, Downsample, ExtMeta, Meta,
    TSDB_VERSION_1, UPLOAD_SOURCE,
};
pub use shard::{ShardId, COMPACTOR_SHARD_ID_LABEL};
