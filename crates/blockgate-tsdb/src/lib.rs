//! Block file format for blockgate.
//!
//! A block directory holds an `index`, one or more chunk segments under
//! `chunks/` and a `meta.json`:
//!
//! - [`index`] -- series, their chunk references and postings, each section
//!   guarded by a CRC32
//! - [`chunks`] -- segment files of CRC32-framed chunk records
//! - [`writer`] -- [`BlockWriter`] producing complete block directories
//! - [`verify`] -- [`verify_block`], the structural check run on uploads
//!
//! Verification never panics on malformed input: every read is bounds-checked
//! and corruption surfaces as a [`TsdbError`].

pub mod chunks;
mod encoding;
pub mod error;
pub mod index;
pub mod labels;
pub mod verify;
pub mod writer;

pub use chunks::{ChunkRef, Sample};
pub use error::{TsdbError, TsdbResult};
pub use index::{ChunkMeta, IndexReader, IndexWriter, SeriesEntry};
pub use labels::{Label, Labels};
pub use verify::{verify_block, verify_block_with, BlockHealth, VerifyOptions};
pub use writer::{gather_file_stats, BlockWriter};
