//! Object naming inside a tenant's bucket.
//!
//! ```text
//! <block>/meta.json             final metadata, written once
//! <block>/uploading-meta.json   in-flight metadata of an unfinished upload
//! <block>/validation.json       liveness/error record of a running validation
//! <block>/index                 block index
//! <block>/chunks/000001         chunk segment files
//! ```
//!
//! Tenant prefixes are added by the store layer, never here.

use crate::block_id::BlockId;

pub const META_FILENAME: &str = "meta.json";
pub const UPLOADING_META_FILENAME: &str = "uploading-meta.json";
pub const VALIDATION_FILENAME: &str = "validation.json";
pub const INDEX_FILENAME: &str = "index";
pub const CHUNKS_DIRNAME: &str = "chunks";

/// Number of digits in a chunk segment file name.
pub const SEGMENT_DIGITS: usize = 6;

/// Object name of `name` inside `block`.
pub fn block_object(block: &BlockId, name: &str) -> String {
    format!("{block}/{name}")
}

/// Relative path of chunk segment `seq`, e.g. `chunks/000001`.
pub fn segment_path(seq: u32) -> String {
    format!("{CHUNKS_DIRNAME}/{seq:0width$}", width = SEGMENT_DIGITS)
}

/// Whether `path` names a block data file: `index` or `chunks/NNNNNN`.
///
/// Anything else, including traversal like `../index`, is rejected.
pub fn is_block_data_path(path: &str) -> bool {
    if path == INDEX_FILENAME {
        return true;
    }
    match path
        .strip_prefix(CHUNKS_DIRNAME)
        .and_then(|rest| rest.strip_prefix('/'))
    {
        Some(seq) => seq.len() == SEGMENT_DIGITS && seq.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Final path component of a slash separated path.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
