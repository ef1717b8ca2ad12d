use std::fmt;

use crate::error::TypeError;

/// External label carrying the shard a split block belongs to.
pub const COMPACTOR_SHARD_ID_LABEL: &str = "__compactor_shard_id__";

/// External labels written by older producers; dropped on upload.
pub const DEPRECATED_TENANT_ID_LABEL: &str = "__org_id__";
pub const DEPRECATED_INGESTER_ID_LABEL: &str = "__ingester_id__";
pub const DEPRECATED_SHARD_ID_LABEL: &str = "__shard_id__";

/// Position of a block among the siblings produced by a split.
///
/// The label value is `"<i>_of_<n>"` with a 1-based `i`; the parsed `index`
/// is 0-based, so `index < count` always holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShardId {
    pub index: u32,
    pub count: u32,
}

impl ShardId {
    /// Parse a shard label value such as `"2_of_4"`.
    pub fn parse(value: &str) -> Result<Self, TypeError> {
        let invalid = || TypeError::InvalidShardId(value.to_string());

        let (id, count) = value.split_once("_of_").ok_or_else(invalid)?;
        let id: u32 = parse_decimal(id).ok_or_else(invalid)?;
        let count: u32 = parse_decimal(count).ok_or_else(invalid)?;

        if id == 0 || count == 0 || id > count {
            return Err(invalid());
        }
        Ok(Self {
            index: id - 1,
            count,
        })
    }

    /// Label value for this shard.
    pub fn label_value(&self) -> String {
        format!("{}_of_{}", self.index + 1, self.count)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label_value())
    }
}

fn parse_decimal(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
