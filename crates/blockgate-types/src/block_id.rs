use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::TypeError;

/// Identifier of a block.
///
/// A `BlockId` is a ULID: 26 Crockford base32 characters encoding a
/// millisecond timestamp followed by 80 random bits, so IDs sort by creation
/// time. Anything that does not parse as a ULID is not a block ID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(Ulid);

impl BlockId {
    /// Length of the textual form.
    pub const ENCODED_LEN: usize = 26;

    /// Generate a fresh block ID for the current time.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Build a block ID from a millisecond timestamp and random bits.
    pub fn from_parts(timestamp_ms: u64, random: u128) -> Self {
        Self(Ulid::from_parts(timestamp_ms, random))
    }

    /// Parse the 26-character textual form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.len() != Self::ENCODED_LEN {
            return Err(TypeError::InvalidBlockId(s.to_string()));
        }
        Ulid::from_string(s)
            .map(Self)
            .map_err(|_| TypeError::InvalidBlockId(s.to_string()))
    }

    /// Milliseconds since the Unix epoch embedded in the ID.
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }

    /// The underlying ULID.
    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self(Ulid::nil())
    }
}

impl FromStr for BlockId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Ulid> for BlockId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}
