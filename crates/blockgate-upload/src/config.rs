use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of block validations allowed to run at once.
pub const DEFAULT_MAX_VALIDATION_CONCURRENCY: usize = 5;

/// Interval between `validation.json` heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Age after which a validation record is considered abandoned.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Largest accepted `meta.json` request body.
pub const MAX_META_SIZE_BYTES: usize = 1024 * 1024;

/// Configuration of the upload pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Validations allowed to run concurrently across all tenants.
    /// Zero means unlimited.
    pub max_validation_concurrency: usize,
    #[serde(rename = "heartbeat_interval_secs", with = "duration_secs")]
    pub heartbeat_interval: Duration,
    #[serde(rename = "heartbeat_timeout_secs", with = "duration_secs")]
    pub heartbeat_timeout: Duration,
    /// Scratch space where blocks are staged for validation.
    pub data_dir: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_validation_concurrency: DEFAULT_MAX_VALIDATION_CONCURRENCY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// (De)serialize a [`Duration`] as whole seconds.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
