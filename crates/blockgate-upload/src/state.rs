//! Upload state, derived purely from which objects exist.
//!
//! Nothing stores the state of an upload. It is recomputed on every request
//! from three observations: whether `meta.json` exists, whether
//! `uploading-meta.json` exists, and the content of `validation.json`. A
//! crash at any point therefore leaves a state that can be derived again.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Content of `validation.json`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// Unix milliseconds of the last heartbeat or outcome.
    #[serde(rename = "LastUpdate")]
    pub last_update_ms: i64,
    /// Validation failure, empty while running.
    #[serde(rename = "Error", default)]
    pub error: String,
}

impl ValidationRecord {
    pub fn heartbeat(now_ms: i64) -> Self {
        Self {
            last_update_ms: now_ms,
            error: String::new(),
        }
    }

    pub fn failed(now_ms: i64, error: impl Into<String>) -> Self {
        Self {
            last_update_ms: now_ms,
            error: error.into(),
        }
    }

    /// Whether the record was updated less than `timeout` before `now_ms`.
    pub fn is_fresh(&self, now_ms: i64, timeout: Duration) -> bool {
        let age = now_ms.saturating_sub(self.last_update_ms);
        age < timeout.as_millis().min(i64::MAX as u128) as i64
    }
}

/// State of a block upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockUploadState {
    /// `meta.json` exists.
    Complete,
    /// Neither metadata object exists.
    NotStarted,
    /// Upload started; no validation running, or an abandoned one.
    Uploading,
    /// A validation is running and heartbeating.
    Validating,
    /// The most recent validation failed with this error.
    Failed(String),
}

impl BlockUploadState {
    /// Name reported to clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::NotStarted => "not-found",
            Self::Uploading => "uploading",
            Self::Validating => "validating",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for BlockUploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the state of an upload.
///
/// Priority: a final `meta.json` wins over everything; without in-flight
/// metadata the block does not exist; a fresh validation record means
/// validating or failed; anything else, including a stale record, is a plain
/// upload in progress.
pub fn derive_state(
    meta_exists: bool,
    uploading_meta_exists: bool,
    validation: Option<&ValidationRecord>,
    now_ms: i64,
    heartbeat_timeout: Duration,
) -> BlockUploadState {
    if meta_exists {
        return BlockUploadState::Complete;
    }
    if !uploading_meta_exists {
        return BlockUploadState::NotStarted;
    }
    match validation {
        Some(v) if v.is_fresh(now_ms, heartbeat_timeout) => {
            if v.error.is_empty() {
                BlockUploadState::Validating
            } else {
                BlockUploadState::Failed(v.error.clone())
            }
        }
        _ => BlockUploadState::Uploading,
    }
}

/// JSON body answering a state query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUploadStateResponse {
    pub result: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl From<&BlockUploadState> for BlockUploadStateResponse {
    fn from(state: &BlockUploadState) -> Self {
        let error = match state {
            BlockUploadState::Failed(e) => e.clone(),
            _ => String::new(),
        };
        Self {
            result: state.as_str().to_string(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(300);
    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn record_wire_format() {
        let r = ValidationRecord::failed(123, "boom");
        assert_eq!(
            serde_json::to_string(&r).unwrap(),
            r#"{"LastUpdate":123,"Error":"boom"}"#
        );
        let back: ValidationRecord = serde_json::from_str(r#"{"LastUpdate":5}"#).unwrap();
        assert_eq!(back, ValidationRecord::heartbeat(5));
    }

    #[test]
    fn states() {
        let fresh = ValidationRecord::heartbeat(NOW - 1_000);
        let failed = ValidationRecord::failed(NOW - 1_000, "bad index");
        let stale = ValidationRecord::heartbeat(NOW - 301_000);
        let stale_failed = ValidationRecord::failed(NOW - 301_000, "bad index");

        assert_eq!(derive_state(false, false, None, NOW, TIMEOUT), BlockUploadState::NotStarted);
        assert_eq!(derive_state(false, true, None, NOW, TIMEOUT), BlockUploadState::Uploading);
        assert_eq!(derive_state(false, true, Some(&fresh), NOW, TIMEOUT), BlockUploadState::Validating);
        assert_eq!(
            derive_state(false, true, Some(&failed), NOW, TIMEOUT),
            BlockUploadState::Failed("bad index".into())
        );
        assert_eq!(derive_state(false, true, Some(&stale), NOW, TIMEOUT), BlockUploadState::Uploading);
        assert_eq!(
            derive_state(false, true, Some(&stale_failed), NOW, TIMEOUT),
            BlockUploadState::Uploading
        );
        assert_eq!(derive_state(true, true, Some(&fresh), NOW, TIMEOUT), BlockUploadState::Complete);
    }

    #[test]
    fn freshness_boundary() {
        let r = ValidationRecord::heartbeat(NOW - 300_000);
        assert!(!r.is_fresh(NOW, TIMEOUT));
        assert!(r.is_fresh(NOW - 1, TIMEOUT));
        // Records from a clock that runs ahead still count as fresh.
        assert!(ValidationRecord::heartbeat(NOW + 10_000).is_fresh(NOW, TIMEOUT));
    }

    #[test]
    fn response_body() {
        let ok = BlockUploadStateResponse::from(&BlockUploadState::Validating);
        assert_eq!(serde_json::to_string(&ok).unwrap(), r#"{"result":"validating"}"#);
        let failed = BlockUploadStateResponse::from(&BlockUploadState::Failed("x".into()));
        assert_eq!(
            serde_json::to_string(&failed).unwrap(),
            r#"{"result":"failed","error":"x"}"#
        );
    }

    proptest! {
        #[test]
        fn complete_iff_meta_exists(
            meta in any::<bool>(),
            uploading in any::<bool>(),
            record in proptest::option::of((0i64..2 * NOW, ".{0,4}")),
        ) {
            let record = record.map(|(ts, e)| ValidationRecord::failed(ts, e));
            let state = derive_state(meta, uploading, record.as_ref(), NOW, TIMEOUT);
            prop_assert_eq!(state == BlockUploadState::Complete, meta);
        }

        #[test]
        fn stale_records_read_as_uploading(age in 300_000i64..10_000_000, error in ".{0,4}") {
            let record = ValidationRecord::failed(NOW - age, error);
            prop_assert_eq!(
                derive_state(false, true, Some(&record), NOW, TIMEOUT),
                BlockUploadState::Uploading
            );
        }
    }
}
