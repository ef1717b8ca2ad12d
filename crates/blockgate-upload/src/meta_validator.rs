//! Validation and sanitization of uploaded block metadata.

use std::time::Duration;

use blockgate_types::paths::is_block_data_path;
use blockgate_types::shard::{
    DEPRECATED_INGESTER_ID_LABEL, DEPRECATED_SHARD_ID_LABEL, DEPRECATED_TENANT_ID_LABEL,
};
use blockgate_types::{
    total_size, BlockFile, BlockId, Meta, ShardId, TypeError, COMPACTOR_SHARD_ID_LABEL,
    TSDB_VERSION_1, UPLOAD_SOURCE,
};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::MAX_META_SIZE_BYTES;
use crate::error::{UploadError, UploadResult, ValidationError};

const MAX_TENANT_ID_LENGTH: usize = 150;

/// Check a tenant ID: non-empty, at most 150 characters, only
/// `[A-Za-z0-9!-_.*'()]`, and neither `.` nor `..`.
pub fn validate_tenant_id(tenant: &str) -> UploadResult<()> {
    let valid = !tenant.is_empty()
        && tenant.len() <= MAX_TENANT_ID_LENGTH
        && tenant != "."
        && tenant != ".."
        && tenant
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!-_.*'()".contains(c));
    if valid {
        Ok(())
    } else {
        Err(UploadError::bad_request("invalid tenant ID"))
    }
}

/// Decode a `meta.json` request body.
pub fn parse_meta(body: &[u8]) -> UploadResult<Meta> {
    if body.len() > MAX_META_SIZE_BYTES {
        return Err(UploadError::TooLarge(format!(
            "The block metadata was too large (maximum size allowed is {MAX_META_SIZE_BYTES} bytes)"
        )));
    }
    Meta::from_json(body).map_err(|_| UploadError::bad_request("malformed request body"))
}

/// Enforce the total size ceiling on a file list. A ceiling of zero or less
/// disables the check.
pub fn check_max_block_size(files: &[BlockFile], max_block_size_bytes: i64) -> Result<(), ValidationError> {
    if max_block_size_bytes <= 0 {
        return Ok(());
    }
    match total_size(files) {
        Ok(size) if size <= max_block_size_bytes => Ok(()),
        Ok(_) | Err(TypeError::SizeOverflow) => {
            Err(ValidationError::BlockTooLarge(max_block_size_bytes))
        }
        Err(_) => Err(ValidationError::NegativeFileSize),
    }
}

/// Sanitize `meta` in place for an upload of `block`, or return the reason
/// it is unacceptable.
///
/// On success the metadata carries the path's block ID, a compaction
/// lineage of just itself, the upload source tag, and only the external
/// labels blocks are allowed to keep.
pub fn sanitize_meta(
    meta: &mut Meta,
    block: BlockId,
    max_block_size_bytes: i64,
    now: DateTime<Utc>,
) -> Result<(), String> {
    if meta.ext.downsample.resolution > 0 {
        return Err("block contains downsampled data".into());
    }

    meta.ulid = block;
    sanitize_external_labels(meta)?;

    meta.compaction.parents = None;
    meta.compaction.sources = vec![block];

    for f in meta.ext.files.iter().filter(|f| !f.is_meta()) {
        if !is_block_data_path(&f.rel_path) {
            return Err(format!("file with invalid path: {}", f.rel_path));
        }
        if f.size_bytes <= 0 {
            return Err(format!("file with invalid size: {}", f.rel_path));
        }
    }

    check_max_block_size(&meta.ext.files, max_block_size_bytes).map_err(|e| e.to_string())?;

    if meta.version != TSDB_VERSION_1 {
        return Err(format!("version must be {TSDB_VERSION_1}"));
    }

    if meta.min_time < 0 || meta.max_time < 0 || meta.max_time < meta.min_time {
        return Err(format!(
            "invalid minTime/maxTime: minTime={}, maxTime={}",
            meta.min_time, meta.max_time
        ));
    }
    let now_ms = now.timestamp_millis();
    if meta.min_time > now_ms || meta.max_time > now_ms {
        return Err(format!(
            "block time(s) greater than the present: minTime={}, maxTime={}",
            meta.min_time, meta.max_time
        ));
    }

    meta.ext.source = UPLOAD_SOURCE.to_string();
    Ok(())
}

fn sanitize_external_labels(meta: &mut Meta) -> Result<(), String> {
    let mut unsupported = None;
    let mut invalid_shard = None;
    meta.ext.labels.retain(|name, value| match name.as_str() {
        COMPACTOR_SHARD_ID_LABEL => {
            if value.is_empty() {
                debug!(label = %name, "removing empty external label");
                return false;
            }
            if ShardId::parse(value).is_err() {
                invalid_shard.get_or_insert_with(|| value.clone());
            }
            true
        }
        DEPRECATED_TENANT_ID_LABEL | DEPRECATED_INGESTER_ID_LABEL | DEPRECATED_SHARD_ID_LABEL => {
            debug!(label = %name, value = %value, "removing unused external label");
            false
        }
        _ => {
            unsupported.get_or_insert_with(|| name.clone());
            true
        }
    });
    if let Some(value) = invalid_shard {
        return Err(format!("invalid {COMPACTOR_SHARD_ID_LABEL} external label: {value:?}"));
    }
    if let Some(name) = unsupported {
        return Err(format!("unsupported external label: {name}"));
    }
    Ok(())
}

/// Refuse blocks whose max time falls outside the retention window. A zero
/// retention disables the check.
pub fn check_retention(meta: &Meta, retention: Duration, now: DateTime<Utc>) -> UploadResult<()> {
    if retention.is_zero() {
        return Ok(());
    }
    let Ok(retention) = chrono::Duration::from_std(retention) else {
        return Ok(());
    };
    let threshold = now - retention;
    let max_time = DateTime::<Utc>::from_timestamp_millis(meta.max_time).unwrap_or_default();
    if max_time < threshold {
        return Err(UploadError::Unprocessable(format!(
            "block max time ({}) older than retention period",
            format_time_millis(meta.max_time)
        )));
    }
    Ok(())
}

/// Render a millisecond timestamp as `2006-01-02 15:04:05.999 +0000 UTC`.
pub fn format_time_millis(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .format("%Y-%m-%d %H:%M:%S%.f %z UTC")
        .to_string()
}
