//! Reading and writing the bookkeeping objects of an upload.

use blockgate_store::{ObjectStore, StoreError, StoreResult};
use blockgate_types::paths::{block_object, UPLOADING_META_FILENAME, VALIDATION_FILENAME};
use blockgate_types::{BlockId, Meta};
use bytes::Bytes;
use chrono::Utc;
use tracing::debug;

use crate::error::{UploadError, UploadResult};
use crate::state::ValidationRecord;

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Write `validation.json` stamped with the current time. An empty `error`
/// marks a running validation.
pub async fn write_validation(store: &dyn ObjectStore, block: BlockId, error: &str) -> StoreResult<()> {
    let record = ValidationRecord::failed(now_ms(), error);
    let data = serde_json::to_vec(&record).map_err(|e| StoreError::Backend(e.to_string()))?;
    store
        .put(&block_object(&block, VALIDATION_FILENAME), Bytes::from(data))
        .await
}

pub async fn read_validation(store: &dyn ObjectStore, block: BlockId) -> UploadResult<Option<ValidationRecord>> {
    let name = block_object(&block, VALIDATION_FILENAME);
    let Some(data) = store
        .get_if_exists(&name)
        .await
        .map_err(UploadError::storage(format!("failed reading {VALIDATION_FILENAME}")))?
    else {
        return Ok(None);
    };
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| UploadError::Internal(format!("failed decoding {VALIDATION_FILENAME}: {e}")))
}

pub async fn read_uploading_meta(store: &dyn ObjectStore, block: BlockId) -> UploadResult<Option<Meta>> {
    let name = block_object(&block, UPLOADING_META_FILENAME);
    let Some(data) = store
        .get_if_exists(&name)
        .await
        .map_err(UploadError::storage(format!("failed reading {UPLOADING_META_FILENAME}")))?
    else {
        return Ok(None);
    };
    Meta::from_json(&data)
        .map(Some)
        .map_err(|e| UploadError::Internal(format!("failed decoding {UPLOADING_META_FILENAME}: {e}")))
}

/// Store `meta` as `<block>/<filename>`.
pub async fn upload_meta(store: &dyn ObjectStore, block: BlockId, meta: &Meta, filename: &str) -> UploadResult<()> {
    let dst = block_object(&block, filename);
    debug!(dst = %dst, "uploading {filename} to bucket");
    let data = meta
        .to_json()
        .map_err(|e| UploadError::Internal(format!("failed to encode block metadata: {e}")))?;
    store
        .put(&dst, Bytes::from(data))
        .await
        .map_err(UploadError::storage(format!("failed uploading {filename} to bucket")))
}
