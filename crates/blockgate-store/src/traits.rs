use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{StoreError, StoreResult};

/// Attributes of a stored object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectAttributes {
    /// Size of the object in bytes.
    pub size: u64,
    /// Time of the last write.
    pub last_modified: DateTime<Utc>,
}

/// Store of named, opaque blobs.
///
/// All implementations must satisfy these invariants:
/// - `put` replaces any previous content under the same name (last write
///   wins, never append).
/// - `get` and `attributes` on a missing object return
///   [`StoreError::NotFound`]; `exists` returns `Ok(false)`.
/// - `delete` of a missing object succeeds.
/// - There are no multi-object transactions; each call stands alone.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the full content of an object.
    async fn get(&self, name: &str) -> StoreResult<Bytes>;

    /// Write an object, replacing existing content.
    async fn put(&self, name: &str, data: Bytes) -> StoreResult<()>;

    /// Delete an object.
    async fn delete(&self, name: &str) -> StoreResult<()>;

    /// Check whether an object exists.
    async fn exists(&self, name: &str) -> StoreResult<bool>;

    /// Size and modification time of an object.
    async fn attributes(&self, name: &str) -> StoreResult<ObjectAttributes>;

    /// Names of all objects starting with `prefix`, at any depth, sorted.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Read an object, mapping absence to `Ok(None)`.
    async fn get_if_exists(&self, name: &str) -> StoreResult<Option<Bytes>> {
        match self.get(name).await {
            Ok(data) => Ok(Some(data)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
