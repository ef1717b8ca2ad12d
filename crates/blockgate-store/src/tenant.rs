use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreResult;
use crate::traits::{ObjectAttributes, ObjectStore};

/// View of a shared store restricted to one tenant.
///
/// Every name is transparently prefixed with `<tenant>/`, and listed names
/// come back with the prefix stripped, so callers only ever see
/// tenant-relative names.
#[derive(Clone)]
pub struct TenantStore {
    inner: Arc<dyn ObjectStore>,
    prefix: String,
}

impl TenantStore {
    pub fn new(inner: Arc<dyn ObjectStore>, tenant: &str) -> Self {
        Self {
            inner,
            prefix: format!("{tenant}/"),
        }
    }

    /// Tenant this view is bound to.
    pub fn tenant(&self) -> &str {
        self.prefix.trim_end_matches('/')
    }

    fn full_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}

#[async_trait]
impl ObjectStore for TenantStore {
    async fn get(&self, name: &str) -> StoreResult<Bytes> {
        self.inner.get(&self.full_name(name)).await
    }

    async fn put(&self, name: &str, data: Bytes) -> StoreResult<()> {
        self.inner.put(&self.full_name(name), data).await
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        self.inner.delete(&self.full_name(name)).await
    }

    async fn exists(&self, name: &str) -> StoreResult<bool> {
        self.inner.exists(&self.full_name(name)).await
    }

    async fn attributes(&self, name: &str) -> StoreResult<ObjectAttributes> {
        self.inner.attributes(&self.full_name(name)).await
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let names = self.inner.list(&self.full_name(prefix)).await?;
        Ok(names
            .into_iter()
            .filter_map(|n| n.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }
}

impl std::fmt::Debug for TenantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantStore")
            .field("tenant", &self.tenant())
            .finish()
    }
}
