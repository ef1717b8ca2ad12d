use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StoreError, StoreOp, StoreResult};
use crate::traits::{ObjectAttributes, ObjectStore};

/// Store wrapper that fails chosen operations on chosen objects.
///
/// Used to exercise storage-failure paths. A fault matches when both the
/// operation and the full object name are equal; matching calls return
/// [`StoreError::Injected`] without reaching the inner store.
pub struct FaultInjectingStore {
    inner: Arc<dyn ObjectStore>,
    faults: Mutex<Vec<(StoreOp, String)>>,
}

impl FaultInjectingStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Fail every `op` on `name` from now on.
    pub fn fail_on(&self, op: StoreOp, name: impl Into<String>) {
        self.faults
            .lock()
            .expect("lock poisoned")
            .push((op, name.into()));
    }

    /// Builder form of [`Self::fail_on`].
    pub fn with_fault(self, op: StoreOp, name: impl Into<String>) -> Self {
        self.fail_on(op, name);
        self
    }

    /// Remove all faults.
    pub fn clear(&self) {
        self.faults.lock().expect("lock poisoned").clear();
    }

    fn check(&self, op: StoreOp, name: &str) -> StoreResult<()> {
        let faults = self.faults.lock().expect("lock poisoned");
        if faults.iter().any(|(o, n)| *o == op && n == name) {
            return Err(StoreError::Injected {
                op,
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FaultInjectingStore {
    async fn get(&self, name: &str) -> StoreResult<Bytes> {
        self.check(StoreOp::Get, name)?;
        self.inner.get(name).await
    }

    async fn put(&self, name: &str, data: Bytes) -> StoreResult<()> {
        self.check(StoreOp::Put, name)?;
        self.inner.put(name, data).await
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        self.check(StoreOp::Delete, name)?;
        self.inner.delete(name).await
    }

    async fn exists(&self, name: &str) -> StoreResult<bool> {
        self.check(StoreOp::Exists, name)?;
        self.inner.exists(name).await
    }

    async fn attributes(&self, name: &str) -> StoreResult<ObjectAttributes> {
        self.check(StoreOp::Attributes, name)?;
        self.inner.attributes(name).await
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.check(StoreOp::List, prefix)?;
        self.inner.list(prefix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryObjectStore;

    #[tokio::test]
    async fn injected_fault_hits_only_target() {
        let inner = Arc::new(InMemoryObjectStore::new());
        let store = FaultInjectingStore::new(inner.clone()).with_fault(StoreOp::Put, "t/x");

        let err = store.put("t/x", Bytes::from_static(b"1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Injected { op: StoreOp::Put, .. }));
        assert!(!inner.exists("t/x").await.unwrap());

        store.put("t/y", Bytes::from_static(b"1")).await.unwrap();
        assert!(store.exists("t/x").await.is_ok());
    }

    #[tokio::test]
    async fn clear_removes_faults() {
        let store = FaultInjectingStore::new(Arc::new(InMemoryObjectStore::new()));
        store.fail_on(StoreOp::Exists, "a");
        assert!(store.exists("a").await.is_err());
        store.clear();
        assert!(!store.exists("a").await.unwrap());
    }

    #[test]
    fn error_message_names_op() {
        let err = StoreError::Injected {
            op: StoreOp::Delete,
            name: "t/b/validation.json".into(),
        };
        assert_eq!(err.to_string(), "injected delete error on t/b/validation.json");
    }
}
