use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectAttributes, ObjectStore};

#[derive(Clone, Debug)]
struct Entry {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

/// In-memory object store.
///
/// Intended for tests and embedding. Objects are held in a sorted map behind
/// a `RwLock` for safe concurrent access.
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, Entry>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|e| e.data.len() as u64)
            .sum()
    }

    /// Sorted list of all object names.
    pub fn names(&self) -> Vec<String> {
        self.objects
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, name: &str) -> StoreResult<Bytes> {
        let map = self.objects.read().expect("lock poisoned");
        map.get(name)
            .map(|e| e.data.clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn put(&self, name: &str, data: Bytes) -> StoreResult<()> {
        let mut map = self.objects.write().expect("lock poisoned");
        map.insert(
            name.to_string(),
            Entry {
                data,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        let mut map = self.objects.write().expect("lock poisoned");
        map.remove(name);
        Ok(())
    }

    async fn exists(&self, name: &str) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(name))
    }

    async fn attributes(&self, name: &str) -> StoreResult<ObjectAttributes> {
        let map = self.objects.read().expect("lock poisoned");
        map.get(name)
            .map(|e| ObjectAttributes {
                size: e.data.len() as u64,
                last_modified: e.last_modified,
            })
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &count)
            .finish()
    }
}
