use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectAttributes, ObjectStore};

const TEMP_SUFFIX: &str = ".tmp";

/// Object store backed by a directory tree.
///
/// Object `a/b/c` lives at `<root>/a/b/c`. Writes go to a hidden temporary
/// file next to the target and are renamed into place, so readers never
/// observe a partially written object.
#[derive(Debug)]
pub struct LocalFsObjectStore {
    root: PathBuf,
    temp_seq: AtomicU64,
}

impl LocalFsObjectStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            temp_seq: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> StoreResult<PathBuf> {
        let rel = Path::new(name);
        if name.is_empty()
            || !rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(rel))
    }

    fn temp_path_for(&self, path: &Path) -> PathBuf {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{base}.{seq}{TEMP_SUFFIX}"))
    }
}

fn not_found_as(name: &str, e: std::io::Error) -> StoreError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StoreError::NotFound(name.to_string())
    } else {
        StoreError::Io(e)
    }
}

fn is_temp_file(name: &str) -> bool {
    let base = name.rsplit('/').next().unwrap_or(name);
    base.starts_with('.') && base.ends_with(TEMP_SUFFIX)
}

#[async_trait]
impl ObjectStore for LocalFsObjectStore {
    async fn get(&self, name: &str) -> StoreResult<Bytes> {
        let path = self.path_of(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(md) if md.is_dir() => return Err(StoreError::NotFound(name.to_string())),
            Ok(_) => {}
            Err(e) => return Err(not_found_as(name, e)),
        }
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| not_found_as(name, e))?;
        Ok(Bytes::from(data))
    }

    async fn put(&self, name: &str, data: Bytes) -> StoreResult<()> {
        let path = self.path_of(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.temp_path_for(&path);
        if let Err(e) = tokio::fs::write(&tmp, &data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(name, size = data.len(), "object written");
        Ok(())
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        let path = self.path_of(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> StoreResult<bool> {
        let path = self.path_of(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(md) => Ok(md.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn attributes(&self, name: &str) -> StoreResult<ObjectAttributes> {
        let path = self.path_of(name)?;
        let md = tokio::fs::metadata(&path)
            .await
            .map_err(|e| not_found_as(name, e))?;
        if !md.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let last_modified: DateTime<Utc> = md.modified()?.into();
        Ok(ObjectAttributes {
            size: md.len(),
            last_modified,
        })
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || {
            let mut names = Vec::new();
            for entry in walkdir::WalkDir::new(&root).min_depth(1) {
                let entry = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if name.starts_with(&prefix) && !is_temp_file(&name) {
                    names.push(name);
                }
            }
            names.sort();
            Ok(names)
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (tempfile::TempDir, LocalFsObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::open(dir.path().join("bucket")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn roundtrip_and_overwrite() {
        let (_dir, store) = open_store();
        store.put("t/b/index", Bytes::from_static(b"first")).await.unwrap();
        store.put("t/b/index", Bytes::from_static(b"2nd")).await.unwrap();
        assert_eq!(store.get("t/b/index").await.unwrap(), Bytes::from_static(b"2nd"));
        assert_eq!(store.attributes("t/b/index").await.unwrap().size, 3);
        assert!(store.root().join("t/b/index").exists());
    }

    #[tokio::test]
    async fn missing_objects() {
        let (_dir, store) = open_store();
        assert!(store.get("t/none").await.unwrap_err().is_not_found());
        assert!(store.attributes("t/none").await.unwrap_err().is_not_found());
        assert!(!store.exists("t/none").await.unwrap());
        store.delete("t/none").await.unwrap();
    }

    #[tokio::test]
    async fn directories_are_not_objects() {
        let (_dir, store) = open_store();
        store.put("t/b/chunks/000001", Bytes::from_static(b"c")).await.unwrap();
        assert!(!store.exists("t/b/chunks").await.unwrap());
        assert!(store.get("t/b/chunks").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let (_dir, store) = open_store();
        for name in ["../escape", "/abs", "a/../../b", ""] {
            let err = store.put(name, Bytes::from_static(b"x")).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidName(_)), "{name}");
        }
    }

    #[tokio::test]
    async fn list_recursive_sorted() {
        let (_dir, store) = open_store();
        for name in ["t/b/meta.json", "t/b/chunks/000002", "t/b/chunks/000001", "u/b/index"] {
            store.put(name, Bytes::from_static(b"x")).await.unwrap();
        }
        assert_eq!(
            store.list("t/b/").await.unwrap(),
            vec![
                "t/b/chunks/000001".to_string(),
                "t/b/chunks/000002".to_string(),
                "t/b/meta.json".to_string(),
            ]
        );
        assert_eq!(store.list("").await.unwrap().len(), 4);
    }

    #[test]
    fn temp_names_are_hidden() {
        assert!(is_temp_file("t/b/.index.3.tmp"));
        assert!(!is_temp_file("t/b/index"));
    }
}
