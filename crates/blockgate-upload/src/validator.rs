//! Structural validation of an uploaded block.
//!
//! The block's objects are staged into a private directory under the data
//! dir, the in-flight metadata is renamed to `meta.json`, declared file sizes
//! are compared against what arrived, and the block is handed to
//! [`verify_block_with`]. The staging directory is removed on every path.

use std::path::{Path, PathBuf};

use blockgate_store::ObjectStore;
use blockgate_tsdb::{verify_block_with, BlockHealth, TsdbError, VerifyOptions};
use blockgate_types::paths::{META_FILENAME, UPLOADING_META_FILENAME};
use blockgate_types::{BlockFile, BlockId, Meta};
use futures::{StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ValidationError;
use crate::meta_validator::check_max_block_size;
use crate::token::time_token;

/// Objects fetched in parallel while staging a block.
const DOWNLOAD_CONCURRENCY: usize = 4;

/// Tenant settings that shape a validation.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValidationLimits {
    pub max_block_size_bytes: i64,
    pub verify_chunks: bool,
}

/// Stages and verifies uploaded blocks.
#[derive(Clone, Debug)]
pub struct BlockValidator {
    data_dir: PathBuf,
}

impl BlockValidator {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Validate `block` as described by its in-flight `meta`.
    ///
    /// Cancelling `token` stops the download and the verification at the
    /// next checkpoint.
    pub async fn validate(
        &self,
        store: &dyn ObjectStore,
        block: BlockId,
        meta: &Meta,
        limits: ValidationLimits,
        token: &CancellationToken,
    ) -> Result<BlockHealth, ValidationError> {
        check_max_block_size(&meta.ext.files, limits.max_block_size_bytes)?;

        let staging = self.prepare_block(store, block, token).await?;
        check_files(staging.path(), &meta.ext.files).await?;

        let dir = staging.path().to_path_buf();
        let opts = VerifyOptions {
            min_time: meta.min_time,
            max_time: meta.max_time,
            check_chunks: limits.verify_chunks,
        };
        let token = token.clone();
        let result = tokio::task::spawn_blocking(move || {
            verify_block_with(&dir, &opts, &|| token.is_cancelled())
        })
        .await
        .map_err(|e| ValidationError::Task(e.to_string()))?;

        match result {
            Ok(health) => Ok(health),
            Err(TsdbError::Cancelled) => Err(ValidationError::Cancelled),
            Err(e) => Err(ValidationError::Block(e)),
        }
    }

    /// Copy every object of `block` into a fresh staging directory and put
    /// the in-flight metadata where a block reader expects `meta.json`.
    async fn prepare_block(
        &self,
        store: &dyn ObjectStore,
        block: BlockId,
        token: &CancellationToken,
    ) -> Result<StagingDir, ValidationError> {
        let path = self.data_dir.join(format!("upload-{block}-{}", time_token()));
        tokio::fs::create_dir_all(&path).await.map_err(|e| {
            warn!(dir = %path.display(), err = %e, "failed to create temporary block directory");
            ValidationError::StagingDir(e)
        })?;
        let staging = StagingDir { path };
        debug!(dir = %staging.path().display(), "created temporary block directory");

        let prefix = format!("{block}/");
        let names = store
            .list(&prefix)
            .await
            .map_err(|e| ValidationError::Download(e.to_string()))?;

        let root = staging.path();
        futures::stream::iter(names)
            .filter_map(|name| {
                let rel = name.strip_prefix(&prefix).map(str::to_string);
                async move {
                    match rel {
                        Some(rel) if is_safe_relative(&rel) => Some(Ok::<_, ValidationError>((name, rel))),
                        _ => {
                            warn!(object = %name, "skipping unexpected object while staging block");
                            None
                        }
                    }
                }
            })
            .try_for_each_concurrent(DOWNLOAD_CONCURRENCY, |(name, rel)| async move {
                if token.is_cancelled() {
                    return Err(ValidationError::Cancelled);
                }
                let data = store
                    .get(&name)
                    .await
                    .map_err(|e| ValidationError::Download(e.to_string()))?;
                let target = local_path(root, &rel);
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| ValidationError::Download(e.to_string()))?;
                }
                tokio::fs::write(&target, &data)
                    .await
                    .map_err(|e| ValidationError::Download(e.to_string()))
            })
            .await?;

        tokio::fs::rename(
            root.join(UPLOADING_META_FILENAME),
            root.join(META_FILENAME),
        )
        .await
        .map_err(|e| {
            warn!(block = %block, err = %e, "could not rename temporary metadata file");
            ValidationError::PrepareMeta(e)
        })?;

        Ok(staging)
    }
}

/// Every declared file must be present as a regular file of the declared
/// size. `meta.json` is exempt from the size check since it was rewritten.
async fn check_files(dir: &Path, files: &[BlockFile]) -> Result<(), ValidationError> {
    for f in files {
        let md = tokio::fs::metadata(local_path(dir, &f.rel_path))
            .await
            .map_err(|source| ValidationError::Stat {
                path: f.rel_path.clone(),
                source,
            })?;
        if !md.is_file() {
            return Err(ValidationError::NotAFile(f.rel_path.clone()));
        }
        if !f.is_meta() && md.len() as i64 != f.size_bytes {
            return Err(ValidationError::SizeMismatch(f.rel_path.clone()));
        }
    }
    Ok(())
}

fn is_safe_relative(rel: &str) -> bool {
    !rel.is_empty() && rel.split('/').all(|c| !c.is_empty() && c != "." && c != "..")
}

fn local_path(root: &Path, rel: &str) -> PathBuf {
    rel.split('/').fold(root.to_path_buf(), |p, c| p.join(c))
}

/// Scratch directory removed when dropped.
struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        debug!(dir = %self.path.display(), "removing temporary block directory");
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(dir = %self.path.display(), err = %e, "failed to remove temporary block directory");
        }
    }
}
