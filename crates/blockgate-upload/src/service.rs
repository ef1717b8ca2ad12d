//! The four upload operations and the background validation they trigger.
//!
//! ```text
//! start ─► put_file* ─► finish ─┬─ validation disabled ─► mark_block_complete
//!                               └─ validation enabled  ─► [task] heartbeat + validate
//!                                                               ├─ ok  ─► mark_block_complete
//!                                                               └─ err ─► validation.json{Error}
//! ```
//!
//! There is no lock between requests for the same block. Every step is an
//! idempotent overwrite, and `meta.json` is only ever created once.

use std::sync::Arc;

use blockgate_store::{ObjectStore, TenantStore};
use blockgate_types::paths::{
    base_name, block_object, is_block_data_path, META_FILENAME, UPLOADING_META_FILENAME,
    VALIDATION_FILENAME,
};
use blockgate_types::{BlockId, Meta};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::UploadConfig;
use crate::error::{UploadError, UploadResult};
use crate::gate::{ValidationGate, ValidationPermit};
use crate::heartbeat::run_heartbeat;
use crate::limits::TenantLimits;
use crate::meta_validator::{check_retention, parse_meta, sanitize_meta, validate_tenant_id};
use crate::metrics::UploadMetrics;
use crate::records::{now_ms, read_uploading_meta, read_validation, upload_meta, write_validation};
use crate::state::{derive_state, BlockUploadState, BlockUploadStateResponse, ValidationRecord};
use crate::validator::{BlockValidator, ValidationLimits};

/// Entry point of the upload pipeline.
///
/// Cheap to clone; clones share the store, the validation gate and the
/// metrics.
#[derive(Clone)]
pub struct BlockUploadService {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn ObjectStore>,
    limits: Arc<dyn TenantLimits>,
    config: UploadConfig,
    gate: ValidationGate,
    validator: BlockValidator,
    metrics: UploadMetrics,
    tasks: TaskTracker,
}

impl BlockUploadService {
    pub fn new(store: Arc<dyn ObjectStore>, limits: Arc<dyn TenantLimits>, config: UploadConfig) -> Self {
        let gate = ValidationGate::new(config.max_validation_concurrency);
        let validator = BlockValidator::new(config.data_dir.clone());
        Self {
            inner: Arc::new(Inner {
                store,
                limits,
                config,
                gate,
                validator,
                metrics: UploadMetrics::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &UploadMetrics {
        &self.inner.metrics
    }

    /// Background validations currently running.
    pub fn active_validations(&self) -> usize {
        self.inner.gate.active()
    }

    /// Wait until every background validation started so far has finished.
    pub async fn wait_for_validations(&self) {
        let tasks = &self.inner.tasks;
        tasks.close();
        tasks.wait().await;
        tasks.reopen();
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Begin an upload by recording the block's metadata.
    ///
    /// Any earlier in-flight metadata is replaced without being consulted.
    pub async fn start(&self, tenant: Option<&str>, block: &str, body: &[u8]) -> UploadResult<()> {
        let (block, tenant) = self.parse_params(tenant, block)?;
        let store = self.tenant_store(&tenant);
        debug!(block = %block, "starting block upload");

        self.check_block_state(store.as_ref(), block, false).await?;

        let mut meta = parse_meta(body)?;
        let now = Utc::now();
        let max_size = self.inner.limits.block_upload_max_block_size_bytes(&tenant);
        sanitize_meta(&mut meta, block, max_size, now).map_err(UploadError::BadRequest)?;
        check_retention(&meta, self.inner.limits.blocks_retention_period(&tenant), now)?;

        upload_meta(store.as_ref(), block, &meta, UPLOADING_META_FILENAME).await?;
        info!(tenant = %tenant, block = %block, "started block upload");
        Ok(())
    }

    /// Store one data file of an upload.
    ///
    /// The body is read up to the size declared for `path` in the in-flight
    /// metadata. A body of any other length is refused before anything is
    /// written, whether or not `content_length` was given.
    pub async fn put_file<S, E>(
        &self,
        tenant: Option<&str>,
        block: &str,
        path: Option<&str>,
        content_length: Option<u64>,
        body: S,
    ) -> UploadResult<()>
    where
        S: Stream<Item = Result<Bytes, E>> + Send,
        E: std::fmt::Display,
    {
        let (block, tenant) = self.parse_params(tenant, block)?;

        let path = match path {
            Some(p) if !p.is_empty() => p,
            _ => return Err(UploadError::bad_request("missing or invalid file path")),
        };
        let base = base_name(path);
        if base == META_FILENAME || base == UPLOADING_META_FILENAME {
            return Err(UploadError::BadRequest(format!("{base} is not allowed")));
        }
        if !is_block_data_path(path) {
            return Err(UploadError::BadRequest(format!("invalid path: {path:?}")));
        }
        if content_length == Some(0) {
            return Err(UploadError::bad_request("file cannot be empty"));
        }

        let store = self.tenant_store(&tenant);
        let meta = self.require_upload_in_progress(store.as_ref(), block).await?;

        let Some(file) = meta.file(path) else {
            return Err(UploadError::bad_request("unexpected file"));
        };
        let expected = file.size_bytes;
        if content_length.is_some_and(|n| n as i64 != expected) {
            return Err(size_mismatch());
        }

        let data = read_body(body, expected as usize).await?;
        let dst = block_object(&block, path);
        debug!(dst = %dst, size = data.len(), "uploading block file to bucket");
        store
            .put(&dst, data)
            .await
            .map_err(UploadError::storage(format!("failed uploading {path} to bucket")))?;
        debug!(path, "finished uploading block file to bucket");
        Ok(())
    }

    /// Finish an upload: commit it directly, or start a background
    /// validation that commits it on success.
    pub async fn finish(&self, tenant: Option<&str>, block: &str) -> UploadResult<()> {
        let (block, tenant) = self.parse_params(tenant, block)?;
        let store = self.tenant_store(&tenant);
        let meta = self.require_upload_in_progress(store.as_ref(), block).await?;

        if !self.inner.limits.block_upload_validation_enabled(&tenant) {
            self.mark_block_complete(store.as_ref(), &tenant, block, &meta).await?;
            info!(tenant = %tenant, block = %block, "successfully finished block upload");
            return Ok(());
        }

        let Some(permit) = self.inner.gate.try_acquire() else {
            warn!(tenant = %tenant, block = %block, "max concurrency was hit");
            return Err(UploadError::TooManyRequests(format!(
                "too many block upload validations in progress, limit is {}",
                self.inner.gate.limit()
            )));
        };

        // Written before answering so a query right after sees the
        // validation.
        write_validation(store.as_ref(), block, "")
            .await
            .map_err(UploadError::storage(format!("failed uploading {VALIDATION_FILENAME} to bucket")))?;

        let this = self.clone();
        self.inner.tasks.spawn(async move {
            this.validate_and_complete(store, tenant, block, meta, permit).await;
        });
        info!(block = %block, "validation process started");
        Ok(())
    }

    /// Report the state of an upload.
    pub async fn query(&self, tenant: Option<&str>, block: &str) -> UploadResult<BlockUploadStateResponse> {
        let (block, tenant) = self.parse_params(tenant, block)?;
        let store = self.tenant_store(&tenant);
        let (state, _) = self.block_state(store.as_ref(), block).await?;
        if state == BlockUploadState::NotStarted {
            return Err(UploadError::NotFound("block doesn't exist".into()));
        }
        Ok(BlockUploadStateResponse::from(&state))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Validate the block ID, the tenant ID and the tenant's permission, in
    /// that order and before touching storage.
    fn parse_params(&self, tenant: Option<&str>, block: &str) -> UploadResult<(BlockId, String)> {
        let block = BlockId::parse(block).map_err(|_| UploadError::bad_request("invalid block ID"))?;
        let tenant = tenant.ok_or_else(|| UploadError::bad_request("invalid tenant ID"))?;
        validate_tenant_id(tenant)?;
        if !self.inner.limits.block_upload_enabled(tenant) {
            return Err(UploadError::bad_request("block upload is disabled"));
        }
        Ok((block, tenant.to_string()))
    }

    fn tenant_store(&self, tenant: &str) -> Arc<dyn ObjectStore> {
        Arc::new(TenantStore::new(Arc::clone(&self.inner.store), tenant))
    }

    /// Derive the state of `block` from the objects that exist.
    async fn block_state(
        &self,
        store: &dyn ObjectStore,
        block: BlockId,
    ) -> UploadResult<(BlockUploadState, Option<Meta>)> {
        let complete = store
            .exists(&block_object(&block, META_FILENAME))
            .await
            .map_err(UploadError::storage(format!("failed checking {META_FILENAME}")))?;
        if complete {
            return Ok((BlockUploadState::Complete, None));
        }

        let Some(meta) = read_uploading_meta(store, block).await? else {
            return Ok((BlockUploadState::NotStarted, None));
        };
        let validation: Option<ValidationRecord> = read_validation(store, block).await?;
        let state = derive_state(
            false,
            true,
            validation.as_ref(),
            now_ms(),
            self.inner.config.heartbeat_timeout,
        );
        Ok((state, Some(meta)))
    }

    /// Refuse operations on complete blocks and on blocks with a fresh
    /// validation record, running or failed. Returns the in-flight metadata if the upload has started.
    async fn check_block_state(
        &self,
        store: &dyn ObjectStore,
        block: BlockId,
        require_upload_in_progress: bool,
    ) -> UploadResult<Option<Meta>> {
        let (state, meta) = self.block_state(store, block).await?;
        match state {
            BlockUploadState::Complete => Err(UploadError::Conflict("block already exists".into())),
            BlockUploadState::Validating => {
                Err(UploadError::bad_request("block validation in progress"))
            }
            BlockUploadState::Failed(_) => Err(UploadError::bad_request("block validation failed")),
            BlockUploadState::NotStarted if require_upload_in_progress => {
                Err(UploadError::NotFound("block upload not started".into()))
            }
            BlockUploadState::NotStarted | BlockUploadState::Uploading => Ok(meta),
        }
    }

    async fn require_upload_in_progress(&self, store: &dyn ObjectStore, block: BlockId) -> UploadResult<Meta> {
        self.check_block_state(store, block, true)
            .await?
            .ok_or_else(|| UploadError::Internal("block meta missing for an upload in progress".into()))
    }

    /// Commit the block by writing `meta.json`.
    ///
    /// Succeeds once `meta.json` is written; removing the in-flight metadata
    /// afterwards is best effort.
    async fn mark_block_complete(
        &self,
        store: &dyn ObjectStore,
        tenant: &str,
        block: BlockId,
        meta: &Meta,
    ) -> UploadResult<()> {
        if let Err(e) = upload_meta(store, block, meta, META_FILENAME).await {
            error!(block = %block, err = %e, "error uploading block metadata file");
            return Err(e);
        }

        if let Err(e) = store.delete(&block_object(&block, UPLOADING_META_FILENAME)).await {
            warn!(block = %block, err = %e, "failed to delete {UPLOADING_META_FILENAME} from block in object storage");
        }

        let bytes = meta.block_bytes().unwrap_or(0).max(0) as u64;
        self.inner
            .metrics
            .record_block(tenant, bytes, meta.ext.files.len() as u64);
        Ok(())
    }

    /// Body of the background task started by [`Self::finish`]. The permit
    /// is held until the task ends.
    async fn validate_and_complete(
        &self,
        store: Arc<dyn ObjectStore>,
        tenant: String,
        block: BlockId,
        meta: Meta,
        _permit: ValidationPermit,
    ) {
        debug!(block = %block, files = meta.ext.files.len(), "completing block upload");

        let token = CancellationToken::new();
        let heartbeat = tokio::spawn(run_heartbeat(
            Arc::clone(&store),
            block,
            self.inner.config.heartbeat_interval,
            token.clone(),
        ));

        let limits = ValidationLimits {
            max_block_size_bytes: self.inner.limits.block_upload_max_block_size_bytes(&tenant),
            verify_chunks: self.inner.limits.block_upload_verify_chunks(&tenant),
        };
        let result = self
            .inner
            .validator
            .validate(store.as_ref(), block, &meta, limits, &token)
            .await;

        token.cancel();
        if let Err(e) = heartbeat.await {
            warn!(block = %block, err = %e, "heartbeat task failed");
        }

        if let Err(e) = result {
            error!(tenant = %tenant, block = %block, err = %e, "error while validating block");
            if let Err(e) = write_validation(store.as_ref(), block, &e.to_string()).await {
                error!(block = %block, err = %e, "error updating validation file after failed block validation");
            }
            return;
        }

        if let Err(e) = self.mark_block_complete(store.as_ref(), &tenant, block, &meta).await {
            if let Err(e) = write_validation(store.as_ref(), block, &e.to_string()).await {
                error!(block = %block, err = %e, "error updating validation file after upload of metadata file failed");
            }
            return;
        }

        if let Err(e) = store.delete(&block_object(&block, VALIDATION_FILENAME)).await {
            warn!(block = %block, err = %e, "failed to delete {VALIDATION_FILENAME} from block in object storage");
            return;
        }

        info!(tenant = %tenant, block = %block, "successfully completed block upload");
    }
}

/// Starting buffer size for file bodies. The declared size is client input
/// and only bounds how far the buffer may grow.
const INITIAL_BODY_CAPACITY: usize = 64 * 1024;

fn size_mismatch() -> UploadError {
    UploadError::BadRequest(format!("file size doesn't match {META_FILENAME}"))
}

/// Collect exactly `expected` bytes from `body`, refusing shorter and longer
/// bodies. Reading stops as soon as the body overruns.
async fn read_body<S, E>(body: S, expected: usize) -> UploadResult<Bytes>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut body = std::pin::pin!(body);
    let mut buf = BytesMut::with_capacity(expected.min(INITIAL_BODY_CAPACITY));
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| UploadError::Internal(format!("failed reading request body: {e}")))?;
        if buf.len() + chunk.len() > expected {
            return Err(size_mismatch());
        }
        buf.extend_from_slice(&chunk);
    }
    if buf.is_empty() {
        return Err(UploadError::bad_request("file cannot be empty"));
    }
    if buf.len() != expected {
        return Err(size_mismatch());
    }
    Ok(buf.freeze())
}
