use std::sync::Arc;

use blockgate_store::{InMemoryObjectStore, LocalFsObjectStore, ObjectStore};
use blockgate_upload::{BlockUploadService, StaticTenantLimits};
use tokio::net::TcpListener;

use crate::config::{ServerConfig, StorageConfig};
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;

/// Block upload server.
pub struct BlockgateServer {
    config: ServerConfig,
}

impl BlockgateServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open the configured object store.
    pub fn open_store(&self) -> ServerResult<Arc<dyn ObjectStore>> {
        let store: Arc<dyn ObjectStore> = match &self.config.storage {
            StorageConfig::Memory => Arc::new(InMemoryObjectStore::new()),
            StorageConfig::Local { root } => Arc::new(LocalFsObjectStore::open(root.clone())?),
        };
        Ok(store)
    }

    pub fn upload_service(&self) -> ServerResult<BlockUploadService> {
        Ok(BlockUploadService::new(
            self.open_store()?,
            Arc::new(StaticTenantLimits::new(self.config.limits.clone())),
            self.config.upload.clone(),
        ))
    }

    /// Start serving requests until ctrl-c, then wait for running
    /// validations to finish.
    pub async fn serve(self) -> ServerResult<()> {
        std::fs::create_dir_all(&self.config.upload.data_dir)?;
        let service = self.upload_service()?;
        let app = build_router(service.clone());
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!("blockgate listening on {}", self.config.bind_addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        tracing::info!(
            active = service.active_validations(),
            "waiting for block validations to finish"
        );
        service.wait_for_validations().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(err = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_construction() {
        let server = BlockgateServer::new(ServerConfig::default());
        assert_eq!(server.config().bind_addr, "127.0.0.1:8080".parse().unwrap());
    }

    #[tokio::test]
    async fn opens_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let server = BlockgateServer::new(ServerConfig {
            storage: StorageConfig::Local {
                root: dir.path().join("bucket"),
            },
            ..ServerConfig::default()
        });
        let store = server.open_store().unwrap();
        store.put("t/x", bytes::Bytes::from_static(b"1")).await.unwrap();
        assert!(store.exists("t/x").await.unwrap());
    }

    #[test]
    fn builds_service_from_config() {
        let server = BlockgateServer::new(ServerConfig {
            storage: StorageConfig::Memory,
            ..ServerConfig::default()
        });
        let service = server.upload_service().unwrap();
        assert_eq!(service.config().max_validation_concurrency, 5);
    }
}
