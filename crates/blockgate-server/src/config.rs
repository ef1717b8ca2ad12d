use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use blockgate_upload::{LimitsConfig, UploadConfig};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Top-level server configuration, usually read from a TOML file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            storage: StorageConfig::default(),
            upload: UploadConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml(s: &str) -> ServerResult<Self> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml(&s)
    }
}

/// Object store backend holding the blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Lost on restart.
    Memory,
    /// Objects as files below `root`.
    Local { root: PathBuf },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Local {
            root: PathBuf::from("./bucket"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(c.upload.max_validation_concurrency, 5);
        assert!(!c.limits.defaults.block_upload_enabled);
        assert!(matches!(c.storage, StorageConfig::Local { .. }));
    }

    #[test]
    fn parse_toml() {
        let c = ServerConfig::from_toml(
            r#"
            bind_addr = "0.0.0.0:9000"

            [storage]
            backend = "memory"

            [upload]
            max_validation_concurrency = 2
            heartbeat_interval_secs = 10

            [limits.defaults]
            block_upload_enabled = true

            [limits.tenants.team-a]
            block_upload_enabled = true
            max_block_size_bytes = 1024
            retention_period_secs = 86400
            "#,
        )
        .unwrap();

        assert_eq!(c.bind_addr.port(), 9000);
        assert_eq!(c.storage, StorageConfig::Memory);
        assert_eq!(c.upload.max_validation_concurrency, 2);
        assert_eq!(c.upload.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(c.upload.heartbeat_timeout, Duration::from_secs(300));
        let team = &c.limits.tenants["team-a"];
        assert_eq!(team.max_block_size_bytes, 1024);
        assert_eq!(team.retention_period, Duration::from_secs(86400));
    }

    #[test]
    fn local_storage() {
        let c = ServerConfig::from_toml("[storage]\nbackend = \"local\"\nroot = \"/srv/blocks\"\n").unwrap();
        assert_eq!(
            c.storage,
            StorageConfig::Local {
                root: PathBuf::from("/srv/blocks")
            }
        );
    }

    #[test]
    fn invalid_toml() {
        let err = ServerConfig::from_toml("bind_addr = 12").unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn missing_file() {
        let err = ServerConfig::from_file("/nonexistent/blockgate.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/blockgate.toml"));
    }
}
