use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_secs;

/// Per-tenant upload policy.
pub trait TenantLimits: Send + Sync {
    /// Whether the tenant may use the upload API at all.
    fn block_upload_enabled(&self, tenant: &str) -> bool;

    /// Whether finished uploads are validated before being committed.
    fn block_upload_validation_enabled(&self, tenant: &str) -> bool;

    /// Whether validation also checks every chunk segment.
    fn block_upload_verify_chunks(&self, tenant: &str) -> bool;

    /// Ceiling on the total size of a block's files. Zero means unlimited.
    fn block_upload_max_block_size_bytes(&self, tenant: &str) -> i64;

    /// Blocks whose max time is older than this are refused. Zero disables
    /// the check.
    fn blocks_retention_period(&self, tenant: &str) -> Duration;
}

/// Limits for one tenant, as written in the configuration file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantLimitsConfig {
    pub block_upload_enabled: bool,
    pub validation_enabled: bool,
    pub verify_chunks: bool,
    pub max_block_size_bytes: i64,
    #[serde(rename = "retention_period_secs", with = "duration_secs")]
    pub retention_period: Duration,
}

impl Default for TenantLimitsConfig {
    fn default() -> Self {
        Self {
            block_upload_enabled: false,
            validation_enabled: true,
            verify_chunks: true,
            max_block_size_bytes: 0,
            retention_period: Duration::ZERO,
        }
    }
}

/// Defaults plus per-tenant overrides.
///
/// An override replaces the defaults for its tenant as a whole; fields it
/// leaves out take the built-in defaults, not the configured ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub defaults: TenantLimitsConfig,
    pub tenants: BTreeMap<String, TenantLimitsConfig>,
}

/// [`TenantLimits`] backed by a fixed [`LimitsConfig`].
#[derive(Clone, Debug, Default)]
pub struct StaticTenantLimits {
    config: LimitsConfig,
}

impl StaticTenantLimits {
    pub fn new(config: LimitsConfig) -> Self {
        Self { config }
    }

    /// Same limits for every tenant.
    pub fn uniform(defaults: TenantLimitsConfig) -> Self {
        Self::new(LimitsConfig {
            defaults,
            tenants: BTreeMap::new(),
        })
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>, limits: TenantLimitsConfig) -> Self {
        self.config.tenants.insert(tenant.into(), limits);
        self
    }

    fn get(&self, tenant: &str) -> &TenantLimitsConfig {
        self.config.tenants.get(tenant).unwrap_or(&self.config.defaults)
    }
}

impl TenantLimits for StaticTenantLimits {
    fn block_upload_enabled(&self, tenant: &str) -> bool {
        self.get(tenant).block_upload_enabled
    }

    fn block_upload_validation_enabled(&self, tenant: &str) -> bool {
        self.get(tenant).validation_enabled
    }

    fn block_upload_verify_chunks(&self, tenant: &str) -> bool {
        self.get(tenant).verify_chunks
    }

    fn block_upload_max_block_size_bytes(&self, tenant: &str) -> i64 {
        self.get(tenant).max_block_size_bytes
    }

    fn blocks_retention_period(&self, tenant: &str) -> Duration {
        self.get(tenant).retention_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_disabled_by_default() {
        let limits = StaticTenantLimits::default();
        assert!(!limits.block_upload_enabled("t"));
        assert!(limits.block_upload_validation_enabled("t"));
        assert_eq!(limits.block_upload_max_block_size_bytes("t"), 0);
        assert_eq!(limits.blocks_retention_period("t"), Duration::ZERO);
    }

    #[test]
    fn tenant_override() {
        let limits = StaticTenantLimits::uniform(TenantLimitsConfig {
            block_upload_enabled: true,
            ..Default::default()
        })
        .with_tenant(
            "small",
            TenantLimitsConfig {
                block_upload_enabled: true,
                max_block_size_bytes: 10,
                validation_enabled: false,
                ..Default::default()
            },
        );
        assert_eq!(limits.block_upload_max_block_size_bytes("small"), 10);
        assert!(!limits.block_upload_validation_enabled("small"));
        assert_eq!(limits.block_upload_max_block_size_bytes("other"), 0);
        assert!(limits.block_upload_validation_enabled("other"));
    }

    #[test]
    fn parse_from_json() {
        let cfg: LimitsConfig = serde_json::from_str(
            r#"{
                "defaults": {"block_upload_enabled": true, "retention_period_secs": 3600},
                "tenants": {"t1": {"verify_chunks": false}}
            }"#,
        )
        .unwrap();
        let limits = StaticTenantLimits::new(cfg);
        assert_eq!(limits.blocks_retention_period("x"), Duration::from_secs(3600));
        assert!(!limits.block_upload_verify_chunks("t1"));
        assert!(!limits.block_upload_enabled("t1"));
    }
}
