use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::Serialize;

/// Totals of blocks committed through the upload API for one tenant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TenantUploadStats {
    pub blocks: u64,
    pub bytes: u64,
    pub files: u64,
}

/// Per-tenant upload counters.
#[derive(Debug, Default)]
pub struct UploadMetrics {
    tenants: RwLock<BTreeMap<String, TenantUploadStats>>,
}

impl UploadMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one committed block.
    pub fn record_block(&self, tenant: &str, bytes: u64, files: u64) {
        let mut tenants = self.tenants.write().expect("lock poisoned");
        let stats = tenants.entry(tenant.to_string()).or_default();
        stats.blocks += 1;
        stats.bytes += bytes;
        stats.files += files;
    }

    pub fn tenant(&self, tenant: &str) -> TenantUploadStats {
        self.tenants
            .read()
            .expect("lock poisoned")
            .get(tenant)
            .copied()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, TenantUploadStats> {
        self.tenants.read().expect("lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_per_tenant() {
        let m = UploadMetrics::new();
        m.record_block("a", 100, 3);
        m.record_block("a", 50, 2);
        m.record_block("b", 1, 1);

        assert_eq!(
            m.tenant("a"),
            TenantUploadStats {
                blocks: 2,
                bytes: 150,
                files: 5
            }
        );
        assert_eq!(m.tenant("missing"), TenantUploadStats::default());
        assert_eq!(m.snapshot().len(), 2);
    }
}
