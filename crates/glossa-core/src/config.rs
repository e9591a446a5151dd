//! Centralized configuration for Glossa.
//!
//! Naming conventions, store tuning and network parameters shared by the
//! reconciliation engine and its backends.

use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const USER_AGENT: &'static str = "Glossa-Reconciler/0.3";
}

/// Reconciliation naming conventions and limits.
pub struct ReconcileConfig;

impl ReconcileConfig {
    /// Sentinel `trained_model_id` for models that were never trained.
    pub const UNTRAINED: &'static str = "UNTRAINED";
    /// Suffix appended to a model id to form its canonical batch id.
    pub const BATCH_ID_SUFFIX: &'static str = "BatchId";
    /// Name prefix for models created around orphaned trained models.
    pub const ORPHAN_NAME_PREFIX: &'static str = "Orphan";
    /// Project tag prefix for models created around orphaned trained models.
    pub const ORPHAN_PROJECT_PREFIX: &'static str = "Orphaned Training Models: ";
    /// Upper bound on decision-tree passes for a single settle request.
    pub const MAX_SETTLE_PASSES: u32 = 10;
}

/// Store backend configuration.
pub struct StoreConfig;

impl StoreConfig {
    pub const DATABASE_FILENAME: &'static str = "registry.sqlite";
    pub const CONTAINERS_DIR_NAME: &'static str = "containers";
    pub const BUSY_TIMEOUT_MS: u64 = 5000;
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
    pub const MODELS_PATH: &'static str = "v3/models";
    pub const API_VERSION: &'static str = "2018-05-01";
}

/// Canonical batch id for a model id.
pub fn canonical_batch_id(model_id: &str) -> String {
    format!("{}{}", model_id, ReconcileConfig::BATCH_ID_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_batch_id() {
        assert_eq!(canonical_batch_id("abc"), "abcBatchId");
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(NetworkConfig::REQUEST_TIMEOUT > Duration::ZERO);
        assert!(NetworkConfig::MAX_RETRIES >= 1);
        assert!(ReconcileConfig::MAX_SETTLE_PASSES >= 1);
    }
}
