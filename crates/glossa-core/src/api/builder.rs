//! Builder for configuring ReconcileApi initialization.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::ReconcileApi;
use crate::config::{NetworkConfig, ReconcileConfig, StoreConfig};
use crate::error::{GlossaError, Result};
use crate::models::TrainingCredentials;
use crate::network::{HttpTrainingService, RetryPolicy};
use crate::stores::{FsObjectStore, SqliteRegistry, Stores};

/// Builder for configuring ReconcileApi initialization.
///
/// Either point it at a data directory, in which case the SQLite registries,
/// the filesystem object store and the HTTP training client are created, or
/// hand it a ready-made [`Stores`].
///
/// # Example
///
/// ```rust,ignore
/// use glossa_core::{ReconcileApi, TrainingCredentials};
///
/// let api = ReconcileApi::builder()
///     .data_dir("./glossa-data")
///     .auto_create_dirs(true)
///     .credentials(TrainingCredentials::new("https://lt.example.com/api", "key"))
///     .build()?;
/// ```
pub struct ReconcileApiBuilder {
    data_dir: Option<PathBuf>,
    stores: Option<Stores>,
    credentials: TrainingCredentials,
    auto_create_dirs: bool,
    request_timeout: Duration,
    retry: RetryPolicy,
    max_settle_passes: u32,
}

impl Default for ReconcileApiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcileApiBuilder {
    pub fn new() -> Self {
        Self {
            data_dir: None,
            stores: None,
            credentials: TrainingCredentials::default(),
            auto_create_dirs: false,
            request_timeout: NetworkConfig::REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
            max_settle_passes: ReconcileConfig::MAX_SETTLE_PASSES,
        }
    }

    /// Directory holding the registry database and object containers.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Use existing store handles instead of opening backends from a data
    /// directory. Takes precedence over [`data_dir`](Self::data_dir).
    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Default training service credentials for operations that don't pass
    /// their own.
    pub fn credentials(mut self, credentials: TrainingCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Create the data directory if it doesn't exist.
    ///
    /// Default: `false` (the directory must exist)
    pub fn auto_create_dirs(mut self, enable: bool) -> Self {
        self.auto_create_dirs = enable;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Pass cap for [`ReconcileApi::reconcile_model_until_settled`].
    pub fn max_settle_passes(mut self, passes: u32) -> Self {
        self.max_settle_passes = passes.max(1);
        self
    }

    fn prepare_data_dir(&self, dir: &Path) -> Result<()> {
        if dir.exists() {
            return Ok(());
        }
        if !self.auto_create_dirs {
            return Err(GlossaError::Config {
                message: format!("Data directory does not exist: {}", dir.display()),
            });
        }
        std::fs::create_dir_all(dir).map_err(|e| GlossaError::Io {
            message: format!("Failed to create data directory: {}", dir.display()),
            path: Some(dir.to_path_buf()),
            source: Some(e),
        })
    }

    fn open_stores(&self, dir: &Path) -> Result<Stores> {
        self.prepare_data_dir(dir)?;

        let registry = Arc::new(SqliteRegistry::open_at(
            &dir.join(StoreConfig::DATABASE_FILENAME),
        )?);
        let objects = Arc::new(FsObjectStore::new(dir.join(StoreConfig::CONTAINERS_DIR_NAME)));
        let training = Arc::new(
            HttpTrainingService::with_timeout(self.request_timeout)?.with_retry(self.retry.clone()),
        );

        Ok(Stores {
            models: registry.clone(),
            batches: registry,
            objects,
            training,
        })
    }

    /// Build the ReconcileApi instance.
    pub fn build(self) -> Result<ReconcileApi> {
        let stores = match (&self.stores, &self.data_dir) {
            (Some(stores), _) => stores.clone(),
            (None, Some(dir)) => {
                let stores = self.open_stores(dir)?;
                tracing::info!("Opened stores under {}", dir.display());
                stores
            }
            (None, None) => {
                return Err(GlossaError::Config {
                    message: "either a data directory or explicit stores is required".to_string(),
                })
            }
        };

        Ok(ReconcileApi {
            stores,
            credentials: self.credentials,
            max_settle_passes: self.max_settle_passes,
        })
    }
}
