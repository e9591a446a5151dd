//! Glossa Core - reconciliation engine for custom translation models.
//!
//! A custom model is spread over four stores that are updated independently:
//! the model registry, the batch registry, the object store holding training
//! files, and the remote training service. Partial failures leave them
//! inconsistent. This crate cross-references the stores for a tenant and
//! applies idempotent repairs, either in bulk or for a single model.
//!
//! # Example
//!
//! ```rust,ignore
//! use glossa_core::{ReconcileApi, TrainingCredentials};
//!
//! #[tokio::main]
//! async fn main() -> glossa_core::Result<()> {
//!     let api = ReconcileApi::builder()
//!         .data_dir("/var/lib/glossa")
//!         .credentials(TrainingCredentials::new("https://lt.example.com/api", "key"))
//!         .build()?;
//!
//!     let report = api.status_report("tenant-1", None).await?;
//!     println!("{} models need repair", report.unreconciled.custom_models.len());
//!
//!     let result = api.reconcile_tenant("tenant-1", None).await?;
//!     println!("consistent after repair: {}", result.post_state.is_consistent());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod network;
pub mod reconcile;
pub mod stores;

mod api;

pub use api::{ReconcileApi, ReconcileApiBuilder};
pub use error::{GlossaError, Result};
pub use models::{
    Batch, BulkReconcileResult, CompleteModel, CrossReferenceReport, CustomModel, DefectCode,
    FileRef, ModelAction, ModelReconcileResult, ModelStatus, SettleResult, StoredFile,
    TrainedModel, TrainingCredentials,
};
pub use stores::{
    BatchRegistry, FsObjectStore, MemoryStores, ModelRegistry, ObjectStore, SqliteRegistry,
    Stores, TrainingService,
};
