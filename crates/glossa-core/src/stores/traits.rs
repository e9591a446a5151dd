//! Interfaces to the four stores the engine reconciles.
//!
//! Each store is updated independently and there is no transaction spanning
//! them. Implementations must make every mutating call safe to retry.

use crate::error::Result;
use crate::models::{
    Batch, CustomModel, ListModelsOptions, StoredFile, TrainedModel, TrainingCredentials,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Metadata records for custom models.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// List a tenant's models, optionally filtered by project and/or name.
    async fn get_all(
        &self,
        tenant_id: &str,
        project: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<CustomModel>>;

    /// Fetch one model. Returns `ResourceNotFound` if absent.
    async fn get_by_id(&self, tenant_id: &str, id: &str) -> Result<CustomModel>;

    /// Insert a new model and return it with its first revision.
    async fn create(&self, model: CustomModel) -> Result<CustomModel>;

    /// Replace a model. The revision on `model` must match the stored one.
    async fn update(&self, model: CustomModel) -> Result<CustomModel>;

    /// Hard-delete a model. Deleting an absent model succeeds.
    async fn delete(&self, tenant_id: &str, id: &str, revision: Option<&str>) -> Result<()>;
}

/// Batch and file-reference metadata.
#[async_trait]
pub trait BatchRegistry: Send + Sync {
    async fn get_all_batches(&self, tenant_id: &str) -> Result<Vec<Batch>>;

    /// Fetch one batch. Returns `ResourceNotFound` if absent.
    async fn get_batch(&self, tenant_id: &str, batch_id: &str) -> Result<Batch>;

    /// Create `batch_id` from `batch` unless it already exists, in which case
    /// the existing batch is returned unchanged.
    async fn add_batch(&self, tenant_id: &str, batch: Batch, batch_id: &str) -> Result<Batch>;

    /// Replace the file list of an existing batch.
    async fn update_batch(&self, tenant_id: &str, batch: Batch, batch_id: &str) -> Result<Batch>;

    /// Delete a batch. Deleting an absent batch succeeds.
    async fn delete_batch(&self, tenant_id: &str, batch_id: &str) -> Result<()>;

    /// Copy `src_id` into a new batch `dst_id`. Each copied reference gets a
    /// fresh uuid; order is preserved so callers can pair source and copy.
    async fn clone_batch(&self, tenant_id: &str, src_id: &str, dst_id: &str) -> Result<Batch>;

    /// Remove references named `file_name` from one batch.
    async fn delete_file(&self, tenant_id: &str, batch_id: &str, file_name: &str) -> Result<()>;

    /// Remove references with `uuid` from every batch of the tenant.
    ///
    /// When `part_of_batch_deletion` is false and no reference exists, returns
    /// `ResourceNotFound`.
    async fn delete_file_by_uuid(
        &self,
        tenant_id: &str,
        uuid: &str,
        part_of_batch_deletion: bool,
    ) -> Result<()>;
}

/// Raw file bytes, one container per tenant.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List the tenant's container, creating it if absent.
    async fn examine_container(&self, tenant_id: &str) -> Result<Vec<StoredFile>>;

    async fn put_file(&self, tenant_id: &str, uuid: &str, bytes: &[u8]) -> Result<StoredFile>;

    async fn copy_file(&self, tenant_id: &str, src_uuid: &str, dst_uuid: &str)
        -> Result<StoredFile>;

    /// Delete a file. Deleting an absent file succeeds.
    async fn delete_file(&self, tenant_id: &str, uuid: &str) -> Result<()>;
}

/// Remote trained-model lifecycle.
#[async_trait]
pub trait TrainingService: Send + Sync {
    async fn get_models(
        &self,
        credentials: &TrainingCredentials,
        options: ListModelsOptions,
    ) -> Result<Vec<TrainedModel>>;

    /// Delete a trained model. Deleting an absent model succeeds.
    async fn delete_model(&self, credentials: &TrainingCredentials, model_id: &str) -> Result<()>;
}

/// Handles to all four stores.
#[derive(Clone)]
pub struct Stores {
    pub models: Arc<dyn ModelRegistry>,
    pub batches: Arc<dyn BatchRegistry>,
    pub objects: Arc<dyn ObjectStore>,
    pub training: Arc<dyn TrainingService>,
}
