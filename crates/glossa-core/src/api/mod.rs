//! Boundary operations of the reconciliation engine.

mod builder;

pub use builder::ReconcileApiBuilder;

use crate::error::Result;
use crate::models::{
    BulkReconcileResult, CrossReferenceReport, ModelReconcileResult, SettleResult,
    TrainingCredentials,
};
use crate::reconcile;
use crate::stores::Stores;

/// Entry point owning the four store handles.
///
/// Every operation takes optional credentials; `None` uses the defaults
/// configured on the builder.
#[derive(Clone)]
pub struct ReconcileApi {
    stores: Stores,
    credentials: TrainingCredentials,
    max_settle_passes: u32,
}

impl ReconcileApi {
    pub fn builder() -> ReconcileApiBuilder {
        ReconcileApiBuilder::new()
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn default_credentials(&self) -> &TrainingCredentials {
        &self.credentials
    }

    fn credentials_or_default<'a>(
        &'a self,
        credentials: Option<&'a TrainingCredentials>,
    ) -> &'a TrainingCredentials {
        credentials.unwrap_or(&self.credentials)
    }

    /// Cross-reference the stores without changing anything.
    pub async fn status_report(
        &self,
        tenant_id: &str,
        credentials: Option<&TrainingCredentials>,
    ) -> Result<CrossReferenceReport> {
        reconcile::build_report(&self.stores, tenant_id, self.credentials_or_default(credentials))
            .await
    }

    /// Run the bulk repair pipeline for a tenant.
    pub async fn reconcile_tenant(
        &self,
        tenant_id: &str,
        credentials: Option<&TrainingCredentials>,
    ) -> Result<BulkReconcileResult> {
        reconcile::reconcile_tenant(
            &self.stores,
            tenant_id,
            self.credentials_or_default(credentials),
        )
        .await
    }

    /// Apply one corrective action to a single model.
    pub async fn reconcile_model(
        &self,
        tenant_id: &str,
        model_id: &str,
        credentials: Option<&TrainingCredentials>,
    ) -> Result<ModelReconcileResult> {
        reconcile::reconcile_model(
            &self.stores,
            tenant_id,
            model_id,
            self.credentials_or_default(credentials),
        )
        .await
    }

    /// Repeat [`reconcile_model`](Self::reconcile_model) until the model is
    /// settled or the configured pass cap is hit.
    pub async fn reconcile_model_until_settled(
        &self,
        tenant_id: &str,
        model_id: &str,
        credentials: Option<&TrainingCredentials>,
    ) -> Result<SettleResult> {
        reconcile::reconcile_model_until_settled(
            &self.stores,
            tenant_id,
            model_id,
            self.credentials_or_default(credentials),
            self.max_settle_passes,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CustomModel;
    use crate::stores::MemoryStores;
    use tempfile::TempDir;

    #[test]
    fn test_builder_requires_a_source_of_stores() {
        assert!(ReconcileApi::builder().build().is_err());
    }

    #[test]
    fn test_builder_rejects_missing_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        let result = ReconcileApi::builder()
            .data_dir(temp_dir.path().join("absent"))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_builder_opens_disk_backends() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");
        let api = ReconcileApi::builder()
            .data_dir(&data_dir)
            .auto_create_dirs(true)
            .build()
            .unwrap();

        let created = api
            .stores()
            .models
            .create(CustomModel::new("t1", "news", "en", "fr", "en-fr"))
            .await
            .unwrap();
        assert!(data_dir.join("registry.sqlite").exists());
        let fetched = api.stores().models.get_by_id("t1", &created.id).await.unwrap();
        assert_eq!(fetched.name, "news");
    }

    #[tokio::test]
    async fn test_operations_use_default_credentials() {
        let mem = MemoryStores::new();
        mem.training.faults.fail("get_models", "mem://default");
        let api = ReconcileApi::builder()
            .with_stores(mem.stores())
            .credentials(TrainingCredentials::new("mem://default", ""))
            .build()
            .unwrap();

        assert!(api.status_report("t1", None).await.is_err());
        let other = TrainingCredentials::new("mem://other", "");
        assert!(api.status_report("t1", Some(&other)).await.unwrap().is_consistent());
    }
}
