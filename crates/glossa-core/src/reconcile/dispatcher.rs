//! Bulk repair pipeline for a whole tenant.
//!
//! Stages run in a fixed order. Inside a stage every item is repaired
//! concurrently behind [`settle_all`], so one failing item never blocks the
//! others. Only a failed cross-reference snapshot aborts the run.

use super::cross_reference::build_report;
use super::settle::settle_all;
use crate::config::ReconcileConfig;
use crate::error::{GlossaError, Result};
use crate::models::{
    Batch, BulkReconcileResult, CustomModel, DefectCode, ModelStatus, TrainedModel,
    TrainingCredentials, UnreconciledModel,
};
use crate::stores::Stores;
use chrono::Utc;
use tracing::info;

pub const STAGE_ORPHAN_FILES: &str = "delete orphan files";
pub const STAGE_ORPHAN_BATCHES: &str = "delete orphan batches";
pub const STAGE_MISSING_FILES: &str = "strip missing files";
pub const STAGE_MISSING_BATCHES: &str = "create missing batches";
pub const STAGE_SHARED_BATCHES: &str = "clone shared batches";
pub const STAGE_MISSING_TRAINED: &str = "reset missing trained models";
pub const STAGE_ORPHAN_TRAINED: &str = "wrap orphan trained models";
pub const STAGE_INCORRECT_STATUS: &str = "correct status";

/// Reconcile every resource of a tenant.
pub async fn reconcile_tenant(
    stores: &Stores,
    tenant_id: &str,
    credentials: &TrainingCredentials,
) -> Result<BulkReconcileResult> {
    let pre_state = build_report(stores, tenant_id, credentials).await?;
    let unreconciled = &pre_state.unreconciled;
    let mut stages = Vec::new();

    stages.push(
        settle_all(
            STAGE_ORPHAN_FILES,
            unreconciled.files.iter().map(|file| {
                let fut = stores.objects.delete_file(tenant_id, &file.uuid);
                (file.uuid.clone(), fut)
            }),
        )
        .await,
    );

    stages.push(
        settle_all(
            STAGE_ORPHAN_BATCHES,
            unreconciled.batches.iter().map(|batch| {
                let fut = stores.batches.delete_batch(tenant_id, &batch.batch_id);
                (batch.batch_id.clone(), fut)
            }),
        )
        .await,
    );

    stages.push(
        settle_all(
            STAGE_MISSING_FILES,
            unreconciled
                .with_defect(DefectCode::MissingFile)
                .map(|entry| (entry.model.id.clone(), strip_missing_files(stores, entry))),
        )
        .await,
    );

    stages.push(
        settle_all(
            STAGE_MISSING_BATCHES,
            unreconciled
                .with_defect(DefectCode::MissingBatch)
                .map(|entry| (entry.model.id.clone(), create_canonical_batch(stores, &entry.model))),
        )
        .await,
    );

    stages.push(
        settle_all(
            STAGE_SHARED_BATCHES,
            unreconciled
                .with_defect(DefectCode::BatchUsedElsewhere)
                .map(|entry| (entry.model.id.clone(), clone_shared_batch(stores, &entry.model))),
        )
        .await,
    );

    stages.push(
        settle_all(
            STAGE_MISSING_TRAINED,
            unreconciled
                .with_defect(DefectCode::MissingTrainedModel)
                .map(|entry| (entry.model.id.clone(), reset_training(stores, &entry.model))),
        )
        .await,
    );

    let stamp = Utc::now().timestamp_millis();
    stages.push(
        settle_all(
            STAGE_ORPHAN_TRAINED,
            unreconciled
                .trained_models
                .iter()
                .enumerate()
                .map(|(counter, trained)| {
                    let name = format!(
                        "{}{}n{}",
                        ReconcileConfig::ORPHAN_NAME_PREFIX,
                        stamp,
                        counter
                    );
                    (
                        trained.model_id.clone(),
                        wrap_orphan_trained_model(stores, tenant_id, trained, name),
                    )
                }),
        )
        .await,
    );

    let mid_state = build_report(stores, tenant_id, credentials).await?;
    stages.push(
        settle_all(
            STAGE_INCORRECT_STATUS,
            mid_state
                .unreconciled
                .with_defect(DefectCode::IncorrectStatus)
                .map(|entry| (entry.model.id.clone(), demote_status(stores, &entry.model))),
        )
        .await,
    );

    let post_state = build_report(stores, tenant_id, credentials).await?;

    let failures: usize = stages.iter().map(|s| s.failures.len()).sum();
    info!(
        tenant = tenant_id,
        failures,
        remaining = post_state.unreconciled.custom_models.len(),
        "tenant reconciliation finished"
    );

    Ok(BulkReconcileResult {
        pre_state,
        post_state,
        stages,
    })
}

/// Re-read a model so updates carry its current revision.
async fn fresh(stores: &Stores, model: &CustomModel) -> Result<CustomModel> {
    stores.models.get_by_id(&model.tenant_id, &model.id).await
}

async fn link_batch(stores: &Stores, model: &CustomModel, batch_id: &str) -> Result<()> {
    let mut current = fresh(stores, model).await?;
    if current.file_batch_id.as_deref() == Some(batch_id) {
        return Ok(());
    }
    current.file_batch_id = Some(batch_id.to_string());
    stores.models.update(current).await?;
    Ok(())
}

async fn strip_missing_files(stores: &Stores, entry: &UnreconciledModel) -> Result<()> {
    let model = &entry.model;
    let batch_id = model
        .file_batch_id
        .as_deref()
        .ok_or_else(|| GlossaError::not_found("batch", model.canonical_batch_id()))?;
    let mut batch = stores.batches.get_batch(&model.tenant_id, batch_id).await?;
    if batch.strip_uuids(&entry.missing_files) > 0 {
        stores
            .batches
            .update_batch(&model.tenant_id, batch, batch_id)
            .await?;
    }
    Ok(())
}

async fn create_canonical_batch(stores: &Stores, model: &CustomModel) -> Result<()> {
    let batch_id = model.canonical_batch_id();
    stores
        .batches
        .add_batch(
            &model.tenant_id,
            Batch::empty(model.tenant_id.as_str(), batch_id.as_str()),
            &batch_id,
        )
        .await?;
    link_batch(stores, model, &batch_id).await
}

/// Give the model its own copy of a batch it shares, files included.
async fn clone_shared_batch(stores: &Stores, model: &CustomModel) -> Result<()> {
    let tenant_id = model.tenant_id.as_str();
    let canonical = model.canonical_batch_id();

    match stores.batches.get_batch(tenant_id, &canonical).await {
        Ok(_) => return link_batch(stores, model, &canonical).await,
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }

    let src_id = model
        .file_batch_id
        .as_deref()
        .ok_or_else(|| GlossaError::not_found("batch", canonical.as_str()))?;
    let source = stores.batches.get_batch(tenant_id, src_id).await?;
    let clone = stores.batches.clone_batch(tenant_id, src_id, &canonical).await?;
    for (src, dst) in source.files.iter().zip(&clone.files) {
        stores
            .objects
            .copy_file(tenant_id, &src.uuid, &dst.uuid)
            .await?;
    }

    link_batch(stores, model, &canonical).await
}

async fn reset_training(stores: &Stores, model: &CustomModel) -> Result<()> {
    let mut current = fresh(stores, model).await?;
    let has_files = match current.file_batch_id.as_deref() {
        Some(batch_id) => match stores.batches.get_batch(&current.tenant_id, batch_id).await {
            Ok(batch) => !batch.is_empty(),
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e),
        },
        None => false,
    };
    current.reset_training(has_files);
    stores.models.update(current).await?;
    Ok(())
}

async fn wrap_orphan_trained_model(
    stores: &Stores,
    tenant_id: &str,
    trained: &TrainedModel,
    name: String,
) -> Result<()> {
    let mut wrapper = CustomModel::new(
        tenant_id,
        name,
        trained.source.as_str(),
        trained.target.as_str(),
        trained.base_model_id.as_str(),
    );
    wrapper.domain = trained.domain.clone();
    wrapper.project = format!(
        "{}{}-{}",
        ReconcileConfig::ORPHAN_PROJECT_PREFIX,
        trained.source,
        trained.target
    );
    wrapper.trained_model_id = trained.model_id.clone();
    wrapper.set_status(ModelStatus::Trained);

    let batch_id = wrapper.canonical_batch_id();
    stores
        .batches
        .add_batch(tenant_id, Batch::empty(tenant_id, batch_id.as_str()), &batch_id)
        .await?;
    let created = stores.models.create(wrapper).await?;
    info!(
        "Wrapped orphan trained model {} as {}",
        trained.model_id, created.name
    );
    Ok(())
}

async fn demote_status(stores: &Stores, model: &CustomModel) -> Result<()> {
    let mut current = fresh(stores, model).await?;
    current.set_status(ModelStatus::Created);
    stores.models.update(current).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileRef;
    use crate::stores::{BatchRegistry, MemoryStores, ModelRegistry, ObjectStore};
    use chrono::DateTime;

    const TENANT: &str = "t1";

    fn creds() -> TrainingCredentials {
        TrainingCredentials::new("mem://lt", "key")
    }

    fn model(id: &str, created: i64) -> CustomModel {
        let mut m = CustomModel::new(TENANT, format!("name-{id}"), "en", "fr", "en-fr");
        m.id = id.into();
        m.file_batch_id = Some(m.canonical_batch_id());
        m.creation_date = DateTime::from_timestamp(created, 0);
        m
    }

    async fn seed_batch(mem: &MemoryStores, batch_id: &str, uuids: &[&str]) {
        let batch = Batch {
            tenant_id: TENANT.into(),
            batch_id: batch_id.into(),
            files: uuids
                .iter()
                .map(|u| FileRef {
                    uuid: u.to_string(),
                    file_name: format!("{u}.tmx"),
                    file_size: 3,
                    training_file_option: "parallel_corpus".into(),
                })
                .collect(),
        };
        mem.batches.add_batch(TENANT, batch, batch_id).await.unwrap();
    }

    fn stage<'a>(result: &'a BulkReconcileResult, name: &str) -> &'a crate::models::StageReport {
        result.stages.iter().find(|s| s.stage == name).unwrap()
    }

    #[tokio::test]
    async fn test_orphan_files_and_batches_removed() {
        let mem = MemoryStores::new();
        mem.models.create(model("a", 1)).await.unwrap();
        seed_batch(&mem, "aBatchId", &["f1"]).await;
        seed_batch(&mem, "stray", &["f2"]).await;
        for uuid in ["f1", "f2", "f3"] {
            mem.objects.put_file(TENANT, uuid, b"abc").await.unwrap();
        }

        let stores = mem.stores();
        let result = reconcile_tenant(&stores, TENANT, &creds()).await.unwrap();
        assert_eq!(result.pre_state.unreconciled.files.len(), 2);
        assert!(result.post_state.is_consistent());

        let files = stores.objects.examine_container(TENANT).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].uuid, "f1");
        assert!(stores.batches.get_batch(TENANT, "stray").await.is_err());
    }

    #[tokio::test]
    async fn test_shared_batch_is_cloned_with_files() {
        let mem = MemoryStores::new();
        mem.models.create(model("a", 1)).await.unwrap();
        let mut b = model("b", 2);
        b.file_batch_id = Some("aBatchId".into());
        mem.models.create(b).await.unwrap();
        seed_batch(&mem, "aBatchId", &["f1"]).await;
        mem.objects.put_file(TENANT, "f1", b"abc").await.unwrap();

        let stores = mem.stores();
        let result = reconcile_tenant(&stores, TENANT, &creds()).await.unwrap();
        assert!(result.post_state.is_consistent(), "{:?}", result.post_state);

        let original = stores.batches.get_batch(TENANT, "aBatchId").await.unwrap();
        let clone = stores.batches.get_batch(TENANT, "bBatchId").await.unwrap();
        assert_eq!(original.files[0].uuid, "f1");
        assert_eq!(clone.files.len(), 1);
        assert_ne!(clone.files[0].uuid, "f1");
        assert_eq!(clone.files[0].file_name, "f1.tmx");

        let b = stores.models.get_by_id(TENANT, "b").await.unwrap();
        assert_eq!(b.file_batch_id.as_deref(), Some("bBatchId"));
        assert_eq!(stores.objects.examine_container(TENANT).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_orphan_trained_model_is_wrapped() {
        let mem = MemoryStores::new();
        mem.training
            .insert(
                &creds(),
                TrainedModel {
                    model_id: "T9".into(),
                    name: "lost".into(),
                    base_model_id: "en-de".into(),
                    source: "en".into(),
                    target: "de".into(),
                    domain: "legal".into(),
                    status: "available".into(),
                },
            )
            .await;

        let stores = mem.stores();
        let result = reconcile_tenant(&stores, TENANT, &creds()).await.unwrap();
        assert!(result.post_state.is_consistent());

        let models = stores.models.get_all(TENANT, None, None).await.unwrap();
        assert_eq!(models.len(), 1);
        let wrapper = &models[0];
        assert!(wrapper.name.starts_with("Orphan"));
        assert!(wrapper.name.ends_with("n0"));
        assert_eq!(wrapper.project, "Orphaned Training Models: en-de");
        assert_eq!(wrapper.status, ModelStatus::Trained);
        assert_eq!(wrapper.trained_model_id, "T9");
        assert!(stores
            .batches
            .get_batch(TENANT, &wrapper.canonical_batch_id())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_status_invariant_after_run() {
        let mem = MemoryStores::new();
        let mut stale = model("a", 1);
        stale.trained_model_id = "gone".into();
        stale.status = ModelStatus::Trained;
        let mut unbatched = model("b", 2);
        unbatched.file_batch_id = None;
        unbatched.status = ModelStatus::FilesLoaded;
        let mut empty = model("c", 3);
        empty.status = ModelStatus::FilesLoaded;
        for m in [stale, unbatched, empty] {
            mem.models.create(m).await.unwrap();
        }
        seed_batch(&mem, "aBatchId", &[]).await;
        seed_batch(&mem, "cBatchId", &[]).await;

        let stores = mem.stores();
        let result = reconcile_tenant(&stores, TENANT, &creds()).await.unwrap();
        assert!(result.post_state.is_consistent(), "{:?}", result.post_state);

        for m in stores.models.get_all(TENANT, None, None).await.unwrap() {
            let batch = stores
                .batches
                .get_batch(TENANT, m.file_batch_id.as_deref().unwrap())
                .await
                .unwrap();
            if m.status == ModelStatus::FilesLoaded {
                assert!(!batch.is_empty());
            }
        }
        let a = stores.models.get_by_id(TENANT, "a").await.unwrap();
        assert_eq!(a.trained_model_id, ReconcileConfig::UNTRAINED);
        assert_eq!(a.status, ModelStatus::Created);
    }

    #[tokio::test]
    async fn test_second_run_changes_nothing() {
        let mem = MemoryStores::new();
        let mut a = model("a", 1);
        a.file_batch_id = None;
        mem.models.create(a).await.unwrap();
        mem.models.create(model("b", 2)).await.unwrap();
        seed_batch(&mem, "bBatchId", &["f1", "f2"]).await;
        mem.objects.put_file(TENANT, "f1", b"abc").await.unwrap();
        mem.objects.put_file(TENANT, "junk", b"abc").await.unwrap();

        let stores = mem.stores();
        let first = reconcile_tenant(&stores, TENANT, &creds()).await.unwrap();
        assert!(first.post_state.is_consistent());

        let second = reconcile_tenant(&stores, TENANT, &creds()).await.unwrap();
        assert!(second.pre_state.is_consistent());
        assert!(second.stages.iter().all(|s| s.attempted == 0));
        assert_eq!(second.post_state.reconciled, first.post_state.reconciled);
    }

    #[tokio::test]
    async fn test_item_failure_is_isolated() {
        let mem = MemoryStores::new();
        mem.models.create(model("a", 1)).await.unwrap();
        seed_batch(&mem, "aBatchId", &[]).await;
        for uuid in ["o1", "o2", "o3"] {
            mem.objects.put_file(TENANT, uuid, b"abc").await.unwrap();
        }
        mem.objects.faults.fail("delete_file", "o2");

        let stores = mem.stores();
        let result = reconcile_tenant(&stores, TENANT, &creds()).await.unwrap();
        let report = stage(&result, STAGE_ORPHAN_FILES);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failures[0].item, "o2");

        let files = stores.objects.examine_container(TENANT).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].uuid, "o2");
        assert_eq!(result.post_state.unreconciled.files.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_aborts() {
        let mem = MemoryStores::new();
        mem.batches.faults.fail("get_all_batches", TENANT);

        let err = reconcile_tenant(&mem.stores(), TENANT, &creds())
            .await
            .unwrap_err();
        assert!(matches!(err, GlossaError::StoreUnavailable { ref store, .. } if store == "batch registry"));
    }
}
