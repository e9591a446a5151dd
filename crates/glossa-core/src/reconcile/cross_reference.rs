//! Cross-reference of the four stores for one tenant.
//!
//! [`fetch_snapshot`] reads every store concurrently; [`cross_reference`] is a
//! pure function over that snapshot that decides who owns what and which
//! models are defective.

use super::claims::{ownership_order, ClaimOutcome, ClaimTable};
use crate::error::{GlossaError, Result};
use crate::models::{
    Batch, CrossReferenceReport, CustomModel, DefectCode, ListModelsOptions, ModelStatus,
    StoredFile, TrainedModel, TrainingCredentials, UnreconciledModel, UnreconciledSet,
};
use crate::stores::Stores;
use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info};

/// Point-in-time contents of all four stores for a tenant.
#[derive(Debug, Clone, Default)]
pub struct TenantSnapshot {
    pub tenant_id: String,
    pub models: Vec<CustomModel>,
    pub batches: Vec<Batch>,
    pub files: Vec<StoredFile>,
    /// Customizable trained models only.
    pub trained_models: Vec<TrainedModel>,
}

/// Read all four stores concurrently.
///
/// Any failing read aborts with `StoreUnavailable`; no partial snapshot is
/// returned.
pub async fn fetch_snapshot(
    stores: &Stores,
    tenant_id: &str,
    credentials: &TrainingCredentials,
) -> Result<TenantSnapshot> {
    let (models, batches, files, trained_models) = tokio::try_join!(
        async {
            stores
                .models
                .get_all(tenant_id, None, None)
                .await
                .map_err(|e| GlossaError::store_unavailable("model registry", e))
        },
        async {
            stores
                .batches
                .get_all_batches(tenant_id)
                .await
                .map_err(|e| GlossaError::store_unavailable("batch registry", e))
        },
        async {
            stores
                .objects
                .examine_container(tenant_id)
                .await
                .map_err(|e| GlossaError::store_unavailable("object store", e))
        },
        async {
            stores
                .training
                .get_models(credentials, ListModelsOptions::default())
                .await
                .map_err(|e| GlossaError::store_unavailable("training service", e))
        },
    )?;

    Ok(TenantSnapshot {
        tenant_id: tenant_id.to_string(),
        models,
        batches,
        files,
        trained_models: trained_models
            .into_iter()
            .filter(TrainedModel::is_customizable)
            .collect(),
    })
}

/// Snapshot the stores and cross-reference them.
pub async fn build_report(
    stores: &Stores,
    tenant_id: &str,
    credentials: &TrainingCredentials,
) -> Result<CrossReferenceReport> {
    let snapshot = fetch_snapshot(stores, tenant_id, credentials).await?;
    let report = cross_reference(&snapshot);
    info!(
        tenant = tenant_id,
        reconciled = report.reconciled.len(),
        unreconciled = report.unreconciled.custom_models.len(),
        orphan_batches = report.unreconciled.batches.len(),
        orphan_files = report.unreconciled.files.len(),
        orphan_trained_models = report.unreconciled.trained_models.len(),
        "cross-reference complete"
    );
    Ok(report)
}

/// Classify every resource in `snapshot`.
///
/// Models are visited in [`ownership_order`], so contested ownership of a
/// non-canonical batch, a shared file or a trained model always goes to the
/// oldest model. Every check runs for every model so that claims are
/// recorded even for defective models; only the first defect is reported.
pub fn cross_reference(snapshot: &TenantSnapshot) -> CrossReferenceReport {
    let batches_by_id: HashMap<&str, &Batch> = snapshot
        .batches
        .iter()
        .map(|b| (b.batch_id.as_str(), b))
        .collect();
    let canonical_owner: HashMap<String, &str> = snapshot
        .models
        .iter()
        .map(|m| (m.canonical_batch_id(), m.id.as_str()))
        .collect();

    let mut batch_claims = ClaimTable::new(snapshot.batches.iter().map(|b| b.batch_id.as_str()));
    let mut file_claims = ClaimTable::new(snapshot.files.iter().map(|f| f.uuid.as_str()));
    let mut trained_claims =
        ClaimTable::new(snapshot.trained_models.iter().map(|t| t.model_id.as_str()));

    let mut ordered: Vec<&CustomModel> = snapshot.models.iter().collect();
    ordered.sort_by(|a, b| ownership_order(a, b));

    let mut reconciled = Vec::new();
    let mut unreconciled = Vec::new();

    for model in ordered {
        let mut defect: Option<DefectCode> = None;
        let mut missing_files = Vec::new();

        let linked = model
            .file_batch_id
            .as_deref()
            .and_then(|id| batches_by_id.get(id).copied());

        let owned = match linked {
            None => {
                defect.get_or_insert(DefectCode::MissingBatch);
                None
            }
            Some(batch) if model.has_canonical_batch() => {
                batch_claims.claim(&batch.batch_id, &model.id);
                Some(batch)
            }
            Some(batch) => {
                let other_canonical = canonical_owner
                    .get(&batch.batch_id)
                    .is_some_and(|owner| *owner != model.id);
                let held = batch_claims
                    .owner(&batch.batch_id)
                    .is_some_and(|owner| owner != model.id);
                if other_canonical || held {
                    defect.get_or_insert(DefectCode::BatchUsedElsewhere);
                    None
                } else {
                    batch_claims.claim(&batch.batch_id, &model.id);
                    Some(batch)
                }
            }
        };

        if let Some(batch) = owned {
            for file in &batch.files {
                match file_claims.claim(&file.uuid, &batch.batch_id) {
                    ClaimOutcome::Granted | ClaimOutcome::AlreadyOwned => {}
                    ClaimOutcome::HeldBy(_) | ClaimOutcome::Absent => {
                        missing_files.push(file.uuid.clone())
                    }
                }
            }
            if !missing_files.is_empty() {
                defect.get_or_insert(DefectCode::MissingFile);
            }
        }

        if model.is_trained() {
            match trained_claims.claim(&model.trained_model_id, &model.id) {
                ClaimOutcome::Granted | ClaimOutcome::AlreadyOwned => {}
                ClaimOutcome::Absent => {
                    defect.get_or_insert(DefectCode::MissingTrainedModel);
                }
                ClaimOutcome::HeldBy(_) => {
                    defect.get_or_insert(DefectCode::TrainedModelUsedElsewhere);
                }
            }
        }

        if defect.is_none()
            && model.status == ModelStatus::FilesLoaded
            && linked.map_or(true, Batch::is_empty)
        {
            defect = Some(DefectCode::IncorrectStatus);
        }

        match defect {
            Some(defect) => {
                debug!("Model {} is unreconciled: {}", model.id, defect);
                unreconciled.push(UnreconciledModel {
                    model: model.clone(),
                    defect,
                    missing_files,
                });
            }
            None => reconciled.push(model.clone()),
        }
    }

    CrossReferenceReport {
        tenant_id: snapshot.tenant_id.clone(),
        generated_at: Utc::now(),
        reconciled,
        unreconciled: UnreconciledSet {
            custom_models: unreconciled,
            batches: snapshot
                .batches
                .iter()
                .filter(|b| batch_claims.is_unclaimed(&b.batch_id))
                .cloned()
                .collect(),
            files: snapshot
                .files
                .iter()
                .filter(|f| file_claims.is_unclaimed(&f.uuid))
                .cloned()
                .collect(),
            trained_models: snapshot
                .trained_models
                .iter()
                .filter(|t| trained_claims.is_unclaimed(&t.model_id))
                .cloned()
                .collect(),
        },
    }
}
