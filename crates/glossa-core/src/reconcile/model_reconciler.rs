//! Targeted reconciliation of a single custom model.
//!
//! A pass assembles the model's complete resource graph, picks exactly one
//! corrective action with [`choose_action`] and applies it. Repeated passes
//! converge on [`ModelAction::NoOp`].

use crate::error::Result;
use crate::models::{
    Batch, CompleteModel, CustomModel, ListModelsOptions, ModelAction, ModelReconcileResult,
    ModelStatus, SettleResult, TrainedModel, TrainingCredentials,
};
use crate::stores::Stores;
use std::collections::HashSet;
use tracing::{debug, info};

/// Turn a not-found error into `None`.
fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// The model's batch: its linked batch if present, else its canonical one.
async fn find_batch(stores: &Stores, model: &CustomModel) -> Result<Option<Batch>> {
    let canonical = model.canonical_batch_id();
    if let Some(linked) = model.file_batch_id.as_deref() {
        if let Some(batch) = optional(stores.batches.get_batch(&model.tenant_id, linked).await)? {
            return Ok(Some(batch));
        }
        if linked == canonical {
            return Ok(None);
        }
    }
    optional(stores.batches.get_batch(&model.tenant_id, &canonical).await)
}

/// Trained model for `model`: a name match, lowest id first.
///
/// Wrappers created around orphaned trained models carry a generated name,
/// so for them the linked `trained_model_id` is accepted as well.
fn find_trained_model(model: &CustomModel, trained: &[TrainedModel]) -> Option<TrainedModel> {
    trained
        .iter()
        .filter(|t| t.name == model.name)
        .min_by(|a, b| a.model_id.cmp(&b.model_id))
        .or_else(|| {
            if model.is_trained() && model.is_orphan_wrapper() {
                trained.iter().find(|t| t.model_id == model.trained_model_id)
            } else {
                None
            }
        })
        .cloned()
}

/// Gather every resource linked to one model.
pub async fn assemble_complete_model(
    stores: &Stores,
    tenant_id: &str,
    model_id: &str,
    credentials: &TrainingCredentials,
) -> Result<CompleteModel> {
    let model = stores.models.get_by_id(tenant_id, model_id).await?;

    let (duplicate_models, batch, files, trained) = tokio::try_join!(
        stores.models.get_all(tenant_id, None, Some(model.name.as_str())),
        find_batch(stores, &model),
        stores.objects.examine_container(tenant_id),
        stores
            .training
            .get_models(credentials, ListModelsOptions::default()),
    )?;

    let trained: Vec<TrainedModel> = trained
        .into_iter()
        .filter(TrainedModel::is_customizable)
        .collect();
    let trained_model_details = find_trained_model(&model, &trained);

    Ok(CompleteModel {
        custom_model_details: model,
        file_batch_details: batch,
        batch_files: files,
        trained_model_details,
        duplicate_models,
    })
}

/// Pick the duplicate to remove from a same-named group.
///
/// Among dated models the oldest goes (ties: larger id), so the most recent
/// record survives. With no dated model the largest id goes.
pub fn duplicate_to_remove(duplicates: &[CustomModel]) -> Option<&CustomModel> {
    if duplicates.len() < 2 {
        return None;
    }
    let dated = duplicates
        .iter()
        .filter_map(|m| m.creation_date.map(|d| (d, m)))
        .min_by(|(da, a), (db, b)| da.cmp(db).then_with(|| b.id.cmp(&a.id)))
        .map(|(_, m)| m);
    dated.or_else(|| duplicates.iter().max_by(|a, b| a.id.cmp(&b.id)))
}

/// Decision tree over an assembled model. The first matching rule wins.
pub fn choose_action(view: &CompleteModel) -> ModelAction {
    let model = &view.custom_model_details;

    if model.marked_for_deletion {
        return ModelAction::CascadeDeleted {
            model_id: model.id.clone(),
        };
    }

    if let Some(victim) = duplicate_to_remove(&view.duplicate_models) {
        return ModelAction::DuplicateRemoved {
            model_id: victim.id.clone(),
        };
    }

    let Some(batch) = view.file_batch_details.as_ref() else {
        return if model.cloned_from.is_some() {
            ModelAction::FailedCloneDeleted {
                model_id: model.id.clone(),
            }
        } else {
            ModelAction::BatchCreated {
                batch_id: model.canonical_batch_id(),
            }
        };
    };

    if model.file_batch_id.as_deref() != Some(batch.batch_id.as_str()) {
        return ModelAction::BatchLinked {
            batch_id: batch.batch_id.clone(),
        };
    }

    match view.trained_model_details.as_ref() {
        Some(trained) if trained.model_id != model.trained_model_id => {
            return ModelAction::TrainedModelAdopted {
                trained_model_id: trained.model_id.clone(),
            };
        }
        None if model.is_trained() => {
            return ModelAction::TrainingReset {
                previous_trained_model_id: model.trained_model_id.clone(),
            };
        }
        _ => {}
    }

    let present: HashSet<&str> = view.batch_files.iter().map(|f| f.uuid.as_str()).collect();
    let mut missing: Vec<String> = Vec::new();
    for file in &batch.files {
        if !present.contains(file.uuid.as_str()) && !missing.contains(&file.uuid) {
            missing.push(file.uuid.clone());
        }
    }
    if !missing.is_empty() {
        return ModelAction::MissingFilesStripped { uuids: missing };
    }

    if model.status == ModelStatus::FilesLoaded && batch.is_empty() {
        return ModelAction::StatusCorrected {
            status: ModelStatus::Created,
        };
    }

    ModelAction::NoOp
}

/// Delete a model and everything it exclusively owns.
///
/// The remote trained model removed is the one the record itself points at.
/// A non-canonical batch that another model links to is kept with its files.
/// Otherwise the batch goes, along with the stored files no other batch
/// references.
pub async fn cascade_delete(
    stores: &Stores,
    model: &CustomModel,
    credentials: &TrainingCredentials,
) -> Result<()> {
    let tenant_id = model.tenant_id.as_str();

    if model.is_trained() {
        stores
            .training
            .delete_model(credentials, &model.trained_model_id)
            .await?;
    }

    if let Some(batch) = find_batch(stores, model).await? {
        let (all_batches, all_models) = tokio::try_join!(
            stores.batches.get_all_batches(tenant_id),
            stores.models.get_all(tenant_id, None, None),
        )?;

        let canonical = batch.batch_id == model.canonical_batch_id();
        let linked_elsewhere = all_models
            .iter()
            .any(|m| m.id != model.id && m.file_batch_id.as_deref() == Some(batch.batch_id.as_str()));

        if canonical || !linked_elsewhere {
            let others: Vec<&Batch> = all_batches
                .iter()
                .filter(|b| b.batch_id != batch.batch_id)
                .collect();
            for file in &batch.files {
                if !others.iter().any(|b| b.contains_uuid(&file.uuid)) {
                    stores.objects.delete_file(tenant_id, &file.uuid).await?;
                }
            }
            stores.batches.delete_batch(tenant_id, &batch.batch_id).await?;
        } else {
            debug!(
                "Keeping batch {} still linked by another model",
                batch.batch_id
            );
        }
    }

    stores
        .models
        .delete(tenant_id, &model.id, model.revision.as_deref())
        .await?;
    info!("Cascade-deleted model {} ({})", model.id, model.name);
    Ok(())
}

async fn link_batch(stores: &Stores, model: &CustomModel, batch_id: &str) -> Result<()> {
    let mut updated = model.clone();
    updated.file_batch_id = Some(batch_id.to_string());
    stores.models.update(updated).await?;
    Ok(())
}

async fn apply_action(
    stores: &Stores,
    view: &CompleteModel,
    action: &ModelAction,
    credentials: &TrainingCredentials,
) -> Result<()> {
    let model = &view.custom_model_details;
    let tenant_id = model.tenant_id.as_str();

    match action {
        ModelAction::CascadeDeleted { .. } => cascade_delete(stores, model, credentials).await,
        ModelAction::DuplicateRemoved { model_id } => {
            let victim = stores.models.get_by_id(tenant_id, model_id).await?;
            cascade_delete(stores, &victim, credentials).await
        }
        ModelAction::FailedCloneDeleted { model_id } => {
            stores
                .models
                .delete(tenant_id, model_id, model.revision.as_deref())
                .await
        }
        ModelAction::BatchCreated { batch_id } => {
            stores
                .batches
                .add_batch(tenant_id, Batch::empty(tenant_id, batch_id.as_str()), batch_id)
                .await?;
            link_batch(stores, model, batch_id).await
        }
        ModelAction::BatchLinked { batch_id } => link_batch(stores, model, batch_id).await,
        ModelAction::TrainedModelAdopted { trained_model_id } => {
            let mut updated = model.clone();
            updated.trained_model_id = trained_model_id.clone();
            updated.set_status(ModelStatus::Trained);
            stores.models.update(updated).await?;
            Ok(())
        }
        ModelAction::TrainingReset { .. } => {
            let has_files = view
                .file_batch_details
                .as_ref()
                .is_some_and(|b| !b.is_empty());
            let mut updated = model.clone();
            updated.reset_training(has_files);
            stores.models.update(updated).await?;
            Ok(())
        }
        ModelAction::MissingFilesStripped { uuids } => {
            let Some(mut batch) = view.file_batch_details.clone() else {
                return Ok(());
            };
            batch.strip_uuids(uuids);
            let batch_id = batch.batch_id.clone();
            let batch = stores.batches.update_batch(tenant_id, batch, &batch_id).await?;
            if batch.is_empty() && model.status == ModelStatus::FilesLoaded {
                let mut updated = model.clone();
                updated.set_status(ModelStatus::Created);
                stores.models.update(updated).await?;
            }
            Ok(())
        }
        ModelAction::StatusCorrected { status } => {
            let mut updated = model.clone();
            updated.set_status(*status);
            stores.models.update(updated).await?;
            Ok(())
        }
        ModelAction::NoOp => Ok(()),
    }
}

/// Run one decision-tree pass over `model_id`.
///
/// Returns the action taken and the re-assembled view, which is `None` when
/// the action deleted the target. An unknown id is `ResourceNotFound`.
pub async fn reconcile_model(
    stores: &Stores,
    tenant_id: &str,
    model_id: &str,
    credentials: &TrainingCredentials,
) -> Result<ModelReconcileResult> {
    let view = assemble_complete_model(stores, tenant_id, model_id, credentials).await?;
    let action = choose_action(&view);

    if action.is_noop() {
        debug!("Model {} is reconciled", model_id);
        return Ok(ModelReconcileResult {
            action,
            model: Some(view),
        });
    }

    info!("Reconciling model {}: {:?}", model_id, action);
    apply_action(stores, &view, &action, credentials).await?;

    let model = optional(assemble_complete_model(stores, tenant_id, model_id, credentials).await)?;
    Ok(ModelReconcileResult { action, model })
}

/// Repeat [`reconcile_model`] until it reports no action, the model is
/// deleted, or `max_passes` is reached.
pub async fn reconcile_model_until_settled(
    stores: &Stores,
    tenant_id: &str,
    model_id: &str,
    credentials: &TrainingCredentials,
    max_passes: u32,
) -> Result<SettleResult> {
    let mut actions = Vec::new();
    let mut model = None;

    for _ in 0..max_passes.max(1) {
        let result = reconcile_model(stores, tenant_id, model_id, credentials).await?;
        model = result.model;
        if result.action.is_noop() {
            return Ok(SettleResult {
                actions,
                settled: true,
                model,
            });
        }
        actions.push(result.action);
        if model.is_none() {
            return Ok(SettleResult {
                actions,
                settled: true,
                model,
            });
        }
    }

    debug!(
        "Model {} still changing after {} passes",
        model_id,
        actions.len()
    );
    Ok(SettleResult {
        actions,
        settled: false,
        model,
    })
}
