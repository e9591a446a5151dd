//! Reconciliation reports and results returned by the engine.

use super::{Batch, CustomModel, StoredFile, TrainedModel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Defect detected on a custom model during cross-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DefectCode {
    #[serde(rename = "MISSING BATCH")]
    MissingBatch,
    #[serde(rename = "BATCH USED ELSEWHERE")]
    BatchUsedElsewhere,
    #[serde(rename = "MISSING FILE")]
    MissingFile,
    #[serde(rename = "MISSING TRAINED MODEL")]
    MissingTrainedModel,
    #[serde(rename = "TRAINED MODEL USED ELSEWHERE")]
    TrainedModelUsedElsewhere,
    #[serde(rename = "INCORRECT STATUS")]
    IncorrectStatus,
}

impl DefectCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefectCode::MissingBatch => "MISSING BATCH",
            DefectCode::BatchUsedElsewhere => "BATCH USED ELSEWHERE",
            DefectCode::MissingFile => "MISSING FILE",
            DefectCode::MissingTrainedModel => "MISSING TRAINED MODEL",
            DefectCode::TrainedModelUsedElsewhere => "TRAINED MODEL USED ELSEWHERE",
            DefectCode::IncorrectStatus => "INCORRECT STATUS",
        }
    }
}

impl fmt::Display for DefectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A custom model with the first defect found for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnreconciledModel {
    pub model: CustomModel,
    pub defect: DefectCode,
    /// File uuids referenced by the model's batch that it cannot own.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_files: Vec<String>,
}

/// Everything the cross-reference could not account for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnreconciledSet {
    pub custom_models: Vec<UnreconciledModel>,
    /// Batches claimed by no model.
    pub batches: Vec<Batch>,
    /// Stored files referenced by no owned batch.
    pub files: Vec<StoredFile>,
    /// Trained models referenced by no custom model.
    pub trained_models: Vec<TrainedModel>,
}

impl UnreconciledSet {
    pub fn is_empty(&self) -> bool {
        self.custom_models.is_empty()
            && self.batches.is_empty()
            && self.files.is_empty()
            && self.trained_models.is_empty()
    }

    /// Unreconciled models carrying `defect`.
    pub fn with_defect(&self, defect: DefectCode) -> impl Iterator<Item = &UnreconciledModel> {
        self.custom_models.iter().filter(move |m| m.defect == defect)
    }
}

/// Counts per defect code and orphan kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub reconciled_models: usize,
    pub defects: BTreeMap<String, usize>,
    pub orphan_batches: usize,
    pub orphan_files: usize,
    pub orphan_trained_models: usize,
}

/// Full cross-reference of the four stores for a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossReferenceReport {
    pub tenant_id: String,
    pub generated_at: DateTime<Utc>,
    pub reconciled: Vec<CustomModel>,
    pub unreconciled: UnreconciledSet,
}

impl CrossReferenceReport {
    pub fn is_consistent(&self) -> bool {
        self.unreconciled.is_empty()
    }

    pub fn summary(&self) -> ReconcileSummary {
        let mut defects = BTreeMap::new();
        for entry in &self.unreconciled.custom_models {
            *defects.entry(entry.defect.as_str().to_string()).or_insert(0) += 1;
        }
        ReconcileSummary {
            reconciled_models: self.reconciled.len(),
            defects,
            orphan_batches: self.unreconciled.batches.len(),
            orphan_files: self.unreconciled.files.len(),
            orphan_trained_models: self.unreconciled.trained_models.len(),
        }
    }
}

/// A single item that failed inside a repair stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairFailure {
    pub item: String,
    pub error: String,
}

/// Outcome of one repair stage after its settle-all barrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<RepairFailure>,
}

/// Result of a bulk tenant reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkReconcileResult {
    pub pre_state: CrossReferenceReport,
    pub post_state: CrossReferenceReport,
    pub stages: Vec<StageReport>,
}

/// A model together with every resource linked to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteModel {
    pub custom_model_details: CustomModel,
    pub file_batch_details: Option<Batch>,
    /// Tenant-wide object store listing.
    pub batch_files: Vec<StoredFile>,
    pub trained_model_details: Option<TrainedModel>,
    /// Every custom model sharing this model's name, itself included.
    pub duplicate_models: Vec<CustomModel>,
}

/// Corrective action chosen by the per-model decision tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ModelAction {
    CascadeDeleted { model_id: String },
    DuplicateRemoved { model_id: String },
    FailedCloneDeleted { model_id: String },
    BatchCreated { batch_id: String },
    BatchLinked { batch_id: String },
    TrainedModelAdopted { trained_model_id: String },
    TrainingReset { previous_trained_model_id: String },
    MissingFilesStripped { uuids: Vec<String> },
    StatusCorrected { status: super::ModelStatus },
    NoOp,
}

impl ModelAction {
    pub fn is_noop(&self) -> bool {
        matches!(self, ModelAction::NoOp)
    }
}

/// Result of one decision-tree pass over a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReconcileResult {
    pub action: ModelAction,
    /// Re-assembled view after the action; `None` if the target was deleted.
    pub model: Option<CompleteModel>,
}

/// Result of repeated decision-tree passes over a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettleResult {
    pub actions: Vec<ModelAction>,
    pub settled: bool,
    pub model: Option<CompleteModel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defect_code_serializes_with_spaces() {
        let json = serde_json::to_string(&DefectCode::BatchUsedElsewhere).unwrap();
        assert_eq!(json, "\"BATCH USED ELSEWHERE\"");
        let parsed: DefectCode = serde_json::from_str("\"MISSING FILE\"").unwrap();
        assert_eq!(parsed, DefectCode::MissingFile);
    }

    #[test]
    fn test_model_action_tagging() {
        let value = serde_json::to_value(ModelAction::BatchCreated {
            batch_id: "mBatchId".into(),
        })
        .unwrap();
        assert_eq!(value["action"], "batch_created");
        assert_eq!(value["batch_id"], "mBatchId");
        assert!(ModelAction::NoOp.is_noop());
    }
}
