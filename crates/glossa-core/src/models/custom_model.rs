//! Custom model metadata records held by the model registry.

use crate::config::{canonical_batch_id, ReconcileConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a custom model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelStatus {
    Created,
    FilesLoaded,
    Training,
    Trained,
    Warning,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Created => "CREATED",
            ModelStatus::FilesLoaded => "FILESLOADED",
            ModelStatus::Training => "TRAINING",
            ModelStatus::Trained => "TRAINED",
            ModelStatus::Warning => "WARNING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CREATED" => Some(ModelStatus::Created),
            "FILESLOADED" => Some(ModelStatus::FilesLoaded),
            "TRAINING" => Some(ModelStatus::Training),
            "TRAINED" => Some(ModelStatus::Trained),
            "WARNING" => Some(ModelStatus::Warning),
            _ => None,
        }
    }

    /// Status for an untrained model given whether its batch holds files.
    pub fn for_untrained(batch_has_files: bool) -> Self {
        if batch_has_files {
            ModelStatus::FilesLoaded
        } else {
            ModelStatus::Created
        }
    }
}

impl Default for ModelStatus {
    fn default() -> Self {
        ModelStatus::Created
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A customized translation model as recorded in the model registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomModel {
    pub tenant_id: String,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub domain: String,
    pub source: String,
    pub target: String,
    pub base_model_id: String,
    pub trained_model_id: String,
    pub status: ModelStatus,
    pub status_date: DateTime<Utc>,
    #[serde(default)]
    pub file_batch_id: Option<String>,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub marked_for_deletion: bool,
    #[serde(default)]
    pub cloned_from: Option<String>,
    #[serde(default)]
    pub creation_date: Option<DateTime<Utc>>,
    /// Registry revision, bumped on every write.
    #[serde(default)]
    pub revision: Option<String>,
}

impl CustomModel {
    /// Create an untrained model with a fresh id and its canonical batch id.
    pub fn new(
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        base_model_id: impl Into<String>,
    ) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.into(),
            file_batch_id: Some(canonical_batch_id(&id)),
            id,
            name: name.into(),
            description: None,
            domain: String::new(),
            source: source.into(),
            target: target.into(),
            base_model_id: base_model_id.into(),
            trained_model_id: ReconcileConfig::UNTRAINED.to_string(),
            status: ModelStatus::Created,
            status_date: now,
            project: String::new(),
            marked_for_deletion: false,
            cloned_from: None,
            creation_date: Some(now),
            revision: None,
        }
    }

    /// The batch id this model would own when canonical.
    pub fn canonical_batch_id(&self) -> String {
        canonical_batch_id(&self.id)
    }

    pub fn has_canonical_batch(&self) -> bool {
        self.file_batch_id.as_deref() == Some(self.canonical_batch_id().as_str())
    }

    /// True for models created around an orphaned trained model.
    pub fn is_orphan_wrapper(&self) -> bool {
        self.project.starts_with(ReconcileConfig::ORPHAN_PROJECT_PREFIX)
    }

    pub fn is_trained(&self) -> bool {
        self.trained_model_id != ReconcileConfig::UNTRAINED
    }

    /// Update status and stamp the status date.
    pub fn set_status(&mut self, status: ModelStatus) {
        self.status = status;
        self.status_date = Utc::now();
    }

    /// Drop the trained-model link and derive status from batch contents.
    pub fn reset_training(&mut self, batch_has_files: bool) {
        self.trained_model_id = ReconcileConfig::UNTRAINED.to_string();
        self.set_status(ModelStatus::for_untrained(batch_has_files));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ModelStatus::Created,
            ModelStatus::FilesLoaded,
            ModelStatus::Training,
            ModelStatus::Trained,
            ModelStatus::Warning,
        ] {
            assert_eq!(ModelStatus::parse(status.as_str()), Some(status));
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_new_model_is_canonical_and_untrained() {
        let model = CustomModel::new("t1", "news", "en", "fr", "en-fr");
        assert!(model.has_canonical_batch());
        assert!(!model.is_trained());
        assert_eq!(model.status, ModelStatus::Created);
    }

    #[test]
    fn test_reset_training() {
        let mut model = CustomModel::new("t1", "news", "en", "fr", "en-fr");
        model.trained_model_id = "T1".into();
        model.status = ModelStatus::Trained;
        model.reset_training(true);
        assert!(!model.is_trained());
        assert_eq!(model.status, ModelStatus::FilesLoaded);
        model.reset_training(false);
        assert_eq!(model.status, ModelStatus::Created);
    }
}
