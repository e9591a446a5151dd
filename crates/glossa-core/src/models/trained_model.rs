//! Trained models as reported by the remote training service.

use serde::{Deserialize, Serialize};

/// A model known to the training service.
///
/// The training service has no notion of custom model ids. A custom model
/// refers to one of these by `trained_model_id == model_id`, and the engine
/// also looks them up by `name` as a non-owning back-reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub model_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub base_model_id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub status: String,
}

impl TrainedModel {
    /// Models with no base model are stock models and cannot be customized.
    pub fn is_customizable(&self) -> bool {
        !self.base_model_id.is_empty()
    }
}

/// Training service credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingCredentials {
    pub url: String,
    #[serde(default)]
    pub api_key: String,
}

impl TrainingCredentials {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
        }
    }
}

/// Filters for listing trained models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListModelsOptions {
    /// Include the service's stock (non-custom) models.
    pub include_default: bool,
}
