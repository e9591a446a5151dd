//! Training-file batches and stored file listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reference from a batch to a file held in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub uuid: String,
    pub file_name: String,
    #[serde(default)]
    pub file_size: u64,
    /// How the file is used in training (e.g. `forced_glossary`, `parallel_corpus`).
    #[serde(default)]
    pub training_file_option: String,
}

/// A named, ordered list of file references belonging to a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub tenant_id: String,
    pub batch_id: String,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

impl Batch {
    pub fn empty(tenant_id: impl Into<String>, batch_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            batch_id: batch_id.into(),
            files: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains_uuid(&self, uuid: &str) -> bool {
        self.files.iter().any(|f| f.uuid == uuid)
    }

    /// Remove every file reference whose uuid is in `uuids`.
    ///
    /// Returns the number of references removed.
    pub fn strip_uuids(&mut self, uuids: &[String]) -> usize {
        let before = self.files.len();
        self.files.retain(|f| !uuids.contains(&f.uuid));
        before - self.files.len()
    }
}

/// A raw file in a tenant's object-store container. Its name is its uuid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub tenant_id: String,
    pub uuid: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}
