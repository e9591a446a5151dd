//! In-memory store implementations.
//!
//! Used by the test suites and by embedders that want to run the engine
//! against fixture data. Every store carries a [`FaultInjector`] so that
//! individual operations can be made to fail on demand.

use super::traits::{BatchRegistry, ModelRegistry, ObjectStore, Stores, TrainingService};
use crate::error::{GlossaError, Result};
use crate::models::{
    Batch, CustomModel, ListModelsOptions, StoredFile, TrainedModel, TrainingCredentials,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// Wildcard key matching every target of an operation.
pub const ANY: &str = "*";

/// Set of `(operation, key)` pairs that should fail.
#[derive(Debug, Default)]
pub struct FaultInjector {
    faults: Mutex<HashSet<(String, String)>>,
}

impl FaultInjector {
    /// Make `op` fail for `key` (or for every key with [`ANY`]).
    pub fn fail(&self, op: &str, key: &str) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert((op.to_string(), key.to_string()));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    fn check(&self, op: &str, key: &str) -> Result<()> {
        let faults = self
            .faults
            .lock()
            .map_err(|_| GlossaError::Other("fault table poisoned".to_string()))?;
        let hit = faults.contains(&(op.to_string(), key.to_string()))
            || faults.contains(&(op.to_string(), ANY.to_string()));
        if hit {
            Err(GlossaError::Other(format!("injected failure: {} {}", op, key)))
        } else {
            Ok(())
        }
    }
}

type Key = (String, String);

fn key(tenant_id: &str, id: &str) -> Key {
    (tenant_id.to_string(), id.to_string())
}

// ========================================
// Model registry
// ========================================

#[derive(Debug, Default)]
pub struct MemoryModelRegistry {
    models: RwLock<BTreeMap<Key, CustomModel>>,
    next_revision: Mutex<u64>,
    pub faults: FaultInjector,
}

impl MemoryModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_revision(&self) -> String {
        let mut next = self.next_revision.lock().unwrap_or_else(|e| e.into_inner());
        *next += 1;
        format!("{}-rev", *next)
    }
}

#[async_trait]
impl ModelRegistry for MemoryModelRegistry {
    async fn get_all(
        &self,
        tenant_id: &str,
        project: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<CustomModel>> {
        self.faults.check("get_all", tenant_id)?;
        let models = self.models.read().await;
        Ok(models
            .values()
            .filter(|m| m.tenant_id == tenant_id)
            .filter(|m| project.map_or(true, |p| m.project == p))
            .filter(|m| name.map_or(true, |n| m.name == n))
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, tenant_id: &str, id: &str) -> Result<CustomModel> {
        self.faults.check("get_by_id", id)?;
        self.models
            .read()
            .await
            .get(&key(tenant_id, id))
            .cloned()
            .ok_or_else(|| GlossaError::not_found("custom model", id))
    }

    async fn create(&self, mut model: CustomModel) -> Result<CustomModel> {
        self.faults.check("create", &model.id)?;
        let mut models = self.models.write().await;
        let k = key(&model.tenant_id, &model.id);
        if models.contains_key(&k) {
            return Err(GlossaError::RevisionConflict {
                kind: "custom model".to_string(),
                id: model.id,
                expected: None,
                actual: models.get(&k).and_then(|m| m.revision.clone()),
            });
        }
        model.revision = Some(self.bump_revision());
        models.insert(k, model.clone());
        Ok(model)
    }

    async fn update(&self, mut model: CustomModel) -> Result<CustomModel> {
        self.faults.check("update", &model.id)?;
        let mut models = self.models.write().await;
        let k = key(&model.tenant_id, &model.id);
        let stored = models
            .get(&k)
            .ok_or_else(|| GlossaError::not_found("custom model", &model.id))?;
        if model.revision.is_some() && model.revision != stored.revision {
            return Err(GlossaError::RevisionConflict {
                kind: "custom model".to_string(),
                id: model.id,
                expected: model.revision,
                actual: stored.revision.clone(),
            });
        }
        model.revision = Some(self.bump_revision());
        models.insert(k, model.clone());
        Ok(model)
    }

    async fn delete(&self, tenant_id: &str, id: &str, revision: Option<&str>) -> Result<()> {
        self.faults.check("delete", id)?;
        let mut models = self.models.write().await;
        let k = key(tenant_id, id);
        if let (Some(stored), Some(expected)) = (models.get(&k), revision) {
            if stored.revision.as_deref() != Some(expected) {
                return Err(GlossaError::RevisionConflict {
                    kind: "custom model".to_string(),
                    id: id.to_string(),
                    expected: Some(expected.to_string()),
                    actual: stored.revision.clone(),
                });
            }
        }
        models.remove(&k);
        Ok(())
    }
}

// ========================================
// Batch registry
// ========================================

#[derive(Debug, Default)]
pub struct MemoryBatchRegistry {
    batches: RwLock<BTreeMap<Key, Batch>>,
    pub faults: FaultInjector,
}

impl MemoryBatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchRegistry for MemoryBatchRegistry {
    async fn get_all_batches(&self, tenant_id: &str) -> Result<Vec<Batch>> {
        self.faults.check("get_all_batches", tenant_id)?;
        let batches = self.batches.read().await;
        Ok(batches
            .values()
            .filter(|b| b.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn get_batch(&self, tenant_id: &str, batch_id: &str) -> Result<Batch> {
        self.faults.check("get_batch", batch_id)?;
        self.batches
            .read()
            .await
            .get(&key(tenant_id, batch_id))
            .cloned()
            .ok_or_else(|| GlossaError::not_found("batch", batch_id))
    }

    async fn add_batch(&self, tenant_id: &str, batch: Batch, batch_id: &str) -> Result<Batch> {
        self.faults.check("add_batch", batch_id)?;
        let mut batches = self.batches.write().await;
        let stored = batches.entry(key(tenant_id, batch_id)).or_insert(Batch {
            tenant_id: tenant_id.to_string(),
            batch_id: batch_id.to_string(),
            files: batch.files,
        });
        Ok(stored.clone())
    }

    async fn update_batch(&self, tenant_id: &str, batch: Batch, batch_id: &str) -> Result<Batch> {
        self.faults.check("update_batch", batch_id)?;
        let mut batches = self.batches.write().await;
        let stored = batches
            .get_mut(&key(tenant_id, batch_id))
            .ok_or_else(|| GlossaError::not_found("batch", batch_id))?;
        stored.files = batch.files;
        Ok(stored.clone())
    }

    async fn delete_batch(&self, tenant_id: &str, batch_id: &str) -> Result<()> {
        self.faults.check("delete_batch", batch_id)?;
        self.batches.write().await.remove(&key(tenant_id, batch_id));
        Ok(())
    }

    async fn clone_batch(&self, tenant_id: &str, src_id: &str, dst_id: &str) -> Result<Batch> {
        self.faults.check("clone_batch", dst_id)?;
        let mut batches = self.batches.write().await;
        let src = batches
            .get(&key(tenant_id, src_id))
            .cloned()
            .ok_or_else(|| GlossaError::not_found("batch", src_id))?;
        let dst_key = key(tenant_id, dst_id);
        if batches.contains_key(&dst_key) {
            return Err(GlossaError::Other(format!("batch {} already exists", dst_id)));
        }
        let clone = Batch {
            tenant_id: tenant_id.to_string(),
            batch_id: dst_id.to_string(),
            files: src
                .files
                .into_iter()
                .map(|mut f| {
                    f.uuid = uuid::Uuid::new_v4().to_string();
                    f
                })
                .collect(),
        };
        batches.insert(dst_key, clone.clone());
        Ok(clone)
    }

    async fn delete_file(&self, tenant_id: &str, batch_id: &str, file_name: &str) -> Result<()> {
        self.faults.check("delete_file", file_name)?;
        let mut batches = self.batches.write().await;
        let batch = batches
            .get_mut(&key(tenant_id, batch_id))
            .ok_or_else(|| GlossaError::not_found("batch", batch_id))?;
        batch.files.retain(|f| f.file_name != file_name);
        Ok(())
    }

    async fn delete_file_by_uuid(
        &self,
        tenant_id: &str,
        uuid: &str,
        part_of_batch_deletion: bool,
    ) -> Result<()> {
        self.faults.check("delete_file_by_uuid", uuid)?;
        let mut batches = self.batches.write().await;
        let mut removed = 0;
        for batch in batches.values_mut().filter(|b| b.tenant_id == tenant_id) {
            removed += batch.strip_uuids(&[uuid.to_string()]);
        }
        if removed == 0 && !part_of_batch_deletion {
            return Err(GlossaError::not_found("file reference", uuid));
        }
        Ok(())
    }
}

// ========================================
// Object store
// ========================================

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    containers: RwLock<HashMap<String, BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>>,
    pub faults: FaultInjector,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the tenant's container has been created.
    pub async fn has_container(&self, tenant_id: &str) -> bool {
        self.containers.read().await.contains_key(tenant_id)
    }
}

fn stored(tenant_id: &str, uuid: &str, bytes: &[u8], at: DateTime<Utc>) -> StoredFile {
    StoredFile {
        tenant_id: tenant_id.to_string(),
        uuid: uuid.to_string(),
        size: bytes.len() as u64,
        last_modified: Some(at),
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn examine_container(&self, tenant_id: &str) -> Result<Vec<StoredFile>> {
        self.faults.check("examine_container", tenant_id)?;
        let mut containers = self.containers.write().await;
        let container = containers.entry(tenant_id.to_string()).or_default();
        Ok(container
            .iter()
            .map(|(uuid, (bytes, at))| stored(tenant_id, uuid, bytes, *at))
            .collect())
    }

    async fn put_file(&self, tenant_id: &str, uuid: &str, bytes: &[u8]) -> Result<StoredFile> {
        self.faults.check("put_file", uuid)?;
        let now = Utc::now();
        self.containers
            .write()
            .await
            .entry(tenant_id.to_string())
            .or_default()
            .insert(uuid.to_string(), (bytes.to_vec(), now));
        Ok(stored(tenant_id, uuid, bytes, now))
    }

    async fn copy_file(
        &self,
        tenant_id: &str,
        src_uuid: &str,
        dst_uuid: &str,
    ) -> Result<StoredFile> {
        self.faults.check("copy_file", src_uuid)?;
        let mut containers = self.containers.write().await;
        let container = containers.entry(tenant_id.to_string()).or_default();
        let bytes = container
            .get(src_uuid)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| GlossaError::not_found("stored file", src_uuid))?;
        let now = Utc::now();
        let file = stored(tenant_id, dst_uuid, &bytes, now);
        container.insert(dst_uuid.to_string(), (bytes, now));
        Ok(file)
    }

    async fn delete_file(&self, tenant_id: &str, uuid: &str) -> Result<()> {
        self.faults.check("delete_file", uuid)?;
        if let Some(container) = self.containers.write().await.get_mut(tenant_id) {
            container.remove(uuid);
        }
        Ok(())
    }
}

// ========================================
// Training service
// ========================================

/// Trained models keyed by service URL, then model id.
#[derive(Debug, Default)]
pub struct MemoryTrainingService {
    services: RwLock<HashMap<String, BTreeMap<String, TrainedModel>>>,
    pub faults: FaultInjector,
}

impl MemoryTrainingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, credentials: &TrainingCredentials, model: TrainedModel) {
        self.services
            .write()
            .await
            .entry(credentials.url.clone())
            .or_default()
            .insert(model.model_id.clone(), model);
    }
}

#[async_trait]
impl TrainingService for MemoryTrainingService {
    async fn get_models(
        &self,
        credentials: &TrainingCredentials,
        options: ListModelsOptions,
    ) -> Result<Vec<TrainedModel>> {
        self.faults.check("get_models", &credentials.url)?;
        let services = self.services.read().await;
        Ok(services
            .get(&credentials.url)
            .map(|models| {
                models
                    .values()
                    .filter(|m| options.include_default || m.is_customizable())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_model(&self, credentials: &TrainingCredentials, model_id: &str) -> Result<()> {
        self.faults.check("delete_model", model_id)?;
        if let Some(models) = self.services.write().await.get_mut(&credentials.url) {
            models.remove(model_id);
        }
        Ok(())
    }
}

// ========================================
// Bundle
// ========================================

/// All four in-memory stores, keeping typed handles for seeding data and
/// injecting faults after the [`Stores`] view has been handed out.
#[derive(Debug, Clone, Default)]
pub struct MemoryStores {
    pub models: Arc<MemoryModelRegistry>,
    pub batches: Arc<MemoryBatchRegistry>,
    pub objects: Arc<MemoryObjectStore>,
    pub training: Arc<MemoryTrainingService>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stores(&self) -> Stores {
        Stores {
            models: self.models.clone(),
            batches: self.batches.clone(),
            objects: self.objects.clone(),
            training: self.training.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileRef;

    fn file_ref(uuid: &str, name: &str) -> FileRef {
        FileRef {
            uuid: uuid.into(),
            file_name: name.into(),
            file_size: 1,
            training_file_option: "forced_glossary".into(),
        }
    }

    #[tokio::test]
    async fn test_model_registry_revisions() {
        let registry = MemoryModelRegistry::new();
        let model = CustomModel::new("t1", "news", "en", "fr", "en-fr");
        let created = registry.create(model.clone()).await.unwrap();
        assert!(created.revision.is_some());

        let mut stale = created.clone();
        let updated = registry.update(created).await.unwrap();
        assert_ne!(updated.revision, stale.revision);

        stale.name = "other".into();
        let err = registry.update(stale.clone()).await.unwrap_err();
        assert!(matches!(err, GlossaError::RevisionConflict { .. }));

        let err = registry
            .delete("t1", &model.id, stale.revision.as_deref())
            .await
            .unwrap_err();
        assert!(matches!(err, GlossaError::RevisionConflict { .. }));

        registry
            .delete("t1", &model.id, updated.revision.as_deref())
            .await
            .unwrap();
        assert!(registry.get_by_id("t1", &model.id).await.unwrap_err().is_not_found());
        // absent delete succeeds
        registry.delete("t1", &model.id, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_model_registry_filters() {
        let registry = MemoryModelRegistry::new();
        let mut a = CustomModel::new("t1", "news", "en", "fr", "en-fr");
        a.project = "p1".into();
        let b = CustomModel::new("t1", "legal", "en", "fr", "en-fr");
        let c = CustomModel::new("t2", "news", "en", "fr", "en-fr");
        for m in [a, b, c] {
            registry.create(m).await.unwrap();
        }
        assert_eq!(registry.get_all("t1", None, None).await.unwrap().len(), 2);
        assert_eq!(registry.get_all("t1", Some("p1"), None).await.unwrap().len(), 1);
        assert_eq!(registry.get_all("t1", None, Some("news")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_batch_is_create_if_absent() {
        let registry = MemoryBatchRegistry::new();
        let mut batch = Batch::empty("t1", "b1");
        batch.files.push(file_ref("u1", "a.tmx"));
        registry.add_batch("t1", batch, "b1").await.unwrap();

        let again = registry
            .add_batch("t1", Batch::empty("t1", "b1"), "b1")
            .await
            .unwrap();
        assert_eq!(again.files.len(), 1);
    }

    #[tokio::test]
    async fn test_clone_batch_assigns_fresh_uuids() {
        let registry = MemoryBatchRegistry::new();
        let mut batch = Batch::empty("t1", "src");
        batch.files = vec![file_ref("u1", "a.tmx"), file_ref("u2", "b.tmx")];
        registry.add_batch("t1", batch, "src").await.unwrap();

        let clone = registry.clone_batch("t1", "src", "dst").await.unwrap();
        assert_eq!(clone.files.len(), 2);
        assert_eq!(clone.files[0].file_name, "a.tmx");
        assert_ne!(clone.files[0].uuid, "u1");
        assert!(registry.clone_batch("t1", "src", "dst").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_file_variants() {
        let registry = MemoryBatchRegistry::new();
        let mut batch = Batch::empty("t1", "b1");
        batch.files = vec![file_ref("u1", "a.tmx"), file_ref("u2", "b.tmx")];
        registry.add_batch("t1", batch, "b1").await.unwrap();

        registry.delete_file("t1", "b1", "a.tmx").await.unwrap();
        registry.delete_file_by_uuid("t1", "u2", false).await.unwrap();
        assert!(registry.get_batch("t1", "b1").await.unwrap().is_empty());

        assert!(registry.delete_file_by_uuid("t1", "u2", false).await.is_err());
        registry.delete_file_by_uuid("t1", "u2", true).await.unwrap();
    }

    #[tokio::test]
    async fn test_object_store_creates_container_lazily() {
        let store = MemoryObjectStore::new();
        assert!(!store.has_container("t1").await);
        assert!(store.examine_container("t1").await.unwrap().is_empty());
        assert!(store.has_container("t1").await);

        store.put_file("t1", "u1", b"hello").await.unwrap();
        store.copy_file("t1", "u1", "u2").await.unwrap();
        let listing = store.examine_container("t1").await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[1].size, 5);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = MemoryObjectStore::new();
        store.faults.fail("delete_file", "u1");
        assert!(store.delete_file("t1", "u1").await.is_err());
        assert!(store.delete_file("t1", "u2").await.is_ok());
        store.faults.fail("examine_container", ANY);
        assert!(store.examine_container("t1").await.is_err());
        store.faults.clear();
        assert!(store.examine_container("t1").await.is_ok());
    }

    #[tokio::test]
    async fn test_training_service_hides_stock_models() {
        let service = MemoryTrainingService::new();
        let creds = TrainingCredentials::new("http://lt", "key");
        service
            .insert(
                &creds,
                TrainedModel {
                    model_id: "en-fr".into(),
                    name: "stock".into(),
                    base_model_id: String::new(),
                    source: "en".into(),
                    target: "fr".into(),
                    domain: String::new(),
                    status: "available".into(),
                },
            )
            .await;
        let custom = service.get_models(&creds, ListModelsOptions::default()).await.unwrap();
        assert!(custom.is_empty());
        let all = service
            .get_models(&creds, ListModelsOptions { include_default: true })
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }
}
