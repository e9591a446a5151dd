//! SQLite-backed model and batch registries.
//!
//! Both registries share one database file, but no transaction spans the
//! model and batch tables. Each batch write runs in its own transaction.

use super::traits::{BatchRegistry, ModelRegistry};
use crate::config::StoreConfig;
use crate::error::{GlossaError, Result};
use crate::models::{Batch, CustomModel, FileRef};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Model and batch registries over a single SQLite connection.
///
/// Uses WAL mode for safe concurrent access across processes and
/// `Arc<Mutex<Connection>>` for thread safety within a process.
#[derive(Clone)]
pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRegistry {
    /// Open the registry at a specific path, creating parent directories.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| GlossaError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA busy_timeout={};\n\
             PRAGMA synchronous=NORMAL;",
            StoreConfig::BUSY_TIMEOUT_MS,
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS custom_models (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                project TEXT NOT NULL DEFAULT '',
                revision INTEGER NOT NULL,
                data_json TEXT NOT NULL,
                PRIMARY KEY (tenant_id, id)
            );

            CREATE INDEX IF NOT EXISTS idx_custom_models_name
                ON custom_models (tenant_id, name);

            CREATE TABLE IF NOT EXISTS batches (
                tenant_id TEXT NOT NULL,
                batch_id TEXT NOT NULL,
                PRIMARY KEY (tenant_id, batch_id)
            );

            CREATE TABLE IF NOT EXISTS file_refs (
                tenant_id TEXT NOT NULL,
                batch_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                uuid TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_size INTEGER NOT NULL DEFAULT 0,
                training_file_option TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (tenant_id, batch_id, position)
            );",
        )?;
        Ok(())
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| GlossaError::Database {
            message: "Failed to acquire registry connection lock".to_string(),
            source: None,
        })
    }

    fn decode_model(data_json: &str, revision: i64) -> Result<CustomModel> {
        let mut model: CustomModel = serde_json::from_str(data_json)?;
        model.revision = Some(revision.to_string());
        Ok(model)
    }

    fn stored_revision(conn: &Connection, tenant_id: &str, id: &str) -> Result<Option<i64>> {
        Ok(conn
            .query_row(
                "SELECT revision FROM custom_models WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id, id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn conflict(id: &str, expected: Option<&str>, actual: Option<i64>) -> GlossaError {
        GlossaError::RevisionConflict {
            kind: "custom model".to_string(),
            id: id.to_string(),
            expected: expected.map(String::from),
            actual: actual.map(|r| r.to_string()),
        }
    }

    fn load_files(conn: &Connection, tenant_id: &str, batch_id: &str) -> Result<Vec<FileRef>> {
        let mut stmt = conn.prepare(
            "SELECT uuid, file_name, file_size, training_file_option
             FROM file_refs WHERE tenant_id = ?1 AND batch_id = ?2 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![tenant_id, batch_id], |row| {
            Ok(FileRef {
                uuid: row.get(0)?,
                file_name: row.get(1)?,
                file_size: row.get::<_, i64>(2)? as u64,
                training_file_option: row.get(3)?,
            })
        })?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    fn write_files(
        conn: &Connection,
        tenant_id: &str,
        batch_id: &str,
        files: &[FileRef],
    ) -> Result<()> {
        conn.execute(
            "DELETE FROM file_refs WHERE tenant_id = ?1 AND batch_id = ?2",
            params![tenant_id, batch_id],
        )?;
        for (position, file) in files.iter().enumerate() {
            conn.execute(
                "INSERT INTO file_refs
                 (tenant_id, batch_id, position, uuid, file_name, file_size, training_file_option)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    tenant_id,
                    batch_id,
                    position as i64,
                    file.uuid,
                    file.file_name,
                    file.file_size as i64,
                    file.training_file_option
                ],
            )?;
        }
        Ok(())
    }

    fn batch_exists(conn: &Connection, tenant_id: &str, batch_id: &str) -> Result<bool> {
        Ok(conn
            .query_row(
                "SELECT 1 FROM batches WHERE tenant_id = ?1 AND batch_id = ?2",
                params![tenant_id, batch_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    fn read_batch(conn: &Connection, tenant_id: &str, batch_id: &str) -> Result<Batch> {
        if !Self::batch_exists(conn, tenant_id, batch_id)? {
            return Err(GlossaError::not_found("batch", batch_id));
        }
        Ok(Batch {
            tenant_id: tenant_id.to_string(),
            batch_id: batch_id.to_string(),
            files: Self::load_files(conn, tenant_id, batch_id)?,
        })
    }
}

// ========================================
// Model registry
// ========================================

#[async_trait]
impl ModelRegistry for SqliteRegistry {
    async fn get_all(
        &self,
        tenant_id: &str,
        project: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<CustomModel>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT data_json, revision FROM custom_models
             WHERE tenant_id = ?1
               AND (?2 IS NULL OR project = ?2)
               AND (?3 IS NULL OR name = ?3)
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![tenant_id, project, name], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut models = Vec::new();
        for row in rows {
            let (data_json, revision) = row?;
            models.push(Self::decode_model(&data_json, revision)?);
        }
        Ok(models)
    }

    async fn get_by_id(&self, tenant_id: &str, id: &str) -> Result<CustomModel> {
        let conn = self.lock_conn()?;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT data_json, revision FROM custom_models WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id, id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((data_json, revision)) => Self::decode_model(&data_json, revision),
            None => Err(GlossaError::not_found("custom model", id)),
        }
    }

    async fn create(&self, mut model: CustomModel) -> Result<CustomModel> {
        let conn = self.lock_conn()?;
        if let Some(actual) = Self::stored_revision(&conn, &model.tenant_id, &model.id)? {
            return Err(Self::conflict(&model.id, None, Some(actual)));
        }
        model.revision = None;
        let data_json = serde_json::to_string(&model)?;
        conn.execute(
            "INSERT INTO custom_models (tenant_id, id, name, project, revision, data_json)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![model.tenant_id, model.id, model.name, model.project, data_json],
        )?;
        debug!("Created custom model {} for tenant {}", model.id, model.tenant_id);
        model.revision = Some("1".to_string());
        Ok(model)
    }

    async fn update(&self, mut model: CustomModel) -> Result<CustomModel> {
        let conn = self.lock_conn()?;
        let actual = Self::stored_revision(&conn, &model.tenant_id, &model.id)?
            .ok_or_else(|| GlossaError::not_found("custom model", &model.id))?;
        if let Some(expected) = model.revision.as_deref() {
            if expected != actual.to_string() {
                return Err(Self::conflict(&model.id, Some(expected), Some(actual)));
            }
        }

        let next = actual + 1;
        model.revision = None;
        let data_json = serde_json::to_string(&model)?;
        conn.execute(
            "UPDATE custom_models SET name = ?1, project = ?2, revision = ?3, data_json = ?4
             WHERE tenant_id = ?5 AND id = ?6",
            params![model.name, model.project, next, data_json, model.tenant_id, model.id],
        )?;
        model.revision = Some(next.to_string());
        Ok(model)
    }

    async fn delete(&self, tenant_id: &str, id: &str, revision: Option<&str>) -> Result<()> {
        let conn = self.lock_conn()?;
        let actual = match Self::stored_revision(&conn, tenant_id, id)? {
            Some(actual) => actual,
            None => return Ok(()),
        };
        if let Some(expected) = revision {
            if expected != actual.to_string() {
                return Err(Self::conflict(id, Some(expected), Some(actual)));
            }
        }
        conn.execute(
            "DELETE FROM custom_models WHERE tenant_id = ?1 AND id = ?2",
            params![tenant_id, id],
        )?;
        debug!("Deleted custom model {} for tenant {}", id, tenant_id);
        Ok(())
    }
}

// ========================================
// Batch registry
// ========================================

#[async_trait]
impl BatchRegistry for SqliteRegistry {
    async fn get_all_batches(&self, tenant_id: &str) -> Result<Vec<Batch>> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT batch_id FROM batches WHERE tenant_id = ?1 ORDER BY batch_id")?;
        let ids: Vec<String> = stmt
            .query_map(params![tenant_id], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        let mut batches = Vec::with_capacity(ids.len());
        for batch_id in ids {
            let files = Self::load_files(&conn, tenant_id, &batch_id)?;
            batches.push(Batch {
                tenant_id: tenant_id.to_string(),
                batch_id,
                files,
            });
        }
        Ok(batches)
    }

    async fn get_batch(&self, tenant_id: &str, batch_id: &str) -> Result<Batch> {
        let conn = self.lock_conn()?;
        Self::read_batch(&conn, tenant_id, batch_id)
    }

    async fn add_batch(&self, tenant_id: &str, batch: Batch, batch_id: &str) -> Result<Batch> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        if Self::batch_exists(&tx, tenant_id, batch_id)? {
            debug!("Batch {} already exists, leaving it unchanged", batch_id);
            return Self::read_batch(&tx, tenant_id, batch_id);
        }
        tx.execute(
            "INSERT INTO batches (tenant_id, batch_id) VALUES (?1, ?2)",
            params![tenant_id, batch_id],
        )?;
        Self::write_files(&tx, tenant_id, batch_id, &batch.files)?;
        tx.commit()?;
        Ok(Batch {
            tenant_id: tenant_id.to_string(),
            batch_id: batch_id.to_string(),
            files: batch.files,
        })
    }

    async fn update_batch(&self, tenant_id: &str, batch: Batch, batch_id: &str) -> Result<Batch> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        if !Self::batch_exists(&tx, tenant_id, batch_id)? {
            return Err(GlossaError::not_found("batch", batch_id));
        }
        Self::write_files(&tx, tenant_id, batch_id, &batch.files)?;
        tx.commit()?;
        Ok(Batch {
            tenant_id: tenant_id.to_string(),
            batch_id: batch_id.to_string(),
            files: batch.files,
        })
    }

    async fn delete_batch(&self, tenant_id: &str, batch_id: &str) -> Result<()> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM file_refs WHERE tenant_id = ?1 AND batch_id = ?2",
            params![tenant_id, batch_id],
        )?;
        tx.execute(
            "DELETE FROM batches WHERE tenant_id = ?1 AND batch_id = ?2",
            params![tenant_id, batch_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn clone_batch(&self, tenant_id: &str, src_id: &str, dst_id: &str) -> Result<Batch> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let src = Self::read_batch(&tx, tenant_id, src_id)?;
        if Self::batch_exists(&tx, tenant_id, dst_id)? {
            return Err(GlossaError::Other(format!("batch {} already exists", dst_id)));
        }
        let files: Vec<FileRef> = src
            .files
            .into_iter()
            .map(|mut f| {
                f.uuid = uuid::Uuid::new_v4().to_string();
                f
            })
            .collect();
        tx.execute(
            "INSERT INTO batches (tenant_id, batch_id) VALUES (?1, ?2)",
            params![tenant_id, dst_id],
        )?;
        Self::write_files(&tx, tenant_id, dst_id, &files)?;
        tx.commit()?;
        debug!("Cloned batch {} into {}", src_id, dst_id);
        Ok(Batch {
            tenant_id: tenant_id.to_string(),
            batch_id: dst_id.to_string(),
            files,
        })
    }

    async fn delete_file(&self, tenant_id: &str, batch_id: &str, file_name: &str) -> Result<()> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let mut batch = Self::read_batch(&tx, tenant_id, batch_id)?;
        batch.files.retain(|f| f.file_name != file_name);
        Self::write_files(&tx, tenant_id, batch_id, &batch.files)?;
        tx.commit()?;
        Ok(())
    }

    async fn delete_file_by_uuid(
        &self,
        tenant_id: &str,
        uuid: &str,
        part_of_batch_deletion: bool,
    ) -> Result<()> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let mut stmt = tx.prepare(
            "SELECT DISTINCT batch_id FROM file_refs WHERE tenant_id = ?1 AND uuid = ?2",
        )?;
        let batch_ids: Vec<String> = stmt
            .query_map(params![tenant_id, uuid], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        if batch_ids.is_empty() && !part_of_batch_deletion {
            return Err(GlossaError::not_found("file reference", uuid));
        }
        // Rewrite so positions stay contiguous.
        for batch_id in batch_ids {
            let mut files = Self::load_files(&tx, tenant_id, &batch_id)?;
            files.retain(|f| f.uuid != uuid);
            Self::write_files(&tx, tenant_id, &batch_id, &files)?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_registry() -> (SqliteRegistry, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join(StoreConfig::DATABASE_FILENAME);
        let registry = SqliteRegistry::open_at(&db_path).unwrap();
        (registry, temp_dir)
    }

    fn file_ref(uuid: &str, name: &str) -> FileRef {
        FileRef {
            uuid: uuid.into(),
            file_name: name.into(),
            file_size: 42,
            training_file_option: "parallel_corpus".into(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_model() {
        let (registry, _dir) = create_test_registry();
        let model = CustomModel::new("t1", "news", "en", "de", "en-de");
        let created = registry.create(model.clone()).await.unwrap();
        assert_eq!(created.revision.as_deref(), Some("1"));

        let fetched = registry.get_by_id("t1", &model.id).await.unwrap();
        assert_eq!(fetched.name, "news");
        assert_eq!(fetched.file_batch_id, model.file_batch_id);
        assert_eq!(fetched.revision.as_deref(), Some("1"));

        assert!(registry.create(model).await.is_err());
    }

    #[tokio::test]
    async fn test_update_requires_matching_revision() {
        let (registry, _dir) = create_test_registry();
        let created = registry
            .create(CustomModel::new("t1", "news", "en", "de", "en-de"))
            .await
            .unwrap();
        let stale = created.clone();

        let mut next = created;
        next.project = "p".into();
        let updated = registry.update(next).await.unwrap();
        assert_eq!(updated.revision.as_deref(), Some("2"));

        let err = registry.update(stale).await.unwrap_err();
        assert!(matches!(err, GlossaError::RevisionConflict { .. }));
    }

    #[tokio::test]
    async fn test_get_all_filters() {
        let (registry, _dir) = create_test_registry();
        let mut a = CustomModel::new("t1", "news", "en", "de", "en-de");
        a.project = "p1".into();
        registry.create(a).await.unwrap();
        registry
            .create(CustomModel::new("t1", "legal", "en", "de", "en-de"))
            .await
            .unwrap();
        registry
            .create(CustomModel::new("t2", "news", "en", "de", "en-de"))
            .await
            .unwrap();

        assert_eq!(registry.get_all("t1", None, None).await.unwrap().len(), 2);
        assert_eq!(registry.get_all("t1", Some("p1"), None).await.unwrap().len(), 1);
        assert_eq!(registry.get_all("t1", None, Some("legal")).await.unwrap().len(), 1);
        assert!(registry.get_all("t3", None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_model() {
        let (registry, _dir) = create_test_registry();
        let created = registry
            .create(CustomModel::new("t1", "news", "en", "de", "en-de"))
            .await
            .unwrap();
        assert!(registry.delete("t1", &created.id, Some("7")).await.is_err());
        registry
            .delete("t1", &created.id, created.revision.as_deref())
            .await
            .unwrap();
        assert!(registry.get_by_id("t1", &created.id).await.unwrap_err().is_not_found());
        registry.delete("t1", &created.id, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_lifecycle() {
        let (registry, _dir) = create_test_registry();
        let mut batch = Batch::empty("t1", "b1");
        batch.files = vec![file_ref("u1", "a.tmx"), file_ref("u2", "b.tmx")];
        registry.add_batch("t1", batch, "b1").await.unwrap();

        // create-if-absent
        let again = registry.add_batch("t1", Batch::empty("t1", "b1"), "b1").await.unwrap();
        assert_eq!(again.files.len(), 2);

        let clone = registry.clone_batch("t1", "b1", "b2").await.unwrap();
        assert_eq!(clone.files.len(), 2);
        assert_eq!(clone.files[1].file_name, "b.tmx");
        assert_ne!(clone.files[1].uuid, "u2");

        registry.delete_file("t1", "b1", "a.tmx").await.unwrap();
        let b1 = registry.get_batch("t1", "b1").await.unwrap();
        assert_eq!(b1.files, vec![file_ref("u2", "b.tmx")]);

        registry.delete_file_by_uuid("t1", "u2", false).await.unwrap();
        assert!(registry.get_batch("t1", "b1").await.unwrap().is_empty());
        assert!(registry.delete_file_by_uuid("t1", "u2", false).await.is_err());

        assert_eq!(registry.get_all_batches("t1").await.unwrap().len(), 2);
        registry.delete_batch("t1", "b1").await.unwrap();
        assert!(registry.get_batch("t1", "b1").await.unwrap_err().is_not_found());
        registry.delete_batch("t1", "b1").await.unwrap();
    }

    /// Make every insert of a file named `poison.tmx` fail.
    fn reject_poisoned_inserts(registry: &SqliteRegistry) {
        let conn = registry.lock_conn().unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_poison BEFORE INSERT ON file_refs
             WHEN NEW.file_name = 'poison.tmx'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_failed_batch_writes_leave_no_partial_state() {
        let (registry, _dir) = create_test_registry();
        let mut batch = Batch::empty("t1", "b1");
        batch.files = vec![file_ref("u1", "a.tmx"), file_ref("u2", "b.tmx")];
        registry.add_batch("t1", batch, "b1").await.unwrap();
        let mut src = Batch::empty("t1", "src");
        src.files = vec![file_ref("u3", "c.tmx"), file_ref("u4", "poison.tmx")];
        registry.add_batch("t1", src, "src").await.unwrap();
        reject_poisoned_inserts(&registry);

        let mut rewrite = Batch::empty("t1", "b1");
        rewrite.files = vec![file_ref("u1", "a.tmx"), file_ref("u5", "poison.tmx")];
        assert!(registry.update_batch("t1", rewrite, "b1").await.is_err());
        let b1 = registry.get_batch("t1", "b1").await.unwrap();
        assert_eq!(b1.files, vec![file_ref("u1", "a.tmx"), file_ref("u2", "b.tmx")]);

        let mut fresh = Batch::empty("t1", "b2");
        fresh.files = vec![file_ref("u6", "d.tmx"), file_ref("u7", "poison.tmx")];
        assert!(registry.add_batch("t1", fresh, "b2").await.is_err());
        assert!(registry.get_batch("t1", "b2").await.unwrap_err().is_not_found());

        assert!(registry.clone_batch("t1", "src", "dst").await.is_err());
        assert!(registry.get_batch("t1", "dst").await.unwrap_err().is_not_found());
        assert_eq!(registry.get_all_batches("t1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_missing_batch_fails() {
        let registry = SqliteRegistry::open_in_memory().unwrap();
        let err = registry
            .update_batch("t1", Batch::empty("t1", "nope"), "nope")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
