//! Filesystem-backed object store.
//!
//! Each tenant gets one container directory; each file is stored under its
//! uuid. Writes go to a temp name first and are renamed into place.

use super::traits::ObjectStore;
use crate::error::{GlossaError, Result};
use crate::models::StoredFile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

const TEMP_SUFFIX: &str = ".part";

pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container(&self, tenant_id: &str) -> Result<PathBuf> {
        validate_segment("tenant_id", tenant_id)?;
        Ok(self.root.join(tenant_id))
    }

    fn file_path(&self, tenant_id: &str, uuid: &str) -> Result<PathBuf> {
        validate_segment("uuid", uuid)?;
        Ok(self.container(tenant_id)?.join(uuid))
    }

    async fn ensure_container(&self, tenant_id: &str) -> Result<PathBuf> {
        let dir = self.container(tenant_id)?;
        if !dir.exists() {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| GlossaError::io_with_path(e, &dir))?;
            debug!("Created container for tenant {}", tenant_id);
        }
        Ok(dir)
    }

    async fn describe(tenant_id: &str, uuid: &str, path: &Path) -> Result<StoredFile> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| GlossaError::io_with_path(e, path))?;
        Ok(StoredFile {
            tenant_id: tenant_id.to_string(),
            uuid: uuid.to_string(),
            size: meta.len(),
            last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }
}

/// Reject names that could escape the container.
fn validate_segment(field: &str, value: &str) -> Result<()> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\')
        || value.ends_with(TEMP_SUFFIX);
    if bad {
        return Err(GlossaError::InvalidParams {
            message: format!("invalid {}: {:?}", field, value),
        });
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn examine_container(&self, tenant_id: &str) -> Result<Vec<StoredFile>> {
        let dir = self.ensure_container(tenant_id).await?;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| GlossaError::io_with_path(e, &dir))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| GlossaError::io_with_path(e, &dir))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            files.push(Self::describe(tenant_id, &name, &path).await?);
        }
        files.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        Ok(files)
    }

    async fn put_file(&self, tenant_id: &str, uuid: &str, bytes: &[u8]) -> Result<StoredFile> {
        self.ensure_container(tenant_id).await?;
        let path = self.file_path(tenant_id, uuid)?;
        let temp = path.with_file_name(format!("{}{}", uuid, TEMP_SUFFIX));
        tokio::fs::write(&temp, bytes)
            .await
            .map_err(|e| GlossaError::io_with_path(e, &temp))?;
        tokio::fs::rename(&temp, &path)
            .await
            .map_err(|e| GlossaError::io_with_path(e, &path))?;
        Self::describe(tenant_id, uuid, &path).await
    }

    async fn copy_file(
        &self,
        tenant_id: &str,
        src_uuid: &str,
        dst_uuid: &str,
    ) -> Result<StoredFile> {
        let src = self.file_path(tenant_id, src_uuid)?;
        if !src.exists() {
            return Err(GlossaError::not_found("stored file", src_uuid));
        }
        let dst = self.file_path(tenant_id, dst_uuid)?;
        let temp = dst.with_file_name(format!("{}{}", dst_uuid, TEMP_SUFFIX));
        tokio::fs::copy(&src, &temp)
            .await
            .map_err(|e| GlossaError::io_with_path(e, &src))?;
        tokio::fs::rename(&temp, &dst)
            .await
            .map_err(|e| GlossaError::io_with_path(e, &dst))?;
        Self::describe(tenant_id, dst_uuid, &dst).await
    }

    async fn delete_file(&self, tenant_id: &str, uuid: &str) -> Result<()> {
        let path = self.file_path(tenant_id, uuid)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GlossaError::io_with_path(e, &path)),
        }
    }
}
