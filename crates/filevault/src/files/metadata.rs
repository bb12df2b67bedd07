//! POSIX attributes, timestamps and extended attributes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::attributes::{apply_changes, read_attributes, xattr_error};
use super::{xattr, ComponentCore, SandboxGuard};
use crate::error::{FsError, FsResult};
use crate::types::{AttributeChanges, FileAttributes, FileOperationResult};

/// Queries and updates metadata of existing paths.
#[derive(Debug)]
pub struct MetadataManager {
    core: ComponentCore,
}

impl MetadataManager {
    pub fn new(guard: SandboxGuard) -> Self {
        Self {
            core: ComponentCore::new("metadata", guard),
        }
    }

    /// Snapshot of `path`'s attributes, optionally with its extended
    /// attributes.
    pub async fn get_attributes(
        &self,
        path: impl AsRef<Path>,
        include_extended: bool,
    ) -> FsResult<FileAttributes> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        self.core
            .run("get_attributes", &requested, move |guard| {
                let path = guard.validate(&target)?;
                read_attributes(&path, include_extended)
            })
            .await
    }

    /// Apply the fields set in `changes`; everything else is left alone.
    pub async fn set_attributes(
        &self,
        changes: AttributeChanges,
        path: impl AsRef<Path>,
    ) -> FsResult<FileOperationResult> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        self.core
            .run("set_attributes", &requested, move |guard| {
                let path = existing(guard, &target)?;
                apply_changes(&path, &changes)?;
                let attributes = read_attributes(&path, false)?;
                Ok(FileOperationResult::succeeded(path, Some(attributes)))
            })
            .await
    }

    pub async fn get_file_size(&self, path: impl AsRef<Path>) -> FsResult<u64> {
        Ok(self.get_attributes(path, false).await?.size)
    }

    /// Birth time of `path`. Fails with `Metadata` when the file system does
    /// not record one.
    pub async fn get_creation_date(&self, path: impl AsRef<Path>) -> FsResult<SystemTime> {
        let path = path.as_ref();
        self.get_attributes(path, false)
            .await?
            .created
            .ok_or_else(|| unavailable(path, "creation time"))
    }

    pub async fn get_modification_date(&self, path: impl AsRef<Path>) -> FsResult<SystemTime> {
        let path = path.as_ref();
        self.get_attributes(path, false)
            .await?
            .modified
            .ok_or_else(|| unavailable(path, "modification time"))
    }

    pub async fn set_creation_date(
        &self,
        date: SystemTime,
        path: impl AsRef<Path>,
    ) -> FsResult<FileOperationResult> {
        let changes = AttributeChanges {
            created: Some(date),
            ..Default::default()
        };
        self.set_attributes(changes, path).await
    }

    pub async fn set_modification_date(
        &self,
        date: SystemTime,
        path: impl AsRef<Path>,
    ) -> FsResult<FileOperationResult> {
        let changes = AttributeChanges {
            modified: Some(date),
            ..Default::default()
        };
        self.set_attributes(changes, path).await
    }

    /// Value of extended attribute `name`.
    pub async fn get_extended_attribute(
        &self,
        name: &str,
        path: impl AsRef<Path>,
    ) -> FsResult<Vec<u8>> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        let name = name.to_string();
        self.core
            .run("get_extended_attribute", &requested, move |guard| {
                let path = existing(guard, &target)?;
                xattr::get(&path, &name).map_err(|e| xattr_error(&path, &name, e))
            })
            .await
    }

    /// Create or replace extended attribute `name`.
    pub async fn set_extended_attribute(
        &self,
        name: &str,
        value: impl AsRef<[u8]>,
        path: impl AsRef<Path>,
    ) -> FsResult<FileOperationResult> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        let name = name.to_string();
        let value = value.as_ref().to_vec();
        self.core
            .run("set_extended_attribute", &requested, move |guard| {
                let path = existing(guard, &target)?;
                xattr::set(&path, &name, &value).map_err(|e| xattr_error(&path, &name, e))?;
                Ok(FileOperationResult::succeeded(path, None))
            })
            .await
    }

    /// Names of all extended attributes on `path`.
    pub async fn list_extended_attributes(&self, path: impl AsRef<Path>) -> FsResult<Vec<String>> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        self.core
            .run("list_extended_attributes", &requested, move |guard| {
                let path = existing(guard, &target)?;
                xattr::list(&path).map_err(|e| xattr_error(&path, "", e))
            })
            .await
    }

    pub async fn remove_extended_attribute(
        &self,
        name: &str,
        path: impl AsRef<Path>,
    ) -> FsResult<FileOperationResult> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        let name = name.to_string();
        self.core
            .run("remove_extended_attribute", &requested, move |guard| {
                let path = existing(guard, &target)?;
                xattr::remove(&path, &name).map_err(|e| xattr_error(&path, &name, e))?;
                Ok(FileOperationResult::succeeded(path, None))
            })
            .await
    }
}

/// Validate `path` and require that it exists.
fn existing(guard: &SandboxGuard, path: &Path) -> FsResult<PathBuf> {
    let path = guard.validate(path)?;
    fs::symlink_metadata(&path).map_err(|e| FsError::metadata(&path, e))?;
    Ok(path)
}

fn unavailable(path: &Path, what: &str) -> FsError {
    FsError::Metadata {
        path: path.to_path_buf(),
        reason: format!("{} is not available on this file system", what),
        source: None,
    }
}
