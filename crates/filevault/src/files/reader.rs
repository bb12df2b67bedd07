//! Read-only access: file contents, existence checks and directory listings.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use super::{ComponentCore, SandboxGuard};
use crate::audit::{AuditEvent, AuditLevel};
use crate::error::{FsError, FsResult};
use crate::types::TextEncoding;

/// Reads files and lists directories inside the sandbox.
#[derive(Debug)]
pub struct FileReader {
    core: ComponentCore,
}

impl FileReader {
    pub fn new(guard: SandboxGuard) -> Self {
        Self {
            core: ComponentCore::new("reader", guard),
        }
    }

    /// Read the entire contents of a file.
    pub async fn read_file(&self, path: impl AsRef<Path>) -> FsResult<Vec<u8>> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        self.core
            .run("read_file", &requested, move |guard| {
                let path = guard.validate(&target)?;
                fs::read(&path).map_err(|e| FsError::read(&path, e))
            })
            .await
    }

    /// Read a file and decode it as text.
    pub async fn read_file_as_string(
        &self,
        path: impl AsRef<Path>,
        encoding: TextEncoding,
    ) -> FsResult<String> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        self.core
            .run("read_file_as_string", &requested, move |guard| {
                let path = guard.validate(&target)?;
                let bytes = fs::read(&path).map_err(|e| FsError::read(&path, e))?;
                encoding
                    .decode(&bytes)
                    .map_err(|reason| FsError::Decoding { path, reason })
            })
            .await
    }

    /// Whether `path` exists.
    ///
    /// Never fails: a rejected path or an I/O error counts as absent and is
    /// reported as a warning.
    pub async fn file_exists(&self, path: impl AsRef<Path>) -> bool {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        let result = self
            .core
            .run_quiet(move |guard| {
                let path = guard.validate(&target)?;
                match fs::symlink_metadata(&path) {
                    Ok(_) => Ok(true),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                    Err(e) => Err(FsError::read(&path, e)),
                }
            })
            .await;

        match result {
            Ok(exists) => exists,
            // Already recorded by the guard.
            Err(FsError::AccessDenied { .. }) => false,
            Err(e) => {
                warn!(path = %requested.display(), error = %e, "existence check failed, reporting absent");
                self.core.guard().audit().record(
                    &AuditEvent::new(AuditLevel::Warning, "existence check failed")
                        .with("operation", "file_exists")
                        .with("path", requested.display())
                        .with("error", e.kind_name()),
                );
                false
            }
        }
    }

    /// Immediate children of a directory as absolute paths, sorted.
    pub async fn list_directory(&self, path: impl AsRef<Path>) -> FsResult<Vec<PathBuf>> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        self.core
            .run("list_directory", &requested, move |guard| {
                let dir = directory(guard, &target)?;
                let mut children = Vec::new();
                for entry in fs::read_dir(&dir).map_err(|e| FsError::read(&dir, e))? {
                    let entry = entry.map_err(|e| FsError::read(&dir, e))?;
                    children.push(entry.path());
                }
                children.sort();
                Ok(children)
            })
            .await
    }

    /// Every descendant of a directory as absolute paths. Symlinks are listed
    /// but not followed.
    pub async fn list_directory_recursively(
        &self,
        path: impl AsRef<Path>,
    ) -> FsResult<Vec<PathBuf>> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        self.core
            .run("list_directory_recursively", &requested, move |guard| {
                let dir = directory(guard, &target)?;
                let mut descendants = Vec::new();
                for entry in WalkDir::new(&dir).min_depth(1).follow_links(false) {
                    let entry = entry.map_err(|e| {
                        let at = e.path().unwrap_or(dir.as_path()).to_path_buf();
                        FsError::read(&at, io::Error::from(e))
                    })?;
                    descendants.push(entry.into_path());
                }
                Ok(descendants)
            })
            .await
    }
}

/// Validate `path` and require an existing directory; returns it absolute.
fn directory(guard: &SandboxGuard, path: &Path) -> FsResult<PathBuf> {
    let path = guard.validate(path)?;
    let path = std::path::absolute(&path).map_err(|e| FsError::read(&path, e))?;
    let metadata = fs::metadata(&path).map_err(|e| FsError::read(&path, e))?;
    if !metadata.is_dir() {
        return Err(FsError::NotADirectory { path });
    }
    Ok(path)
}
