//! The composition facade.
//!
//! [`FileSystemService`] owns one instance of every component. All of them
//! share a single [`SandboxGuard`] and audit sink, and each call is delegated
//! to the component that owns the operation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use envelope::{Algorithm, KeyProvider};
use uuid::Uuid;

use crate::audit::{noop_sink, SharedAuditSink, TracingAuditSink};
use crate::config::Config;
use crate::error::{FsError, FsResult};
use crate::files::{
    blocking, FileReader, FileWriter, MetadataManager, SandboxGuard, SecureOperations,
};
use crate::types::{
    AttributeChanges, FileAttributes, FileOperationResult, SecureDeletionPolicy,
    SecurePermissions, SecureReadOptions, SecureWriteOptions, TextEncoding, WriteOptions,
};

/// Attempts at finding a free name before giving up.
const UNIQUE_NAME_ATTEMPTS: usize = 8;

/// Builder for [`FileSystemService`].
pub struct FileSystemServiceBuilder {
    root: Option<PathBuf>,
    audit: SharedAuditSink,
    keys: Option<Arc<dyn KeyProvider>>,
    algorithm: Algorithm,
    deletion_policy: SecureDeletionPolicy,
}

impl Default for FileSystemServiceBuilder {
    fn default() -> Self {
        Self {
            root: None,
            audit: noop_sink(),
            keys: None,
            algorithm: Algorithm::default(),
            deletion_policy: SecureDeletionPolicy::default(),
        }
    }
}

impl FileSystemServiceBuilder {
    /// Confine every path to `root`.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Send audit events to `sink` instead of discarding them.
    pub fn audit_sink(mut self, sink: SharedAuditSink) -> Self {
        self.audit = sink;
        self
    }

    /// Supply key material for sealed calls without an explicit key.
    pub fn key_provider(mut self, provider: Arc<dyn KeyProvider>) -> Self {
        self.keys = Some(provider);
        self
    }

    /// Default algorithm reported by [`FileSystemService::default_write_options`].
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Default policy reported by [`FileSystemService::deletion_policy`].
    pub fn deletion_policy(mut self, policy: SecureDeletionPolicy) -> Self {
        self.deletion_policy = policy;
        self
    }

    /// Canonicalise the root and wire the components together.
    pub fn build(self) -> FsResult<FileSystemService> {
        let guard = SandboxGuard::new(self.root, self.audit)?;
        let reader = Arc::new(FileReader::new(guard.clone()));
        let writer = Arc::new(FileWriter::new(guard.clone()));
        let metadata = MetadataManager::new(guard.clone());

        let mut secure =
            SecureOperations::new(guard.clone(), Arc::clone(&reader), Arc::clone(&writer));
        if let Some(keys) = self.keys {
            secure = secure.with_key_provider(keys);
        }

        tracing::debug!(root = ?guard.root(), "file system service ready");

        Ok(FileSystemService {
            guard,
            reader,
            writer,
            metadata,
            secure,
            algorithm: self.algorithm,
            deletion_policy: self.deletion_policy,
        })
    }
}

/// Sandboxed file-system access with a secure-storage layer.
pub struct FileSystemService {
    guard: SandboxGuard,
    reader: Arc<FileReader>,
    writer: Arc<FileWriter>,
    metadata: MetadataManager,
    secure: SecureOperations,
    algorithm: Algorithm,
    deletion_policy: SecureDeletionPolicy,
}

impl fmt::Debug for FileSystemService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemService")
            .field("guard", &self.guard)
            .field("algorithm", &self.algorithm)
            .field("deletion_policy", &self.deletion_policy)
            .finish_non_exhaustive()
    }
}

impl FileSystemService {
    pub fn builder() -> FileSystemServiceBuilder {
        FileSystemServiceBuilder::default()
    }

    /// A service confined to `root`, or unrestricted when `None`.
    pub fn new(root: Option<PathBuf>) -> FsResult<Self> {
        let mut builder = Self::builder();
        if let Some(root) = root {
            builder = builder.root(root);
        }
        builder.build()
    }

    /// Build a service from loaded configuration. Audit events go to
    /// `tracing`.
    pub fn from_config(config: &Config, keys: Option<Arc<dyn KeyProvider>>) -> FsResult<Self> {
        let mut builder = Self::builder()
            .audit_sink(Arc::new(TracingAuditSink))
            .algorithm(config.secure.algorithm)
            .deletion_policy(config.secure.deletion_policy());
        if let Some(root) = &config.sandbox.root {
            builder = builder.root(root.clone());
        }
        if let Some(keys) = keys {
            builder = builder.key_provider(keys);
        }
        builder.build()
    }

    pub fn guard(&self) -> &SandboxGuard {
        &self.guard
    }

    pub fn reader(&self) -> &FileReader {
        &self.reader
    }

    pub fn writer(&self) -> &FileWriter {
        &self.writer
    }

    pub fn metadata(&self) -> &MetadataManager {
        &self.metadata
    }

    pub fn secure(&self) -> &SecureOperations {
        &self.secure
    }

    /// Configured default deletion policy.
    pub fn deletion_policy(&self) -> SecureDeletionPolicy {
        self.deletion_policy
    }

    /// Sealed-write options using the configured algorithm and no explicit key.
    pub fn default_write_options(&self) -> SecureWriteOptions {
        SecureWriteOptions {
            algorithm: self.algorithm,
            ..Default::default()
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn read_file(&self, path: impl AsRef<Path>) -> FsResult<Vec<u8>> {
        self.reader.read_file(path).await
    }

    pub async fn read_file_as_string(
        &self,
        path: impl AsRef<Path>,
        encoding: TextEncoding,
    ) -> FsResult<String> {
        self.reader.read_file_as_string(path, encoding).await
    }

    pub async fn file_exists(&self, path: impl AsRef<Path>) -> bool {
        self.reader.file_exists(path).await
    }

    pub async fn list_directory(&self, path: impl AsRef<Path>) -> FsResult<Vec<PathBuf>> {
        self.reader.list_directory(path).await
    }

    pub async fn list_directory_recursively(
        &self,
        path: impl AsRef<Path>,
    ) -> FsResult<Vec<PathBuf>> {
        self.reader.list_directory_recursively(path).await
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub async fn create_file(
        &self,
        path: impl AsRef<Path>,
        options: WriteOptions,
    ) -> FsResult<FileOperationResult> {
        self.writer.create_file(path, options).await
    }

    pub async fn write_file(
        &self,
        data: impl AsRef<[u8]>,
        path: impl AsRef<Path>,
        options: WriteOptions,
    ) -> FsResult<FileOperationResult> {
        self.writer.write_file(data, path, options).await
    }

    pub async fn write_string(
        &self,
        text: &str,
        path: impl AsRef<Path>,
        encoding: TextEncoding,
        options: WriteOptions,
    ) -> FsResult<FileOperationResult> {
        self.writer.write_string(text, path, encoding, options).await
    }

    pub async fn create_directory(
        &self,
        path: impl AsRef<Path>,
        create_intermediate: bool,
        attributes: Option<AttributeChanges>,
    ) -> FsResult<FileOperationResult> {
        self.writer
            .create_directory(path, create_intermediate, attributes)
            .await
    }

    pub async fn delete(&self, path: impl AsRef<Path>) -> FsResult<FileOperationResult> {
        self.writer.delete(path).await
    }

    pub async fn move_item(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
        options: WriteOptions,
    ) -> FsResult<FileOperationResult> {
        self.writer.move_item(source, destination, options).await
    }

    pub async fn copy_item(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
        options: WriteOptions,
    ) -> FsResult<FileOperationResult> {
        self.writer.copy_item(source, destination, options).await
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    pub async fn get_attributes(
        &self,
        path: impl AsRef<Path>,
        include_extended: bool,
    ) -> FsResult<FileAttributes> {
        self.metadata.get_attributes(path, include_extended).await
    }

    pub async fn set_attributes(
        &self,
        changes: AttributeChanges,
        path: impl AsRef<Path>,
    ) -> FsResult<FileOperationResult> {
        self.metadata.set_attributes(changes, path).await
    }

    pub async fn get_file_size(&self, path: impl AsRef<Path>) -> FsResult<u64> {
        self.metadata.get_file_size(path).await
    }

    pub async fn get_creation_date(&self, path: impl AsRef<Path>) -> FsResult<SystemTime> {
        self.metadata.get_creation_date(path).await
    }

    pub async fn get_modification_date(&self, path: impl AsRef<Path>) -> FsResult<SystemTime> {
        self.metadata.get_modification_date(path).await
    }

    pub async fn set_creation_date(
        &self,
        date: SystemTime,
        path: impl AsRef<Path>,
    ) -> FsResult<FileOperationResult> {
        self.metadata.set_creation_date(date, path).await
    }

    pub async fn set_modification_date(
        &self,
        date: SystemTime,
        path: impl AsRef<Path>,
    ) -> FsResult<FileOperationResult> {
        self.metadata.set_modification_date(date, path).await
    }

    pub async fn get_extended_attribute(
        &self,
        name: &str,
        path: impl AsRef<Path>,
    ) -> FsResult<Vec<u8>> {
        self.metadata.get_extended_attribute(name, path).await
    }

    pub async fn set_extended_attribute(
        &self,
        name: &str,
        value: impl AsRef<[u8]>,
        path: impl AsRef<Path>,
    ) -> FsResult<FileOperationResult> {
        self.metadata.set_extended_attribute(name, value, path).await
    }

    pub async fn list_extended_attributes(&self, path: impl AsRef<Path>) -> FsResult<Vec<String>> {
        self.metadata.list_extended_attributes(path).await
    }

    pub async fn remove_extended_attribute(
        &self,
        name: &str,
        path: impl AsRef<Path>,
    ) -> FsResult<FileOperationResult> {
        self.metadata.remove_extended_attribute(name, path).await
    }

    // ========================================================================
    // Secure operations
    // ========================================================================

    pub async fn create_secure_temp_file(
        &self,
        prefix: Option<&str>,
        attributes: Option<AttributeChanges>,
    ) -> FsResult<FileOperationResult> {
        self.secure.create_secure_temp_file(prefix, attributes).await
    }

    pub async fn create_secure_temp_directory(
        &self,
        prefix: Option<&str>,
        attributes: Option<AttributeChanges>,
    ) -> FsResult<FileOperationResult> {
        self.secure
            .create_secure_temp_directory(prefix, attributes)
            .await
    }

    pub async fn secure_write_file(
        &self,
        data: impl AsRef<[u8]>,
        path: impl AsRef<Path>,
        options: SecureWriteOptions,
    ) -> FsResult<FileOperationResult> {
        self.secure.secure_write_file(data, path, options).await
    }

    pub async fn secure_read_file(
        &self,
        path: impl AsRef<Path>,
        options: SecureReadOptions,
    ) -> FsResult<Vec<u8>> {
        self.secure.secure_read_file(path, options).await
    }

    pub async fn secure_delete(
        &self,
        path: impl AsRef<Path>,
        policy: SecureDeletionPolicy,
    ) -> FsResult<FileOperationResult> {
        self.secure.secure_delete(path, policy).await
    }

    pub async fn set_secure_permissions(
        &self,
        permissions: SecurePermissions,
        path: impl AsRef<Path>,
    ) -> FsResult<FileOperationResult> {
        self.secure.set_secure_permissions(permissions, path).await
    }

    pub async fn verify_file_integrity(
        &self,
        path: impl AsRef<Path>,
        expected: &[u8],
    ) -> FsResult<bool> {
        self.secure.verify_file_integrity(path, expected).await
    }

    pub async fn file_digest(&self, path: impl AsRef<Path>) -> FsResult<[u8; 32]> {
        self.secure.file_digest(path).await
    }

    // ========================================================================
    // Path utilities
    // ========================================================================

    /// The process temporary directory.
    pub fn temporary_directory(&self) -> PathBuf {
        std::env::temp_dir()
    }

    /// A path in `directory` named `<stem>-<uuid>[.<extension>]` that does not
    /// exist yet. The result is sandbox-validated.
    pub async fn unique_filename(
        &self,
        directory: impl AsRef<Path>,
        stem: &str,
        extension: Option<&str>,
    ) -> FsResult<PathBuf> {
        let directory = directory.as_ref().to_path_buf();
        let guard = self.guard.clone();
        let stem = stem.to_string();
        let extension = extension.map(|e| e.trim_start_matches('.').to_string());

        blocking(move || {
            let directory = guard.validate(&directory)?;
            for _ in 0..UNIQUE_NAME_ATTEMPTS {
                let mut name = format!("{}-{}", stem, Uuid::new_v4());
                if let Some(extension) = extension.as_deref().filter(|e| !e.is_empty()) {
                    name.push('.');
                    name.push_str(extension);
                }
                let candidate = directory.join(name);
                if std::fs::symlink_metadata(&candidate).is_err() {
                    return Ok(candidate);
                }
            }
            Err(FsError::Internal(format!(
                "no free file name found in {}",
                directory.display()
            )))
        })
        .await
    }

    /// Lexically normalise `path`: `.` removed, `..` folded, separators
    /// collapsed. Does not touch the file system.
    pub fn normalize_path(&self, path: impl AsRef<Path>) -> PathBuf {
        path_clean::clean(path)
    }
}
