//! Secure storage on top of the plain reader and writer.
//!
//! - Owner-only temp files and directories with unguessable names
//! - Sealed writes and reads using the [`envelope`] frame format
//! - Multi-pass secure deletion
//! - Permission hardening
//! - SHA-256 integrity checks
//!
//! Keys are never generated on the fly or stored next to the data: each
//! sealed call uses the key in its options or, failing that, the injected
//! [`KeyProvider`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use envelope::{EncryptedFrame, KeyProvider, SymmetricKey};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};

use super::attributes::{apply_changes, read_attributes, set_mode};
use super::shred::shred_file;
use super::{blocking, ComponentCore, FileReader, FileWriter, SandboxGuard};
use crate::error::{FsError, FsResult};
use crate::types::{
    AttributeChanges, FileOperationResult, SecureDeletionPolicy, SecurePermissions,
    SecureReadOptions, SecureWriteOptions, WriteOptions,
};

/// Length of the random part of secure temp names.
pub const RANDOM_NAME_LENGTH: usize = 16;

/// Mode of sealed files and secure temp files.
pub const OWNER_FILE_MODE: u32 = 0o600;

/// Mode of secure temp directories.
pub const OWNER_DIR_MODE: u32 = 0o700;

/// Length of a SHA-256 digest.
pub const DIGEST_LENGTH: usize = 32;

/// Sealed I/O, secure erasure, permission hardening and integrity checks.
pub struct SecureOperations {
    core: ComponentCore,
    reader: Arc<FileReader>,
    writer: Arc<FileWriter>,
    keys: Option<Arc<dyn KeyProvider>>,
}

impl fmt::Debug for SecureOperations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureOperations")
            .field("core", &self.core)
            .field("has_key_provider", &self.keys.is_some())
            .finish_non_exhaustive()
    }
}

impl SecureOperations {
    /// Create the component on top of an existing reader and writer.
    pub fn new(guard: SandboxGuard, reader: Arc<FileReader>, writer: Arc<FileWriter>) -> Self {
        Self {
            core: ComponentCore::new("secure", guard),
            reader,
            writer,
            keys: None,
        }
    }

    /// Use `provider` for sealed calls that carry no explicit key.
    pub fn with_key_provider(mut self, provider: Arc<dyn KeyProvider>) -> Self {
        self.keys = Some(provider);
        self
    }

    /// Create an owner-only (`0600`) file in the process temp directory.
    ///
    /// The name is `prefix` followed by random alphanumerics. `attributes`
    /// are overlaid on the mode; a caller permission replaces it.
    pub async fn create_secure_temp_file(
        &self,
        prefix: Option<&str>,
        attributes: Option<AttributeChanges>,
    ) -> FsResult<FileOperationResult> {
        let path = random_temp_path(prefix);
        self.core
            .sequence("create_secure_temp_file", &path, || async {
                self.writer
                    .create_file(&path, WriteOptions::default().non_atomic())
                    .await?;
                harden(path.clone(), OWNER_FILE_MODE, attributes).await
            })
            .await
    }

    /// Create an owner-only (`0700`) directory in the process temp directory.
    pub async fn create_secure_temp_directory(
        &self,
        prefix: Option<&str>,
        attributes: Option<AttributeChanges>,
    ) -> FsResult<FileOperationResult> {
        let path = random_temp_path(prefix);
        self.core
            .sequence("create_secure_temp_directory", &path, || async {
                self.writer.create_directory(&path, false, None).await?;
                harden(path.clone(), OWNER_DIR_MODE, attributes).await
            })
            .await
    }

    /// Seal `data` and write the frame to `path`, then restrict it to `0600`.
    pub async fn secure_write_file(
        &self,
        data: impl AsRef<[u8]>,
        path: impl AsRef<Path>,
        options: SecureWriteOptions,
    ) -> FsResult<FileOperationResult> {
        let requested = path.as_ref().to_path_buf();
        let data = data.as_ref().to_vec();
        self.core
            .sequence("secure_write_file", &requested, || async {
                let path = self.validate(&requested).await?;
                let key = self.resolve_key(options.key, &path).await?;

                let algorithm = options.algorithm;
                let sealed_path = path.clone();
                let encoded = blocking(move || {
                    EncryptedFrame::seal(algorithm, &key, &data)
                        .and_then(|frame| frame.encode())
                        .map_err(|e| FsError::security(&sealed_path, e))
                })
                .await?;

                self.writer.write_file(encoded, &path, options.write).await?;
                harden(path, OWNER_FILE_MODE, None).await
            })
            .await
    }

    /// Read a sealed frame from `path` and return the plaintext.
    ///
    /// Any framing, metadata or authentication failure is a `Security` error;
    /// no partial plaintext is ever returned.
    pub async fn secure_read_file(
        &self,
        path: impl AsRef<Path>,
        options: SecureReadOptions,
    ) -> FsResult<Vec<u8>> {
        let requested = path.as_ref().to_path_buf();
        self.core
            .sequence("secure_read_file", &requested, || async {
                let path = self.validate(&requested).await?;
                let key = self.resolve_key(options.key, &path).await?;
                let encoded = self.reader.read_file(&path).await?;

                blocking(move || {
                    EncryptedFrame::decode(&encoded)
                        .and_then(|frame| frame.open(&key))
                        .map_err(|e| FsError::security(&path, e))
                })
                .await
            })
            .await
    }

    /// Overwrite the file at `path` as `policy` says, then unlink it.
    pub async fn secure_delete(
        &self,
        path: impl AsRef<Path>,
        policy: SecureDeletionPolicy,
    ) -> FsResult<FileOperationResult> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        self.core
            .run("secure_delete", &requested, move |guard| {
                let path = guard.validate(&target)?;
                shred_file(&path, &policy)?;
                Ok(FileOperationResult::succeeded(path, None))
            })
            .await
    }

    /// Apply `permissions`, stripping write bits when `owner_read_only` is set.
    pub async fn set_secure_permissions(
        &self,
        permissions: SecurePermissions,
        path: impl AsRef<Path>,
    ) -> FsResult<FileOperationResult> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        self.core
            .run("set_secure_permissions", &requested, move |guard| {
                let path = guard.validate(&target)?;
                fs::symlink_metadata(&path).map_err(|e| FsError::metadata(&path, e))?;
                set_mode(&path, permissions.effective_mode())?;
                let attributes = read_attributes(&path, false)?;
                Ok(FileOperationResult::succeeded(path, Some(attributes)))
            })
            .await
    }

    /// Whether the SHA-256 of the file at `path` equals `expected`.
    ///
    /// A mismatch, including a digest of the wrong length, is `Ok(false)`.
    pub async fn verify_file_integrity(
        &self,
        path: impl AsRef<Path>,
        expected: &[u8],
    ) -> FsResult<bool> {
        let requested = path.as_ref().to_path_buf();
        let expected = expected.to_vec();
        self.core
            .sequence("verify_file_integrity", &requested, || async {
                let actual = self.digest_of(&requested).await?;
                Ok(expected.len() == DIGEST_LENGTH && actual[..] == expected[..])
            })
            .await
    }

    /// SHA-256 of the file at `path`.
    pub async fn file_digest(&self, path: impl AsRef<Path>) -> FsResult<[u8; DIGEST_LENGTH]> {
        let requested = path.as_ref().to_path_buf();
        self.core
            .sequence("file_digest", &requested, || self.digest_of(&requested))
            .await
    }

    async fn digest_of(&self, path: &Path) -> FsResult<[u8; DIGEST_LENGTH]> {
        let contents = self.reader.read_file(path).await?;
        blocking(move || {
            let mut digest = [0u8; DIGEST_LENGTH];
            digest.copy_from_slice(&Sha256::digest(&contents));
            Ok(digest)
        })
        .await
    }

    async fn validate(&self, path: &Path) -> FsResult<PathBuf> {
        let guard = self.core.guard().clone();
        let path = path.to_path_buf();
        blocking(move || guard.validate(&path)).await
    }

    async fn resolve_key(&self, explicit: Option<SymmetricKey>, path: &Path) -> FsResult<SymmetricKey> {
        if let Some(key) = explicit {
            return Ok(key);
        }
        let Some(provider) = self.keys.clone() else {
            return Err(FsError::security(path, "no key material available"));
        };
        let path = path.to_path_buf();
        blocking(move || provider.key_for(&path).map_err(|e| FsError::security(&path, e))).await
    }
}

/// Apply `mode` with the caller's attributes overlaid; a caller-supplied
/// permission wins over `mode`.
async fn harden(
    path: PathBuf,
    mode: u32,
    attributes: Option<AttributeChanges>,
) -> FsResult<FileOperationResult> {
    let changes = match &attributes {
        Some(caller) => AttributeChanges::permissions(mode).merged_with(caller),
        None => AttributeChanges::permissions(mode),
    };
    blocking(move || {
        apply_changes(&path, &changes)?;
        let snapshot = read_attributes(&path, false)?;
        Ok(FileOperationResult::succeeded(path, Some(snapshot)))
    })
    .await
}

fn random_temp_path(prefix: Option<&str>) -> PathBuf {
    let suffix: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(RANDOM_NAME_LENGTH)
        .map(char::from)
        .collect();
    std::env::temp_dir().join(format!("{}{}", prefix.unwrap_or(""), suffix))
}
