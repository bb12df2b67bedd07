//! Symmetric key material and the key-provider seam.
//!
//! Keys are always supplied by the caller, either directly or through a
//! [`KeyProvider`]. Nothing in this crate persists key material, and a sealed
//! frame never carries the key that opens it.

use std::fmt;
use std::path::Path;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{EnvelopeError, Result};

/// Length of a symmetric key in bytes (256 bits for both supported ciphers).
pub const KEY_LENGTH: usize = 32;

/// A 256-bit symmetric key, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LENGTH]);

impl SymmetricKey {
    /// Generates a new random key from the operating system's CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Creates a key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Creates a key from a byte slice, which must be exactly [`KEY_LENGTH`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            EnvelopeError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Parses a hex-encoded key. Surrounding whitespace is ignored.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let mut bytes = hex::decode(encoded.trim())?;
        let key = Self::from_slice(&bytes);
        bytes.zeroize();
        key
    }

    /// Returns the raw key bytes.
    ///
    /// **Security Warning**: only hand these to a cipher or to secure storage.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    /// Returns the key as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SymmetricKey").field(&"[REDACTED]").finish()
    }
}

/// Source of key material for sealing and opening files.
///
/// Implementations typically front a KMS or keychain. The path is the
/// sandbox-validated location of the file being sealed or opened, which lets a
/// provider hand out per-file or per-directory keys.
pub trait KeyProvider: Send + Sync {
    /// Returns the key used for the file at `path`.
    fn key_for(&self, path: &Path) -> Result<SymmetricKey>;
}

/// A provider that returns the same key for every path.
#[derive(Clone)]
pub struct StaticKeyProvider {
    key: SymmetricKey,
}

impl StaticKeyProvider {
    /// Creates a provider wrapping a single key.
    pub fn new(key: SymmetricKey) -> Self {
        Self { key }
    }
}

impl fmt::Debug for StaticKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeyProvider")
            .field("key", &self.key)
            .finish()
    }
}

impl KeyProvider for StaticKeyProvider {
    fn key_for(&self, _path: &Path) -> Result<SymmetricKey> {
        Ok(self.key.clone())
    }
}
