//! AEAD algorithms used to seal file contents.
//!
//! Both ciphers produce the "combined" layout stored on disk:
//!
//! ```text
//! nonce (12 bytes) || ciphertext || tag (16 bytes)
//! ```
//!
//! A fresh random nonce is drawn for every seal operation.

use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{EnvelopeError, Result};
use crate::key::SymmetricKey;

/// Nonce length shared by AES-256-GCM and ChaCha20-Poly1305.
pub const NONCE_LENGTH: usize = 12;

/// Authentication tag length shared by both ciphers.
pub const TAG_LENGTH: usize = 16;

/// Bytes added to the plaintext by a seal operation.
pub const SEAL_OVERHEAD: usize = NONCE_LENGTH + TAG_LENGTH;

/// Authenticated encryption algorithm recorded in frame metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Algorithm {
    /// AES-256 in Galois/Counter Mode.
    #[default]
    #[serde(rename = "aes256")]
    Aes256Gcm,
    /// ChaCha20 stream cipher with Poly1305 authenticator.
    #[serde(rename = "chachapoly")]
    ChaCha20Poly1305,
}

impl Algorithm {
    /// Identifier written into frame metadata.
    pub fn id(self) -> &'static str {
        match self {
            Algorithm::Aes256Gcm => "aes256",
            Algorithm::ChaCha20Poly1305 => "chachapoly",
        }
    }

    /// Seals `plaintext` under `key`, returning `nonce || ciphertext || tag`.
    pub fn seal(self, key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);

        let sealed = match self {
            Algorithm::Aes256Gcm => Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| EnvelopeError::InvalidKey(e.to_string()))?
                .encrypt(aes_gcm::Nonce::from_slice(&nonce), plaintext),
            Algorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key.as_bytes())
                .map_err(|e| EnvelopeError::InvalidKey(e.to_string()))?
                .encrypt(chacha20poly1305::Nonce::from_slice(&nonce), plaintext),
        }
        .map_err(|_| EnvelopeError::Encryption(format!("{} seal failed", self.id())))?;

        let mut combined = Vec::with_capacity(NONCE_LENGTH + sealed.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&sealed);
        Ok(combined)
    }

    /// Opens a combined `nonce || ciphertext || tag` buffer.
    ///
    /// Fails without returning any plaintext if the tag does not verify.
    pub fn open(self, key: &SymmetricKey, combined: &[u8]) -> Result<Vec<u8>> {
        if combined.len() < SEAL_OVERHEAD {
            return Err(EnvelopeError::MalformedFrame(format!(
                "sealed payload is {} bytes, need at least {}",
                combined.len(),
                SEAL_OVERHEAD
            )));
        }

        let (nonce, sealed) = combined.split_at(NONCE_LENGTH);

        match self {
            Algorithm::Aes256Gcm => Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| EnvelopeError::InvalidKey(e.to_string()))?
                .decrypt(aes_gcm::Nonce::from_slice(nonce), sealed),
            Algorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key.as_bytes())
                .map_err(|e| EnvelopeError::InvalidKey(e.to_string()))?
                .decrypt(chacha20poly1305::Nonce::from_slice(nonce), sealed),
        }
        .map_err(|_| EnvelopeError::Decryption("authentication tag mismatch".to_string()))
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Algorithm {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aes256" | "aes-256-gcm" | "aes256gcm" => Ok(Algorithm::Aes256Gcm),
            "chachapoly" | "chacha20-poly1305" | "chacha20poly1305" => {
                Ok(Algorithm::ChaCha20Poly1305)
            }
            other => Err(EnvelopeError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALGORITHMS: [Algorithm; 2] = [Algorithm::Aes256Gcm, Algorithm::ChaCha20Poly1305];

    #[test]
    fn test_seal_open_each_algorithm() {
        let key = SymmetricKey::generate();
        for algorithm in ALGORITHMS {
            let sealed = algorithm.seal(&key, b"backup block").unwrap();
            assert_eq!(sealed.len(), b"backup block".len() + SEAL_OVERHEAD);
            let opened = algorithm.open(&key, &sealed).unwrap();
            assert_eq!(opened, b"backup block");
        }
    }

    #[test]
    fn test_seal_empty_plaintext() {
        let key = SymmetricKey::generate();
        let sealed = Algorithm::Aes256Gcm.seal(&key, b"").unwrap();
        assert_eq!(sealed.len(), SEAL_OVERHEAD);
        assert!(Algorithm::Aes256Gcm.open(&key, &sealed).unwrap().is_empty());
    }

    #[test]
    fn test_nonce_is_fresh_per_seal() {
        let key = SymmetricKey::generate();
        let a = Algorithm::ChaCha20Poly1305.seal(&key, b"same").unwrap();
        let b = Algorithm::ChaCha20Poly1305.seal(&key, b"same").unwrap();
        assert_ne!(a[..NONCE_LENGTH], b[..NONCE_LENGTH]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let sealed = Algorithm::Aes256Gcm
            .seal(&SymmetricKey::generate(), b"secret")
            .unwrap();
        let result = Algorithm::Aes256Gcm.open(&SymmetricKey::generate(), &sealed);
        assert!(matches!(result, Err(EnvelopeError::Decryption(_))));
    }

    #[test]
    fn test_open_tampered_ciphertext_fails() {
        let key = SymmetricKey::generate();
        for algorithm in ALGORITHMS {
            let mut sealed = algorithm.seal(&key, b"do not touch").unwrap();
            let last = sealed.len() - 1;
            sealed[last] ^= 0x01;
            assert!(matches!(
                algorithm.open(&key, &sealed),
                Err(EnvelopeError::Decryption(_))
            ));
        }
    }

    #[test]
    fn test_open_with_other_algorithm_fails() {
        let key = SymmetricKey::generate();
        let sealed = Algorithm::Aes256Gcm.seal(&key, b"payload").unwrap();
        assert!(Algorithm::ChaCha20Poly1305.open(&key, &sealed).is_err());
    }

    #[test]
    fn test_open_short_buffer() {
        let key = SymmetricKey::generate();
        let result = Algorithm::Aes256Gcm.open(&key, &[0u8; SEAL_OVERHEAD - 1]);
        assert!(matches!(result, Err(EnvelopeError::MalformedFrame(_))));
    }

    #[test]
    fn test_algorithm_serialization() {
        assert_eq!(
            serde_json::to_string(&Algorithm::Aes256Gcm).unwrap(),
            "\"aes256\""
        );
        assert_eq!(
            serde_json::to_string(&Algorithm::ChaCha20Poly1305).unwrap(),
            "\"chachapoly\""
        );
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("aes256".parse::<Algorithm>().unwrap(), Algorithm::Aes256Gcm);
        assert_eq!(
            "ChaChaPoly".parse::<Algorithm>().unwrap(),
            Algorithm::ChaCha20Poly1305
        );
        assert!(matches!(
            "rot13".parse::<Algorithm>(),
            Err(EnvelopeError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_default_algorithm_is_aes() {
        assert_eq!(Algorithm::default(), Algorithm::Aes256Gcm);
    }
}
