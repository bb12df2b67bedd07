//! # FileVault Envelope Library
//!
//! This crate defines the sealed-file format and the cryptographic primitives
//! used by the FileVault secure storage layer.
//!
//! ## Overview
//!
//! - **Frame Format**: length-prefixed JSON metadata followed by AEAD output
//! - **Ciphers**: AES-256-GCM and ChaCha20-Poly1305 with per-seal random nonces
//! - **Key Material**: zeroizing 256-bit keys and a [`KeyProvider`] seam for
//!   external key management
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  u32 LE metadata length                 │  4 bytes
//! ├─────────────────────────────────────────┤
//! │  {"algorithm": ..., "version": "1.0"}   │  JSON
//! ├─────────────────────────────────────────┤
//! │  nonce || ciphertext || tag             │  AES-256-GCM / ChaCha20-Poly1305
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use envelope::{Algorithm, EncryptedFrame, SymmetricKey};
//!
//! let key = SymmetricKey::generate();
//! let frame = EncryptedFrame::seal(Algorithm::Aes256Gcm, &key, b"hello").unwrap();
//! let bytes = frame.encode().unwrap();
//!
//! let decoded = EncryptedFrame::decode(&bytes).unwrap();
//! assert_eq!(decoded.open(&key).unwrap(), b"hello");
//! ```
//!
//! ## Modules
//!
//! - [`cipher`]: AEAD algorithm selection, seal and open
//! - [`framing`]: On-disk frame encode/decode
//! - [`key`]: Symmetric keys and key providers
//! - [`error`]: Error types

pub mod cipher;
pub mod error;
pub mod framing;
pub mod key;

pub use cipher::{Algorithm, NONCE_LENGTH, SEAL_OVERHEAD, TAG_LENGTH};
pub use error::{EnvelopeError, Result};
pub use framing::{
    EncryptedFrame, FrameMetadata, FORMAT_VERSION, LENGTH_PREFIX_SIZE, MAX_METADATA_SIZE,
};
pub use key::{KeyProvider, StaticKeyProvider, SymmetricKey, KEY_LENGTH};
