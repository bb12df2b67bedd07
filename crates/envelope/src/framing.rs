//! On-disk layout of a sealed file.
//!
//! # Frame Format
//!
//! Each sealed file consists of:
//! - 4 bytes: metadata length (little-endian u32)
//! - N bytes: metadata, a JSON object `{"algorithm": "...", "version": "1.0"}`
//! - M bytes: AEAD combined output (nonce || ciphertext || tag)
//!
//! The layout is shared with other tools reading the same repository, so it
//! must stay byte-for-byte stable.

use serde::{Deserialize, Serialize};

use crate::cipher::Algorithm;
use crate::error::{EnvelopeError, Result};
use crate::key::SymmetricKey;

/// Current frame format version.
pub const FORMAT_VERSION: &str = "1.0";

/// Size of the metadata length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Upper bound for the metadata block. Real metadata is a few dozen bytes.
pub const MAX_METADATA_SIZE: usize = 64 * 1024;

/// Metadata record stored in front of the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Algorithm used to seal the payload.
    pub algorithm: Algorithm,
    /// Frame format version.
    pub version: String,
}

impl FrameMetadata {
    /// Create metadata for the current format version.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            version: FORMAT_VERSION.to_string(),
        }
    }
}

/// A sealed payload together with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFrame {
    /// Metadata describing how the payload was sealed.
    pub metadata: FrameMetadata,
    /// AEAD combined output.
    pub ciphertext: Vec<u8>,
}

impl EncryptedFrame {
    /// Seal `plaintext` with `algorithm` under `key`.
    pub fn seal(algorithm: Algorithm, key: &SymmetricKey, plaintext: &[u8]) -> Result<Self> {
        let ciphertext = algorithm.seal(key, plaintext)?;
        Ok(Self {
            metadata: FrameMetadata::new(algorithm),
            ciphertext,
        })
    }

    /// Open the frame with `key`, verifying the authentication tag.
    pub fn open(&self, key: &SymmetricKey) -> Result<Vec<u8>> {
        self.metadata.algorithm.open(key, &self.ciphertext)
    }

    /// Encode the frame into its on-disk byte layout.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let metadata = serde_json::to_vec(&self.metadata)?;
        if metadata.len() > MAX_METADATA_SIZE {
            return Err(EnvelopeError::MetadataTooLarge {
                size: metadata.len(),
                max: MAX_METADATA_SIZE,
            });
        }

        let mut output =
            Vec::with_capacity(LENGTH_PREFIX_SIZE + metadata.len() + self.ciphertext.len());

        // Length (little-endian u32)
        output.extend_from_slice(&(metadata.len() as u32).to_le_bytes());

        // Metadata
        output.extend_from_slice(&metadata);

        // Sealed payload
        output.extend_from_slice(&self.ciphertext);

        Ok(output)
    }

    /// Decode a frame from its on-disk byte layout.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < LENGTH_PREFIX_SIZE {
            return Err(EnvelopeError::MalformedFrame(format!(
                "insufficient data for length prefix: need {} bytes, have {}",
                LENGTH_PREFIX_SIZE,
                data.len()
            )));
        }

        let (prefix, rest) = data.split_at(LENGTH_PREFIX_SIZE);
        let mut length_bytes = [0u8; LENGTH_PREFIX_SIZE];
        length_bytes.copy_from_slice(prefix);
        let metadata_len = u32::from_le_bytes(length_bytes) as usize;

        if metadata_len > MAX_METADATA_SIZE {
            return Err(EnvelopeError::MetadataTooLarge {
                size: metadata_len,
                max: MAX_METADATA_SIZE,
            });
        }

        if rest.len() < metadata_len {
            return Err(EnvelopeError::MalformedFrame(format!(
                "declared metadata length {} exceeds remaining {} bytes",
                metadata_len,
                rest.len()
            )));
        }

        let (metadata_bytes, ciphertext) = rest.split_at(metadata_len);
        let metadata: FrameMetadata = serde_json::from_slice(metadata_bytes)?;

        if metadata.version != FORMAT_VERSION {
            return Err(EnvelopeError::UnsupportedVersion(metadata.version));
        }

        Ok(Self {
            metadata,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::SEAL_OVERHEAD;

    #[test]
    fn test_encode_layout_is_exact() {
        let frame = EncryptedFrame {
            metadata: FrameMetadata::new(Algorithm::Aes256Gcm),
            ciphertext: vec![0xde, 0xad],
        };
        let encoded = frame.encode().unwrap();

        let metadata_json = br#"{"algorithm":"aes256","version":"1.0"}"#;
        assert_eq!(
            &encoded[..4],
            &(metadata_json.len() as u32).to_le_bytes()
        );
        assert_eq!(&encoded[4..4 + metadata_json.len()], metadata_json);
        assert_eq!(&encoded[4 + metadata_json.len()..], &[0xde, 0xad]);
    }

    #[test]
    fn test_chachapoly_metadata_id() {
        let frame = EncryptedFrame {
            metadata: FrameMetadata::new(Algorithm::ChaCha20Poly1305),
            ciphertext: Vec::new(),
        };
        let encoded = frame.encode().unwrap();
        let text = String::from_utf8_lossy(&encoded[4..]);
        assert!(text.contains("\"chachapoly\""));
    }

    #[test]
    fn test_seal_encode_decode_open() {
        let key = SymmetricKey::generate();
        let frame = EncryptedFrame::seal(Algorithm::ChaCha20Poly1305, &key, b"snapshot").unwrap();
        let decoded = EncryptedFrame::decode(&frame.encode().unwrap()).unwrap();

        assert_eq!(decoded, frame);
        assert_eq!(decoded.ciphertext.len(), b"snapshot".len() + SEAL_OVERHEAD);
        assert_eq!(decoded.open(&key).unwrap(), b"snapshot");
    }

    #[test]
    fn test_decode_too_short_for_prefix() {
        let result = EncryptedFrame::decode(&[1, 0]);
        assert!(matches!(result, Err(EnvelopeError::MalformedFrame(_))));
    }

    #[test]
    fn test_decode_declared_length_exceeds_buffer() {
        let mut data = 100u32.to_le_bytes().to_vec();
        data.extend_from_slice(b"{}");
        let result = EncryptedFrame::decode(&data);
        assert!(matches!(result, Err(EnvelopeError::MalformedFrame(_))));
    }

    #[test]
    fn test_decode_oversized_metadata_length() {
        let data = u32::MAX.to_le_bytes();
        let result = EncryptedFrame::decode(&data);
        assert!(matches!(result, Err(EnvelopeError::MetadataTooLarge { .. })));
    }

    #[test]
    fn test_decode_invalid_metadata_json() {
        let mut data = 3u32.to_le_bytes().to_vec();
        data.extend_from_slice(b"abc");
        let result = EncryptedFrame::decode(&data);
        assert!(matches!(result, Err(EnvelopeError::Deserialization(_))));
    }

    #[test]
    fn test_decode_unknown_algorithm() {
        let metadata = br#"{"algorithm":"des","version":"1.0"}"#;
        let mut data = (metadata.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(metadata);
        assert!(EncryptedFrame::decode(&data).is_err());
    }

    #[test]
    fn test_decode_unsupported_version() {
        let metadata = br#"{"algorithm":"aes256","version":"2.0"}"#;
        let mut data = (metadata.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(metadata);
        let result = EncryptedFrame::decode(&data);
        assert!(matches!(result, Err(EnvelopeError::UnsupportedVersion(v)) if v == "2.0"));
    }

    #[test]
    fn test_decode_ignores_extra_metadata_fields() {
        let metadata = br#"{"algorithm":"aes256","version":"1.0","created":"2024-01-01"}"#;
        let mut data = (metadata.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(metadata);
        data.extend_from_slice(&[9, 9, 9]);

        let frame = EncryptedFrame::decode(&data).unwrap();
        assert_eq!(frame.metadata.algorithm, Algorithm::Aes256Gcm);
        assert_eq!(frame.ciphertext, vec![9, 9, 9]);
    }
}
