//! Error types for the envelope crate.

use thiserror::Error;

/// Envelope error type covering framing, metadata and AEAD failures.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    // Serialization errors
    /// Failed to serialize frame metadata.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize frame metadata.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    // Frame errors
    /// The buffer does not hold a well-formed frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Metadata block exceeds the allowed size.
    #[error("metadata too large: {size} bytes exceeds maximum of {max} bytes")]
    MetadataTooLarge {
        /// Declared or actual metadata size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The frame names an algorithm this build cannot open.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The frame carries a format version this build cannot read.
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(String),

    // Cryptographic errors
    /// Encryption operation failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption or authentication failed.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Key bytes were the wrong length or badly encoded.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// No key could be obtained for the requested file.
    #[error("key unavailable: {0}")]
    KeyUnavailable(String),
}

/// Result type alias for envelope operations.
pub type Result<T> = std::result::Result<T, EnvelopeError>;

impl From<serde_json::Error> for EnvelopeError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            EnvelopeError::Deserialization(err.to_string())
        } else {
            EnvelopeError::Serialization(err.to_string())
        }
    }
}

impl From<hex::FromHexError> for EnvelopeError {
    fn from(err: hex::FromHexError) -> Self {
        EnvelopeError::InvalidKey(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_frame_display() {
        let err = EnvelopeError::MalformedFrame("buffer too short".to_string());
        assert_eq!(err.to_string(), "malformed frame: buffer too short");
    }

    #[test]
    fn test_metadata_too_large_display() {
        let err = EnvelopeError::MetadataTooLarge { size: 70000, max: 65536 };
        assert_eq!(
            err.to_string(),
            "metadata too large: 70000 bytes exceeds maximum of 65536 bytes"
        );
    }

    #[test]
    fn test_decryption_error_display() {
        let err = EnvelopeError::Decryption("authentication tag mismatch".to_string());
        assert_eq!(
            err.to_string(),
            "decryption failed: authentication tag mismatch"
        );
    }

    #[test]
    fn test_from_serde_json_syntax_error() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let converted = EnvelopeError::from(err);
        assert!(matches!(converted, EnvelopeError::Deserialization(_)));
    }

    #[test]
    fn test_from_hex_error() {
        let err = hex::decode("zz").unwrap_err();
        let converted = EnvelopeError::from(err);
        assert!(matches!(converted, EnvelopeError::InvalidKey(_)));
    }
}
