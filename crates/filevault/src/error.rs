//! Error types shared by every file-system component.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur during file-system operations.
///
/// Every variant that relates to a location carries the path the caller asked
/// for (or its sandbox-validated form). Variants backed by an OS failure keep
/// the original [`io::Error`] as their source.
#[derive(Debug, Error)]
pub enum FsError {
    /// The requested path does not exist.
    #[error("path does not exist: {}", .path.display())]
    NotFound {
        /// Missing path.
        path: PathBuf,
    },

    /// The requested path is not a directory.
    #[error("path is not a directory: {}", .path.display())]
    NotADirectory {
        /// Offending path.
        path: PathBuf,
    },

    /// The target already exists and overwriting was not requested.
    #[error("path already exists: {}", .path.display())]
    AlreadyExists {
        /// Existing path.
        path: PathBuf,
    },

    /// The path lies outside the sandbox boundary.
    #[error("access denied for {}: {reason}", .path.display())]
    AccessDenied {
        /// Rejected path.
        path: PathBuf,
        /// Why the path was rejected.
        reason: String,
    },

    /// Reading from the file system failed.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// Path being read.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Writing to the file system failed.
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        /// Path being written.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Querying or updating POSIX metadata failed.
    #[error("metadata operation failed for {}: {reason}", .path.display())]
    Metadata {
        /// Path whose metadata was accessed.
        path: PathBuf,
        /// Human-readable failure reason.
        reason: String,
        /// Underlying OS error, when there is one.
        #[source]
        source: Option<io::Error>,
    },

    /// An extended-attribute syscall failed.
    #[error("extended attribute '{attribute}' on {}: {reason}", .path.display())]
    ExtendedAttribute {
        /// Path carrying the attribute.
        path: PathBuf,
        /// Attribute name, empty for list operations.
        attribute: String,
        /// OS error string.
        reason: String,
    },

    /// A cryptographic or integrity operation failed.
    #[error("security failure for {}: {reason}", .path.display())]
    Security {
        /// Path being sealed, opened or verified.
        path: PathBuf,
        /// Human-readable failure reason.
        reason: String,
    },

    /// Text could not be represented in the requested encoding.
    #[error("cannot encode text for {}: {reason}", .path.display())]
    Encoding {
        /// Destination path.
        path: PathBuf,
        /// Human-readable failure reason.
        reason: String,
    },

    /// File contents are not valid in the requested encoding.
    #[error("cannot decode {}: {reason}", .path.display())]
    Decoding {
        /// Source path.
        path: PathBuf,
        /// Human-readable failure reason.
        reason: String,
    },

    /// Unexpected internal failure (for example a panicked worker).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for file-system operations.
pub type FsResult<T> = std::result::Result<T, FsError>;

impl FsError {
    /// Map an I/O error raised while reading `path`.
    pub fn read(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::NotADirectory => FsError::NotADirectory {
                path: path.to_path_buf(),
            },
            _ => FsError::Read {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Map an I/O error raised while writing `path`.
    pub fn write(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists {
                path: path.to_path_buf(),
            },
            io::ErrorKind::NotADirectory => FsError::NotADirectory {
                path: path.to_path_buf(),
            },
            _ => FsError::Write {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Map an I/O error raised while accessing metadata of `path`.
    pub fn metadata(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            return FsError::NotFound {
                path: path.to_path_buf(),
            };
        }
        FsError::Metadata {
            path: path.to_path_buf(),
            reason: err.to_string(),
            source: Some(err),
        }
    }

    /// Build a security error for `path`.
    pub fn security(path: &Path, reason: impl ToString) -> Self {
        FsError::Security {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// The path this error refers to, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            FsError::NotFound { path }
            | FsError::NotADirectory { path }
            | FsError::AlreadyExists { path }
            | FsError::AccessDenied { path, .. }
            | FsError::Read { path, .. }
            | FsError::Write { path, .. }
            | FsError::Metadata { path, .. }
            | FsError::ExtendedAttribute { path, .. }
            | FsError::Security { path, .. }
            | FsError::Encoding { path, .. }
            | FsError::Decoding { path, .. } => Some(path),
            FsError::Internal(_) => None,
        }
    }

    /// Short machine-friendly name of the error kind, used in audit context.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FsError::NotFound { .. } => "not_found",
            FsError::NotADirectory { .. } => "not_a_directory",
            FsError::AlreadyExists { .. } => "already_exists",
            FsError::AccessDenied { .. } => "access_denied",
            FsError::Read { .. } => "read_error",
            FsError::Write { .. } => "write_error",
            FsError::Metadata { .. } => "metadata_error",
            FsError::ExtendedAttribute { .. } => "extended_attribute_error",
            FsError::Security { .. } => "security_error",
            FsError::Encoding { .. } => "encoding_error",
            FsError::Decoding { .. } => "decoding_error",
            FsError::Internal(_) => "internal_error",
        }
    }
}

impl From<tokio::task::JoinError> for FsError {
    fn from(err: tokio::task::JoinError) -> Self {
        FsError::Internal(format!("blocking worker failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_not_found_display() {
        let err = FsError::NotFound {
            path: PathBuf::from("/data/missing.bin"),
        };
        assert_eq!(err.to_string(), "path does not exist: /data/missing.bin");
    }

    #[test]
    fn test_access_denied_display() {
        let err = FsError::AccessDenied {
            path: PathBuf::from("/etc/passwd"),
            reason: "outside sandbox root /sandbox".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "access denied for /etc/passwd: outside sandbox root /sandbox"
        );
    }

    #[test]
    fn test_read_maps_not_found() {
        let err = FsError::read(
            Path::new("/x"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, FsError::NotFound { .. }));
    }

    #[test]
    fn test_write_maps_already_exists() {
        let err = FsError::write(
            Path::new("/x"),
            io::Error::new(io::ErrorKind::AlreadyExists, "exists"),
        );
        assert!(matches!(err, FsError::AlreadyExists { .. }));
    }

    #[test]
    fn test_write_preserves_os_error() {
        let err = FsError::write(
            Path::new("/x"),
            io::Error::new(io::ErrorKind::PermissionDenied, "read-only fs"),
        );
        assert!(matches!(err, FsError::Write { .. }));
        assert_eq!(err.source().unwrap().to_string(), "read-only fs");
    }

    #[test]
    fn test_metadata_keeps_source() {
        let err = FsError::metadata(
            Path::new("/x"),
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(err.source().is_some());
        assert_eq!(err.kind_name(), "metadata_error");
    }

    #[test]
    fn test_path_accessor() {
        let err = FsError::security(Path::new("/vault/a"), "tag mismatch");
        assert_eq!(err.path(), Some(Path::new("/vault/a")));
        assert!(FsError::Internal("boom".to_string()).path().is_none());
    }
}
