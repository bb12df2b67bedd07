//! Value types passed to and returned from the file-system components.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;

use envelope::{Algorithm, SymmetricKey};
use serde::{Deserialize, Serialize};

/// Kind of file-system entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Other,
}

impl FileKind {
    fn from_metadata(metadata: &Metadata) -> Self {
        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_file() {
            FileKind::Regular
        } else {
            FileKind::Other
        }
    }
}

/// Point-in-time snapshot of a path's metadata.
///
/// Produced fresh by every query and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAttributes {
    /// Size in bytes.
    pub size: u64,
    /// Birth time, when the platform and file system report one.
    pub created: Option<SystemTime>,
    /// Last content modification.
    pub modified: Option<SystemTime>,
    /// Last access.
    pub accessed: Option<SystemTime>,
    /// Entry kind.
    pub kind: FileKind,
    /// Permission bits (`mode & 0o7777`).
    pub permissions: u32,
    /// Owning user id.
    pub owner: u32,
    /// Owning group id.
    pub group: u32,
    /// Extended attributes, only populated when explicitly requested.
    pub extended_attributes: Option<BTreeMap<String, Vec<u8>>>,
}

impl FileAttributes {
    /// Build a snapshot from OS metadata, without extended attributes.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            size: metadata.len(),
            created: metadata.created().ok(),
            modified: metadata.modified().ok(),
            accessed: metadata.accessed().ok(),
            kind: FileKind::from_metadata(metadata),
            permissions: metadata.mode() & 0o7777,
            owner: metadata.uid(),
            group: metadata.gid(),
            extended_attributes: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::Regular
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

/// Partial attribute update. Only `Some` fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeChanges {
    pub permissions: Option<u32>,
    pub owner: Option<u32>,
    pub group: Option<u32>,
    pub created: Option<SystemTime>,
    pub modified: Option<SystemTime>,
    pub accessed: Option<SystemTime>,
}

impl AttributeChanges {
    /// Changes that only set permission bits.
    pub fn permissions(mode: u32) -> Self {
        Self {
            permissions: Some(mode),
            ..Default::default()
        }
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merged_with(mut self, other: &AttributeChanges) -> Self {
        self.permissions = other.permissions.or(self.permissions);
        self.owner = other.owner.or(self.owner);
        self.group = other.group.or(self.group);
        self.created = other.created.or(self.created);
        self.modified = other.modified.or(self.modified);
        self.accessed = other.accessed.or(self.accessed);
        self
    }
}

/// Options for plain writes, copies and moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Replace an existing target instead of failing with `AlreadyExists`.
    pub overwrite: bool,
    /// Create missing parent directories of the target.
    pub create_parent_directories: bool,
    /// Write to a sibling temp file and rename it into place.
    pub atomic_write: bool,
    /// Attributes applied after the write completes.
    pub attributes: Option<AttributeChanges>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            create_parent_directories: false,
            atomic_write: true,
            attributes: None,
        }
    }
}

impl WriteOptions {
    /// Default options with overwriting enabled.
    pub fn overwriting() -> Self {
        Self {
            overwrite: true,
            ..Default::default()
        }
    }

    pub fn with_parents(mut self) -> Self {
        self.create_parent_directories = true;
        self
    }

    pub fn non_atomic(mut self) -> Self {
        self.atomic_write = false;
        self
    }

    pub fn with_attributes(mut self, attributes: AttributeChanges) -> Self {
        self.attributes = Some(attributes);
        self
    }
}

/// Parameters for multi-pass secure deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureDeletionPolicy {
    /// Number of overwrite passes before unlinking.
    pub pass_count: u32,
    /// Overwrite with CSPRNG output instead of the fixed `FF/00/AA` cycle.
    pub use_random_data: bool,
}

impl Default for SecureDeletionPolicy {
    fn default() -> Self {
        Self {
            pass_count: 3,
            use_random_data: true,
        }
    }
}

/// Requested POSIX mode for permission hardening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurePermissions {
    pub mode: u32,
    /// Strip every write bit from `mode` before applying it.
    pub owner_read_only: bool,
}

impl SecurePermissions {
    /// The mode that will actually be applied.
    pub fn effective_mode(&self) -> u32 {
        if self.owner_read_only {
            self.mode & 0o555
        } else {
            self.mode
        }
    }
}

/// Outcome of a completed mutating operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOperationResult {
    pub path: PathBuf,
    pub success: bool,
    /// Snapshot of the target after the operation, when it still exists.
    pub attributes: Option<FileAttributes>,
}

impl FileOperationResult {
    pub fn succeeded(path: PathBuf, attributes: Option<FileAttributes>) -> Self {
        Self {
            path,
            success: true,
            attributes,
        }
    }
}

/// Options for sealed writes.
#[derive(Debug, Clone, Default)]
pub struct SecureWriteOptions {
    pub algorithm: Algorithm,
    /// Explicit key; falls back to the component's key provider when `None`.
    pub key: Option<SymmetricKey>,
    /// Plain write options used for the framed bytes.
    pub write: WriteOptions,
}

/// Options for sealed reads.
#[derive(Debug, Clone, Default)]
pub struct SecureReadOptions {
    /// Explicit key; falls back to the component's key provider when `None`.
    pub key: Option<SymmetricKey>,
}

/// Character encodings supported by the string read/write helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Ascii,
    Latin1,
}

impl TextEncoding {
    /// Encode `text`, failing when a character is not representable.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, String> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            TextEncoding::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            TextEncoding::Ascii => match text.char_indices().find(|(_, c)| !c.is_ascii()) {
                Some((index, c)) => Err(format!("character {:?} at byte {} is not ASCII", c, index)),
                None => Ok(text.as_bytes().to_vec()),
            },
            TextEncoding::Latin1 => text
                .char_indices()
                .map(|(index, c)| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        format!("character {:?} at byte {} is outside Latin-1", c, index)
                    })
                })
                .collect(),
        }
    }

    /// Decode `bytes`, failing on invalid input.
    pub fn decode(self, bytes: &[u8]) -> Result<String, String> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| e.to_string()),
            TextEncoding::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
            TextEncoding::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
            TextEncoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(index) => Err(format!("byte 0x{:02x} at offset {} is not ASCII", bytes[index], index)),
                None => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            },
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String, String> {
    if bytes.len() % 2 != 0 {
        return Err(format!("odd byte length {} for UTF-16", bytes.len()));
    }
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|e| e.to_string())
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
            TextEncoding::Ascii => "ascii",
            TextEncoding::Latin1 => "latin-1",
        };
        f.write_str(name)
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Separators are insignificant: "UTF-16_LE" and "utf16le" are the same name.
        let name: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match name.as_str() {
            "utf8" => Ok(TextEncoding::Utf8),
            "utf16le" => Ok(TextEncoding::Utf16Le),
            "utf16be" => Ok(TextEncoding::Utf16Be),
            "ascii" | "usascii" => Ok(TextEncoding::Ascii),
            "latin1" | "iso88591" => Ok(TextEncoding::Latin1),
            _ => Err(format!("unknown text encoding: {}", s)),
        }
    }
}
