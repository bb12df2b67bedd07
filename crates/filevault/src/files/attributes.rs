//! Synchronous attribute helpers shared by the writer, metadata and secure
//! components. Callers run these inside their mailbox job.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::SystemTime;

use filetime::FileTime;
use nix::unistd::{chown, Gid, Uid};

use super::xattr;
use crate::error::{FsError, FsResult};
use crate::types::{AttributeChanges, FileAttributes};

/// Snapshot the attributes of `path` without following a final symlink.
pub(crate) fn read_attributes(path: &Path, include_extended: bool) -> FsResult<FileAttributes> {
    let metadata = fs::symlink_metadata(path).map_err(|e| FsError::metadata(path, e))?;
    let mut attributes = FileAttributes::from_metadata(&metadata);

    if include_extended {
        attributes.extended_attributes = Some(read_extended(path)?);
    }

    Ok(attributes)
}

fn read_extended(path: &Path) -> FsResult<BTreeMap<String, Vec<u8>>> {
    let names = match xattr::list(path) {
        Ok(names) => names,
        Err(e) if xattr::is_unsupported(&e) => return Ok(BTreeMap::new()),
        Err(e) => return Err(xattr_error(path, "", e)),
    };

    let mut map = BTreeMap::new();
    for name in names {
        let value = xattr::get(path, &name).map_err(|e| xattr_error(path, &name, e))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Apply the `Some` fields of `changes` to `path`.
///
/// Ownership is changed first since `chown` may clear set-id bits, and the
/// mode last so a read-only mode does not block the other updates.
pub(crate) fn apply_changes(path: &Path, changes: &AttributeChanges) -> FsResult<()> {
    if changes.owner.is_some() || changes.group.is_some() {
        chown(
            path,
            changes.owner.map(Uid::from_raw),
            changes.group.map(Gid::from_raw),
        )
        .map_err(|errno| FsError::metadata(path, io::Error::from(errno)))?;
    }

    if let Some(accessed) = changes.accessed {
        filetime::set_file_atime(path, FileTime::from_system_time(accessed))
            .map_err(|e| FsError::metadata(path, e))?;
    }

    if let Some(modified) = changes.modified {
        filetime::set_file_mtime(path, FileTime::from_system_time(modified))
            .map_err(|e| FsError::metadata(path, e))?;
    }

    if let Some(created) = changes.created {
        set_creation_time(path, created)?;
    }

    if let Some(mode) = changes.permissions {
        set_mode(path, mode)?;
    }

    Ok(())
}

/// `chmod` to `mode`.
pub(crate) fn set_mode(path: &Path, mode: u32) -> FsResult<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| FsError::metadata(path, e))
}

#[cfg(target_os = "macos")]
fn set_creation_time(path: &Path, created: SystemTime) -> FsResult<()> {
    use std::fs::{File, FileTimes};
    use std::os::macos::fs::FileTimesExt;

    let file = File::open(path).map_err(|e| FsError::metadata(path, e))?;
    file.set_times(FileTimes::new().set_created(created))
        .map_err(|e| FsError::metadata(path, e))
}

#[cfg(not(target_os = "macos"))]
fn set_creation_time(path: &Path, _created: SystemTime) -> FsResult<()> {
    Err(FsError::Metadata {
        path: path.to_path_buf(),
        reason: "setting the creation time is not supported on this platform".to_string(),
        source: None,
    })
}

pub(crate) fn xattr_error(path: &Path, attribute: &str, err: io::Error) -> FsError {
    FsError::ExtendedAttribute {
        path: path.to_path_buf(),
        attribute: attribute.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    #[test]
    fn test_read_attributes_of_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("f.txt");
        fs::write(&path, b"hello").unwrap();

        let attrs = read_attributes(&path, false).unwrap();
        assert_eq!(attrs.size, 5);
        assert!(attrs.is_file());
        assert!(attrs.modified.is_some());
        assert!(attrs.extended_attributes.is_none());
    }

    #[test]
    fn test_read_attributes_missing() {
        let result = read_attributes(Path::new("/nonexistent-filevault-root/x"), false);
        assert!(matches!(result, Err(FsError::NotFound { .. })));
    }

    #[test]
    fn test_partial_changes_leave_other_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("f.txt");
        fs::write(&path, b"x").unwrap();
        set_mode(&path, 0o640).unwrap();

        let stamp = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        apply_changes(
            &path,
            &AttributeChanges {
                modified: Some(stamp),
                ..Default::default()
            },
        )
        .unwrap();

        let attrs = read_attributes(&path, false).unwrap();
        assert_eq!(attrs.modified, Some(stamp));
        assert_eq!(attrs.permissions, 0o640);
    }

    #[test]
    fn test_mode_applied() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("f.txt");
        fs::write(&path, b"x").unwrap();

        apply_changes(&path, &AttributeChanges::permissions(0o600)).unwrap();
        assert_eq!(read_attributes(&path, false).unwrap().permissions, 0o600);
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_creation_time_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("f.txt");
        fs::write(&path, b"x").unwrap();

        let result = apply_changes(
            &path,
            &AttributeChanges {
                created: Some(UNIX_EPOCH),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(FsError::Metadata { source: None, .. })));
    }
}
