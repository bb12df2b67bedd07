//! Mutating operations: writes, directory creation, deletion, moves and copies.
//!
//! Atomic writes go to a hidden temp file next to the target, are synced, and
//! then renamed into place, so a crash never leaves a half-written target.
//! Moves and copies with `overwrite` remove the destination first and then run
//! the OS primitive; the two steps are not atomic together.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::attributes::{apply_changes, read_attributes, set_mode};
use super::{ComponentCore, SandboxGuard};
use crate::error::{FsError, FsResult};
use crate::types::{AttributeChanges, FileOperationResult, TextEncoding, WriteOptions};

/// Prefix of the sibling temp files used by atomic writes.
const TEMP_PREFIX: &str = ".filevault-";

/// Creates, writes, moves, copies and deletes files inside the sandbox.
#[derive(Debug)]
pub struct FileWriter {
    core: ComponentCore,
}

impl FileWriter {
    pub fn new(guard: SandboxGuard) -> Self {
        Self {
            core: ComponentCore::new("writer", guard),
        }
    }

    /// Create an empty file, following the same rules as [`write_file`](Self::write_file).
    pub async fn create_file(
        &self,
        path: impl AsRef<Path>,
        options: WriteOptions,
    ) -> FsResult<FileOperationResult> {
        self.write_file(Vec::new(), path, options).await
    }

    /// Write `data` to `path`.
    ///
    /// Fails with `AlreadyExists` when the target exists and
    /// `options.overwrite` is false, and with `NotFound` when the parent is
    /// missing and `options.create_parent_directories` is false.
    pub async fn write_file(
        &self,
        data: impl AsRef<[u8]>,
        path: impl AsRef<Path>,
        options: WriteOptions,
    ) -> FsResult<FileOperationResult> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        let data = data.as_ref().to_vec();
        self.core
            .run("write_file", &requested, move |guard| {
                let path = guard.validate(&target)?;
                write_bytes(&path, &data, &options)?;
                Ok(completed(path))
            })
            .await
    }

    /// Encode `text` and write it to `path`.
    pub async fn write_string(
        &self,
        text: &str,
        path: impl AsRef<Path>,
        encoding: TextEncoding,
        options: WriteOptions,
    ) -> FsResult<FileOperationResult> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        let text = text.to_string();
        self.core
            .run("write_string", &requested, move |guard| {
                let path = guard.validate(&target)?;
                let data = encoding.encode(&text).map_err(|reason| FsError::Encoding {
                    path: path.clone(),
                    reason,
                })?;
                write_bytes(&path, &data, &options)?;
                Ok(completed(path))
            })
            .await
    }

    /// Create a directory, and its missing ancestors when `create_intermediate`
    /// is set.
    pub async fn create_directory(
        &self,
        path: impl AsRef<Path>,
        create_intermediate: bool,
        attributes: Option<AttributeChanges>,
    ) -> FsResult<FileOperationResult> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        self.core
            .run("create_directory", &requested, move |guard| {
                let path = guard.validate(&target)?;
                if fs::symlink_metadata(&path).is_ok() {
                    return Err(FsError::AlreadyExists { path });
                }

                let created = if create_intermediate {
                    fs::create_dir_all(&path)
                } else {
                    fs::create_dir(&path)
                };
                created.map_err(|e| FsError::write(&path, e))?;

                if let Some(attributes) = &attributes {
                    apply_changes(&path, attributes)?;
                }
                Ok(completed(path))
            })
            .await
    }

    /// Remove a file, or a directory and everything below it.
    pub async fn delete(&self, path: impl AsRef<Path>) -> FsResult<FileOperationResult> {
        let requested = path.as_ref().to_path_buf();
        let target = requested.clone();
        self.core
            .run("delete", &requested, move |guard| {
                let path = guard.validate(&target)?;
                remove_entry(&path)?;
                Ok(FileOperationResult::succeeded(path, None))
            })
            .await
    }

    /// Move `source` to `destination`, copying across file systems when a
    /// plain rename is impossible.
    pub async fn move_item(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
        options: WriteOptions,
    ) -> FsResult<FileOperationResult> {
        let source = source.as_ref().to_path_buf();
        let requested = destination.as_ref().to_path_buf();
        let destination = requested.clone();
        self.core
            .run("move_item", &requested, move |guard| {
                let (source, destination) = prepare_transfer(guard, &source, &destination, &options)?;

                match fs::rename(&source, &destination) {
                    Ok(()) => {}
                    Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
                        debug!(
                            source = %source.display(),
                            destination = %destination.display(),
                            "cross-device move, copying instead"
                        );
                        copy_entry(&source, &destination)?;
                        remove_entry(&source)?;
                    }
                    Err(e) => return Err(FsError::write(&destination, e)),
                }

                finish_transfer(destination, &options)
            })
            .await
    }

    /// Copy `source` to `destination`. Directories are copied recursively.
    pub async fn copy_item(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
        options: WriteOptions,
    ) -> FsResult<FileOperationResult> {
        let source = source.as_ref().to_path_buf();
        let requested = destination.as_ref().to_path_buf();
        let destination = requested.clone();
        self.core
            .run("copy_item", &requested, move |guard| {
                let (source, destination) = prepare_transfer(guard, &source, &destination, &options)?;
                copy_entry(&source, &destination)?;
                finish_transfer(destination, &options)
            })
            .await
    }
}

fn completed(path: PathBuf) -> FileOperationResult {
    let attributes = read_attributes(&path, false).ok();
    FileOperationResult::succeeded(path, attributes)
}

/// Write `data` to the already validated `path`.
fn write_bytes(path: &Path, data: &[u8], options: &WriteOptions) -> FsResult<()> {
    let parent = parent_dir(path);
    if options.create_parent_directories {
        fs::create_dir_all(parent).map_err(|e| FsError::write(parent, e))?;
    } else {
        fs::metadata(parent).map_err(|e| FsError::write(parent, e))?;
    }

    let existing = fs::symlink_metadata(path).ok();
    if existing.is_some() && !options.overwrite {
        return Err(FsError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }

    if options.atomic_write {
        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".tmp")
            .permissions(fs::Permissions::from_mode(0o666))
            .tempfile_in(parent)
            .map_err(|e| FsError::write(path, e))?;
        temp.write_all(data).map_err(|e| FsError::write(path, e))?;
        temp.as_file().sync_all().map_err(|e| FsError::write(path, e))?;

        if options.overwrite {
            temp.persist(path).map_err(|e| FsError::write(path, e.error))?;
        } else {
            temp.persist_noclobber(path)
                .map_err(|e| FsError::write(path, e.error))?;
        }

        // A replaced file keeps its previous mode.
        if let Some(existing) = existing.filter(|m| m.is_file()) {
            set_mode(path, existing.permissions().mode() & 0o7777)?;
        }
    } else {
        let mut open = OpenOptions::new();
        open.write(true);
        if options.overwrite {
            open.create(true).truncate(true);
        } else {
            open.create_new(true);
        }
        let mut file = open.open(path).map_err(|e| FsError::write(path, e))?;
        file.write_all(data).map_err(|e| FsError::write(path, e))?;
        file.sync_all().map_err(|e| FsError::write(path, e))?;
    }

    if let Some(attributes) = options.attributes.as_ref().filter(|a| !a.is_empty()) {
        apply_changes(path, attributes)?;
    }
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Validate both ends of a move or copy and clear the way at the destination.
fn prepare_transfer(
    guard: &SandboxGuard,
    source: &Path,
    destination: &Path,
    options: &WriteOptions,
) -> FsResult<(PathBuf, PathBuf)> {
    let source = guard.validate(source)?;
    let destination = guard.validate(destination)?;

    let source_metadata = fs::symlink_metadata(&source).map_err(|e| FsError::read(&source, e))?;
    if source == destination {
        return Err(FsError::Write {
            path: destination,
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "source and destination are the same",
            ),
        });
    }
    if source_metadata.is_dir() && destination.starts_with(&source) {
        return Err(FsError::Write {
            path: destination,
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot place a directory inside itself",
            ),
        });
    }
    // Clearing the destination would take the source with it.
    if source.starts_with(&destination) {
        return Err(FsError::Write {
            path: destination,
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "destination contains the source",
            ),
        });
    }

    if options.create_parent_directories {
        let parent = parent_dir(&destination);
        fs::create_dir_all(parent).map_err(|e| FsError::write(parent, e))?;
    }

    if fs::symlink_metadata(&destination).is_ok() {
        if !options.overwrite {
            return Err(FsError::AlreadyExists { path: destination });
        }
        remove_entry(&destination)?;
    }

    Ok((source, destination))
}

fn finish_transfer(destination: PathBuf, options: &WriteOptions) -> FsResult<FileOperationResult> {
    if let Some(attributes) = options.attributes.as_ref().filter(|a| !a.is_empty()) {
        apply_changes(&destination, attributes)?;
    }
    Ok(completed(destination))
}

/// Remove a file, symlink or directory tree.
pub(crate) fn remove_entry(path: &Path) -> FsResult<()> {
    let metadata = fs::symlink_metadata(path).map_err(|e| FsError::write(path, e))?;
    let removed = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| FsError::write(path, e))
}

fn copy_entry(source: &Path, destination: &Path) -> FsResult<()> {
    let metadata = fs::symlink_metadata(source).map_err(|e| FsError::read(source, e))?;
    if metadata.is_dir() {
        copy_tree(source, destination)
    } else if metadata.file_type().is_symlink() {
        copy_link(source, destination)
    } else {
        fs::copy(source, destination)
            .map(|_| ())
            .map_err(|e| FsError::write(destination, e))
    }
}

fn copy_link(source: &Path, destination: &Path) -> FsResult<()> {
    let target = fs::read_link(source).map_err(|e| FsError::read(source, e))?;
    symlink(target, destination).map_err(|e| FsError::write(destination, e))
}

fn copy_tree(source: &Path, destination: &Path) -> FsResult<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| {
            let at = e.path().unwrap_or(source).to_path_buf();
            FsError::read(&at, io::Error::from(e))
        })?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| FsError::Internal(e.to_string()))?;
        let target = destination.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| FsError::write(&target, e))?;
            let mode = entry
                .metadata()
                .map_err(|e| FsError::read(entry.path(), io::Error::from(e)))?
                .permissions()
                .mode();
            set_mode(&target, mode & 0o7777)?;
        } else if file_type.is_symlink() {
            copy_link(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| FsError::write(&target, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::noop_sink;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn writer(root: &Path) -> FileWriter {
        FileWriter::new(SandboxGuard::new(Some(root.to_path_buf()), noop_sink()).unwrap())
    }

    #[tokio::test]
    async fn test_write_file_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        let path = temp_dir.path().join("a.txt");

        let result = writer
            .write_file(b"hello", &path, WriteOptions::default())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.attributes.unwrap().size, 5);
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_write_empty_data() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        let path = temp_dir.path().join("empty.bin");

        writer.create_file(&path, WriteOptions::default()).await.unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"");
    }

    #[tokio::test]
    async fn test_write_without_overwrite_fails_on_existing() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        let path = temp_dir.path().join("a.txt");

        writer.write_file(b"one", &path, WriteOptions::default()).await.unwrap();
        let result = writer.write_file(b"two", &path, WriteOptions::default()).await;
        assert!(matches!(result, Err(FsError::AlreadyExists { .. })));
        assert_eq!(fs::read(&path).unwrap(), b"one");

        let result = writer
            .write_file(b"two", &path, WriteOptions::default().non_atomic())
            .await;
        assert!(matches!(result, Err(FsError::AlreadyExists { .. })));

        writer.write_file(b"two", &path, WriteOptions::overwriting()).await.unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_non_atomic_overwrite_truncates() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, b"a much longer original").unwrap();

        writer
            .write_file(b"short", &path, WriteOptions::overwriting().non_atomic())
            .await
            .unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_overwrite_keeps_mode() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, b"x").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        writer.write_file(b"y", &path, WriteOptions::overwriting()).await.unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o640);
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());

        writer
            .write_file(b"data", temp_dir.path().join("a.txt"), WriteOptions::default())
            .await
            .unwrap();
        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_missing_parent() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        let path = temp_dir.path().join("x/y/a.txt");

        let result = writer.write_file(b"data", &path, WriteOptions::default()).await;
        assert!(matches!(result, Err(FsError::NotFound { .. })));

        writer
            .write_file(b"data", &path, WriteOptions::default().with_parents())
            .await
            .unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_write_applies_attributes() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        let path = temp_dir.path().join("a.txt");

        let result = writer
            .write_file(
                b"data",
                &path,
                WriteOptions::default().with_attributes(AttributeChanges::permissions(0o600)),
            )
            .await
            .unwrap();
        assert_eq!(result.attributes.unwrap().permissions, 0o600);
    }

    #[tokio::test]
    async fn test_write_string_encodes() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        let path = temp_dir.path().join("u16.txt");

        writer
            .write_string("hi", &path, TextEncoding::Utf16Be, WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![0x00, 0x68, 0x00, 0x69]);

        let result = writer
            .write_string(
                "\u{20ac}",
                temp_dir.path().join("bad.txt"),
                TextEncoding::Ascii,
                WriteOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(FsError::Encoding { .. })));
        assert!(!temp_dir.path().join("bad.txt").exists());
    }

    #[tokio::test]
    async fn test_create_directory() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        let nested = temp_dir.path().join("a/b/c");

        let result = writer.create_directory(&nested, false, None).await;
        assert!(matches!(result, Err(FsError::NotFound { .. })));

        writer.create_directory(&nested, true, None).await.unwrap();
        assert!(nested.is_dir());

        let result = writer.create_directory(&nested, true, None).await;
        assert!(matches!(result, Err(FsError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        fs::create_dir_all(temp_dir.path().join("tree/sub")).unwrap();
        fs::write(temp_dir.path().join("tree/sub/f"), b"x").unwrap();
        fs::write(temp_dir.path().join("file"), b"x").unwrap();

        writer.delete(temp_dir.path().join("file")).await.unwrap();
        writer.delete(temp_dir.path().join("tree")).await.unwrap();
        assert!(!temp_dir.path().join("file").exists());
        assert!(!temp_dir.path().join("tree").exists());

        let result = writer.delete(temp_dir.path().join("file")).await;
        assert!(matches!(result, Err(FsError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_move_item() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        let src = temp_dir.path().join("src.txt");
        let dst = temp_dir.path().join("dst.txt");
        fs::write(&src, b"payload").unwrap();
        fs::write(&dst, b"old").unwrap();

        let result = writer.move_item(&src, &dst, WriteOptions::default()).await;
        assert!(matches!(result, Err(FsError::AlreadyExists { .. })));
        assert!(src.exists());

        writer.move_item(&src, &dst, WriteOptions::overwriting()).await.unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_move_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());

        let result = writer
            .move_item(
                temp_dir.path().join("missing"),
                temp_dir.path().join("dst"),
                WriteOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(FsError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_move_onto_itself_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        let path = temp_dir.path().join("same.txt");
        fs::write(&path, b"keep").unwrap();

        let result = writer.move_item(&path, &path, WriteOptions::overwriting()).await;
        assert!(matches!(result, Err(FsError::Write { .. })));
        assert_eq!(fs::read(&path).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn test_transfer_onto_ancestor_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        let outer = temp_dir.path().join("a");
        let inner = outer.join("b");
        fs::create_dir_all(&inner).unwrap();
        fs::write(inner.join("precious.txt"), b"keep").unwrap();

        let moved = writer
            .move_item(&inner, &outer, WriteOptions::overwriting())
            .await;
        assert!(matches!(moved, Err(FsError::Write { .. })));

        let copied = writer
            .copy_item(&inner, &outer, WriteOptions::overwriting())
            .await;
        assert!(matches!(copied, Err(FsError::Write { .. })));

        let file_in_dir = writer
            .move_item(inner.join("precious.txt"), &outer, WriteOptions::overwriting())
            .await;
        assert!(matches!(file_in_dir, Err(FsError::Write { .. })));

        assert_eq!(fs::read(inner.join("precious.txt")).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn test_copy_directory_recursively() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        let src = temp_dir.path().join("src");
        fs::create_dir_all(src.join("inner")).unwrap();
        fs::write(src.join("a.txt"), b"a").unwrap();
        fs::write(src.join("inner/b.txt"), b"b").unwrap();
        symlink("a.txt", src.join("link")).unwrap();

        let dst = temp_dir.path().join("out/copy");
        writer
            .copy_item(&src, &dst, WriteOptions::default().with_parents())
            .await
            .unwrap();

        assert_eq!(fs::read(dst.join("a.txt")).unwrap(), b"a");
        assert_eq!(fs::read(dst.join("inner/b.txt")).unwrap(), b"b");
        assert_eq!(fs::read_link(dst.join("link")).unwrap(), Path::new("a.txt"));
        assert!(src.join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_copy_into_itself_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).unwrap();

        let result = writer
            .copy_item(&src, src.join("nested"), WriteOptions::default())
            .await;
        assert!(matches!(result, Err(FsError::Write { .. })));
    }

    #[tokio::test]
    async fn test_copy_with_overwrite_replaces_destination() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());
        let src = temp_dir.path().join("src.txt");
        let dst = temp_dir.path().join("dst");
        fs::write(&src, b"new").unwrap();
        fs::create_dir(&dst).unwrap();
        fs::write(dst.join("old.txt"), b"old").unwrap();

        writer.copy_item(&src, &dst, WriteOptions::overwriting()).await.unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_writes_outside_sandbox_denied() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer(temp_dir.path());

        let result = writer
            .write_file(b"x", "/nonexistent-filevault-root/a.txt", WriteOptions::default().with_parents())
            .await;
        assert!(matches!(result, Err(FsError::AccessDenied { .. })));
        assert!(!Path::new("/nonexistent-filevault-root").exists());

        let inside = temp_dir.path().join("inside.txt");
        fs::write(&inside, b"x").unwrap();
        let result = writer
            .copy_item(&inside, "/nonexistent-filevault-root/copy", WriteOptions::default())
            .await;
        assert!(matches!(result, Err(FsError::AccessDenied { .. })));
    }

    #[tokio::test]
    async fn test_same_instance_writes_complete_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let writer = Arc::new(writer(temp_dir.path()));
        let path = temp_dir.path().join("ordered.txt");

        let writes = (1..=5).map(|i| {
            let writer = Arc::clone(&writer);
            let path = path.clone();
            async move {
                writer
                    .write_file(i.to_string(), &path, WriteOptions::overwriting())
                    .await
            }
        });
        for result in futures_util::future::join_all(writes).await {
            result.unwrap();
        }

        assert_eq!(fs::read_to_string(&path).unwrap(), "5");
    }
}
