//! Path confinement.
//!
//! [`SandboxGuard`] resolves every caller path to its canonical form and checks
//! it against an optional root directory. Paths that do not exist yet are
//! resolved through their deepest existing ancestor so creations are confined
//! too. The process temporary directory is always reachable, since secure temp
//! files are created there.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::audit::{noop_sink, AuditEvent, AuditLevel, SharedAuditSink};
use crate::error::{FsError, FsResult};

/// Validates paths against an optional root boundary.
#[derive(Clone)]
pub struct SandboxGuard {
    /// Canonical root, `None` when unrestricted.
    root: Option<PathBuf>,
    /// Canonical process temp directory.
    temp_root: Option<PathBuf>,
    audit: SharedAuditSink,
}

impl fmt::Debug for SandboxGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxGuard")
            .field("root", &self.root)
            .field("temp_root", &self.temp_root)
            .finish_non_exhaustive()
    }
}

impl SandboxGuard {
    /// Create a guard confined to `root`, or unrestricted when `root` is `None`.
    ///
    /// The root is canonicalised once here and never changes afterwards.
    pub fn new(root: Option<PathBuf>, audit: SharedAuditSink) -> FsResult<Self> {
        let root = match root {
            Some(root) => {
                let canonical = fs::canonicalize(&root).map_err(|e| FsError::read(&root, e))?;
                if !canonical.is_dir() {
                    return Err(FsError::NotADirectory { path: root });
                }
                Some(canonical)
            }
            None => None,
        };

        Ok(Self {
            root,
            temp_root: fs::canonicalize(std::env::temp_dir()).ok(),
            audit,
        })
    }

    /// A guard that accepts every path.
    pub fn unrestricted() -> Self {
        Self {
            root: None,
            temp_root: None,
            audit: noop_sink(),
        }
    }

    /// The canonical root, if one is configured.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// The audit sink shared with the components using this guard.
    pub fn audit(&self) -> &SharedAuditSink {
        &self.audit
    }

    /// Validate `path` and return the form operations must use.
    ///
    /// Without a root the path is returned unchanged. With a root, relative
    /// paths are taken relative to it and the result is canonical.
    pub fn validate(&self, path: &Path) -> FsResult<PathBuf> {
        let Some(root) = &self.root else {
            return Ok(path.to_path_buf());
        };

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };

        let resolved = resolve(&absolute)
            .map_err(|e| self.deny(path, format!("cannot resolve path: {}", e)))?;

        if resolved.starts_with(root) {
            return Ok(resolved);
        }
        if let Some(temp_root) = &self.temp_root {
            if resolved.starts_with(temp_root) {
                return Ok(resolved);
            }
        }

        Err(self.deny(path, format!("outside sandbox root {}", root.display())))
    }

    fn deny(&self, path: &Path, reason: String) -> FsError {
        warn!(path = %path.display(), reason = %reason, "sandbox violation");
        self.audit.record(
            &AuditEvent::new(AuditLevel::Warning, "sandbox violation")
                .with("path", path.display())
                .with("reason", &reason),
        );
        FsError::AccessDenied {
            path: path.to_path_buf(),
            reason,
        }
    }
}

/// Canonicalise the deepest existing ancestor of `path` and append the
/// remaining components lexically.
fn resolve(path: &Path) -> io::Result<PathBuf> {
    let components: Vec<Component<'_>> = path.components().collect();

    for split in (1..=components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        match fs::canonicalize(&prefix) {
            Ok(mut resolved) => {
                for component in &components[split..] {
                    match component {
                        Component::Normal(name) => resolved.push(name),
                        Component::ParentDir => {
                            resolved.pop();
                        }
                        Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
                    }
                }
                return Ok(resolved);
            }
            Err(e)
                if e.kind() == io::ErrorKind::NotFound
                    || e.kind() == io::ErrorKind::NotADirectory =>
            {
                // A link whose target is missing would be followed by the
                // eventual write, so its destination cannot be checked.
                if fs::symlink_metadata(&prefix).is_ok_and(|m| m.file_type().is_symlink()) {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("dangling symbolic link {}", prefix.display()),
                    ));
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(io::ErrorKind::NotFound, "no existing ancestor"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use std::os::unix::fs::symlink;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn guard(root: &Path) -> SandboxGuard {
        SandboxGuard::new(Some(root.to_path_buf()), noop_sink()).unwrap()
    }

    #[test]
    fn test_unrestricted_returns_path_unchanged() {
        let guard = SandboxGuard::unrestricted();
        let path = Path::new("relative/../odd/./path");
        assert_eq!(guard.validate(path).unwrap(), path);
    }

    #[test]
    fn test_missing_root_fails() {
        let result = SandboxGuard::new(
            Some(PathBuf::from("/nonexistent-filevault-root")),
            noop_sink(),
        );
        assert!(matches!(result, Err(FsError::NotFound { .. })));
    }

    #[test]
    fn test_existing_path_inside_root() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("file.txt"), "Hello").unwrap();
        let guard = guard(temp_dir.path());

        let validated = guard.validate(&temp_dir.path().join("file.txt")).unwrap();
        assert_eq!(validated, guard.root().unwrap().join("file.txt"));
    }

    #[test]
    fn test_relative_path_resolves_against_root() {
        let temp_dir = TempDir::new().unwrap();
        let guard = guard(temp_dir.path());

        let validated = guard.validate(Path::new("a.txt")).unwrap();
        assert_eq!(validated, guard.root().unwrap().join("a.txt"));
    }

    #[test]
    fn test_root_itself_is_accepted() {
        let temp_dir = TempDir::new().unwrap();
        let guard = guard(temp_dir.path());
        assert_eq!(guard.validate(temp_dir.path()).unwrap(), guard.root().unwrap());
    }

    #[test]
    fn test_missing_tail_is_appended() {
        let temp_dir = TempDir::new().unwrap();
        let guard = guard(temp_dir.path());

        let validated = guard
            .validate(&temp_dir.path().join("new/./dir/../file.txt"))
            .unwrap();
        assert_eq!(validated, guard.root().unwrap().join("new/file.txt"));
    }

    #[test]
    fn test_absolute_path_outside_root_denied() {
        let temp_dir = TempDir::new().unwrap();
        let guard = guard(temp_dir.path());

        let result = guard.validate(Path::new("/etc/passwd"));
        assert!(matches!(result, Err(FsError::AccessDenied { .. })));
    }

    #[test]
    fn test_parent_traversal_denied() {
        let temp_dir = TempDir::new().unwrap();
        let guard = guard(temp_dir.path());

        let sneaky = temp_dir.path().join("../../../../../../etc/passwd");
        assert!(matches!(
            guard.validate(&sneaky),
            Err(FsError::AccessDenied { .. })
        ));

        let relative = Path::new("../../../../../../etc/shadow-missing");
        assert!(matches!(
            guard.validate(relative),
            Err(FsError::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_symlink_escape_denied() {
        let temp_dir = TempDir::new().unwrap();
        symlink("/etc", temp_dir.path().join("escape")).unwrap();
        let guard = guard(temp_dir.path());

        let result = guard.validate(&temp_dir.path().join("escape/passwd"));
        assert!(matches!(result, Err(FsError::AccessDenied { .. })));

        // A link that stays inside the root is fine.
        fs::create_dir(temp_dir.path().join("real")).unwrap();
        symlink(temp_dir.path().join("real"), temp_dir.path().join("inner")).unwrap();
        let validated = guard.validate(&temp_dir.path().join("inner/x.txt")).unwrap();
        assert_eq!(validated, guard.root().unwrap().join("real/x.txt"));
    }

    #[test]
    fn test_traversal_through_missing_directories() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("real")).unwrap();
        symlink(temp_dir.path().join("real"), temp_dir.path().join("inner")).unwrap();
        let guard = guard(temp_dir.path());

        // `..` after a missing component climbs lexically, past the root too.
        let result = guard.validate(
            &temp_dir
                .path()
                .join("missing/deeper/../../../../../../../../../../etc/outside.txt"),
        );
        assert!(matches!(result, Err(FsError::AccessDenied { .. })));

        // The link is resolved before the missing tail is applied.
        let validated = guard
            .validate(&temp_dir.path().join("inner/new/../file.txt"))
            .unwrap();
        assert_eq!(validated, guard.root().unwrap().join("real/file.txt"));
    }

    #[test]
    fn test_dangling_symlink_denied() {
        let temp_dir = TempDir::new().unwrap();
        symlink(
            "/nonexistent-filevault-target/file",
            temp_dir.path().join("dangling"),
        )
        .unwrap();
        let guard = guard(temp_dir.path());

        let result = guard.validate(&temp_dir.path().join("dangling"));
        assert!(matches!(result, Err(FsError::AccessDenied { .. })));
    }

    #[test]
    fn test_temp_directory_always_allowed() {
        // Root outside the temp directory still admits temp paths.
        if Path::new("/etc").is_dir() && !std::env::temp_dir().starts_with("/etc") {
            let guard = SandboxGuard::new(Some(PathBuf::from("/etc")), noop_sink()).unwrap();
            assert!(guard.validate(&std::env::temp_dir().join("scratch")).is_ok());
            assert!(matches!(
                guard.validate(Path::new("/nonexistent-filevault-root/a.txt")),
                Err(FsError::AccessDenied { .. })
            ));
        }
    }

    #[test]
    fn test_violation_is_audited_at_warning() {
        let temp_dir = TempDir::new().unwrap();
        let sink = MemoryAuditSink::new();
        let guard =
            SandboxGuard::new(Some(temp_dir.path().to_path_buf()), Arc::new(sink.clone())).unwrap();

        let _ = guard.validate(Path::new("/etc/passwd"));

        let events = sink.events_at_least(AuditLevel::Warning);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get("path"), Some("/etc/passwd"));
    }
}
