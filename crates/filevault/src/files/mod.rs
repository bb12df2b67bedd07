//! File-system components.
//!
//! This module provides the sandboxed building blocks behind
//! [`FileSystemService`](crate::FileSystemService):
//! - Path confinement ([`SandboxGuard`])
//! - Reads and directory listings ([`FileReader`])
//! - Atomic writes, moves, copies and deletion ([`FileWriter`])
//! - POSIX and extended attributes ([`MetadataManager`])
//! - Sealed storage, secure erasure and integrity checks ([`SecureOperations`])
//!
//! # Security
//!
//! Every call validates its paths through the shared [`SandboxGuard`] before
//! touching the target. Calls on one component instance run one at a time in
//! submission order; separate instances never wait on each other.

use std::future::Future;
use std::path::Path;

use crate::audit::record_outcome;
use crate::error::FsResult;
use crate::mailbox::Mailbox;

mod attributes;
pub mod metadata;
pub mod reader;
pub mod sandbox;
pub mod secure;
pub mod shred;
pub mod writer;
pub mod xattr;

pub use metadata::MetadataManager;
pub use reader::FileReader;
pub use sandbox::SandboxGuard;
pub use secure::SecureOperations;
pub use writer::FileWriter;

/// State every component carries: its guard and its call queue.
#[derive(Debug)]
pub(crate) struct ComponentCore {
    guard: SandboxGuard,
    mailbox: Mailbox,
}

impl ComponentCore {
    pub(crate) fn new(name: &'static str, guard: SandboxGuard) -> Self {
        Self {
            guard,
            mailbox: Mailbox::new(name),
        }
    }

    pub(crate) fn guard(&self) -> &SandboxGuard {
        &self.guard
    }

    /// Run `job` in this component's mailbox without auditing the outcome.
    pub(crate) async fn run_quiet<T, F>(&self, job: F) -> FsResult<T>
    where
        F: FnOnce(&SandboxGuard) -> FsResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.guard.clone();
        self.mailbox.run(move || job(&guard)).await
    }

    /// Run `job` in this component's mailbox and audit the outcome.
    pub(crate) async fn run<T, F>(&self, operation: &'static str, path: &Path, job: F) -> FsResult<T>
    where
        F: FnOnce(&SandboxGuard) -> FsResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let result = self.run_quiet(job).await;
        self.finish(operation, path, &result);
        result
    }

    /// Hold this component's turn while `steps` runs, then audit the outcome.
    ///
    /// `steps` may await other components and use [`blocking`] for its own
    /// OS work.
    pub(crate) async fn sequence<T, F, Fut>(&self, operation: &'static str, path: &Path, steps: F) -> FsResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FsResult<T>>,
    {
        let _turn = self.mailbox.turn().await;
        let result = steps().await;
        self.finish(operation, path, &result);
        result
    }

    fn finish<T>(&self, operation: &'static str, path: &Path, result: &FsResult<T>) {
        match result {
            Ok(_) => tracing::debug!(
                component = self.mailbox.name(),
                operation,
                path = %path.display(),
                "operation completed"
            ),
            Err(e) => tracing::debug!(
                component = self.mailbox.name(),
                operation,
                path = %path.display(),
                error = %e,
                "operation failed"
            ),
        }
        record_outcome(self.guard.audit().as_ref(), operation, path, result);
    }
}

/// Run `job` on the blocking pool. Callers must already hold their turn.
pub(crate) async fn blocking<T, F>(job: F) -> FsResult<T>
where
    F: FnOnce() -> FsResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job).await?
}
