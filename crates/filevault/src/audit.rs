//! Audit trail for file-system operations.
//!
//! Components report every completed operation, failure and sandbox violation
//! to an [`AuditSink`]. The sink is injected at construction. [`NoopAuditSink`]
//! is the default and drops everything; [`TracingAuditSink`] forwards events
//! to `tracing` with their context as structured fields.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::error::{FsError, FsResult};

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    /// Fine-grained detail.
    Debug,
    /// A completed operation.
    Info,
    /// Sandbox violations and swallowed failures.
    Warning,
    /// A failed operation.
    Error,
}

impl fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditLevel::Debug => "debug",
            AuditLevel::Info => "info",
            AuditLevel::Warning => "warning",
            AuditLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    /// Severity.
    pub level: AuditLevel,
    /// Short description.
    pub message: String,
    /// Structured key/value context (operation, path, error kind, ...).
    pub context: Vec<(String, String)>,
}

impl AuditEvent {
    /// Create an event with no context.
    pub fn new(level: AuditLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Attach a context entry.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.push((key.into(), value.to_string()));
        self
    }

    /// Look up a context value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Receiver for audit events.
pub trait AuditSink: Send + Sync {
    /// Record an event. Must not block for long; called from worker threads.
    fn record(&self, event: &AuditEvent);
}

/// Sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

/// Sink that emits events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let context = event
            .context
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");

        match event.level {
            AuditLevel::Debug => tracing::debug!(target: "filevault::audit", %context, "{}", event.message),
            AuditLevel::Info => tracing::info!(target: "filevault::audit", %context, "{}", event.message),
            AuditLevel::Warning => tracing::warn!(target: "filevault::audit", %context, "{}", event.message),
            AuditLevel::Error => tracing::error!(target: "filevault::audit", %context, "{}", event.message),
        }
    }
}

/// Sink that keeps events in memory, for inspection in tests and tooling.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Events at or above `level`.
    pub fn events_at_least(&self, level: AuditLevel) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level >= level)
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Shared handle to an audit sink.
pub type SharedAuditSink = Arc<dyn AuditSink>;

/// The default sink used when callers do not provide one.
pub fn noop_sink() -> SharedAuditSink {
    Arc::new(NoopAuditSink)
}

/// Record the outcome of `operation` on `path`: `Info` on success, `Error`
/// with the error kind and message on failure.
///
/// Sandbox denials are skipped: the guard records them as a `Warning`
/// when it rejects the path.
pub(crate) fn record_outcome<T>(
    sink: &dyn AuditSink,
    operation: &str,
    path: &Path,
    result: &FsResult<T>,
) {
    let event = match result {
        Ok(_) => AuditEvent::new(AuditLevel::Info, format!("{} completed", operation)),
        Err(FsError::AccessDenied { .. }) => return,
        Err(e) => AuditEvent::new(AuditLevel::Error, format!("{} failed", operation))
            .with("error", e.kind_name())
            .with("reason", e),
    };
    sink.record(
        &event
            .with("operation", operation)
            .with("path", path.display()),
    );
}
