//! # FileVault Library
//!
//! This crate provides sandboxed file-system access with a secure-storage
//! layer on top.
//!
//! ## Overview
//!
//! - **Sandbox**: every path is confined to an optional root directory, with
//!   symlinks resolved before the check
//! - **Reads and Writes**: atomic replace, directory creation, move, copy and
//!   recursive listing
//! - **Metadata**: POSIX attributes, timestamps and extended attributes
//! - **Secure Storage**: sealed (AEAD) files, multi-pass erasure, permission
//!   hardening and SHA-256 integrity checks
//! - **Audit**: every outcome and sandbox violation goes to a pluggable sink
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      FileSystemService                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐   │
//! │  │  FileReader  │  │  FileWriter  │  │   MetadataManager    │   │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘   │
//! │          ▲                 ▲                                    │
//! │  ┌───────┴─────────────────┴──────────────────────────────────┐ │
//! │  │        SecureOperations (envelope frames, shredding)       │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! │                                                                 │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │            SandboxGuard  +  audit sink (shared)            │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each component owns a mailbox: calls on one instance run one at a time in
//! submission order, while separate instances proceed independently.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use filevault::{FileSystemService, TextEncoding, WriteOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = FileSystemService::new(Some("/srv/vault".into()))?;
//!
//!     service
//!         .write_string("hello", "notes.txt", TextEncoding::Utf8, WriteOptions::default())
//!         .await?;
//!     assert_eq!(service.get_file_size("notes.txt").await?, 5);
//!
//!     // Outside the root: rejected before any I/O
//!     assert!(service.read_file("/etc/passwd").await.is_err());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`audit`]: Audit events and sinks
//! - [`config`]: Configuration loading and defaults
//! - [`error`]: Error types
//! - [`files`]: Sandbox guard and the file-system components
//! - [`mailbox`]: Per-component call serialisation
//! - [`service`]: The composition facade
//! - [`types`]: Attribute, option and result types

pub mod audit;
pub mod config;
pub mod error;
pub mod files;
pub mod mailbox;
pub mod service;
pub mod types;

// Re-export envelope for convenience
pub use envelope;

// Re-export envelope types for convenience
pub use envelope::{Algorithm, KeyProvider, StaticKeyProvider, SymmetricKey};

// Re-export config types for convenience
pub use config::Config;

// Re-export error types for convenience
pub use error::{FsError, FsResult};

// Re-export audit types for convenience
pub use audit::{
    AuditEvent, AuditLevel, AuditSink, MemoryAuditSink, NoopAuditSink, SharedAuditSink,
    TracingAuditSink,
};

// Re-export component types for convenience
pub use files::{FileReader, FileWriter, MetadataManager, SandboxGuard, SecureOperations};

// Re-export service types for convenience
pub use service::{FileSystemService, FileSystemServiceBuilder};

// Re-export value types for convenience
pub use types::{
    AttributeChanges, FileAttributes, FileKind, FileOperationResult, SecureDeletionPolicy,
    SecurePermissions, SecureReadOptions, SecureWriteOptions, TextEncoding, WriteOptions,
};
