//! Configuration management for FileVault.
//!
//! Settings live in a TOML file, by default `~/.config/filevault/config.toml`.
//! Every section and key is optional. `FILEVAULT_*` environment variables
//! override the file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use envelope::Algorithm;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::SecureDeletionPolicy;

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("deletion_passes must be between 1 and 35, got {0}")]
    InvalidDeletionPasses(u32),

    #[error("sandbox root must be an absolute path, got {0}")]
    RelativeSandboxRoot(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Accepted `logging.level` values.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound on overwrite passes (the Gutmann method's count).
pub const MAX_DELETION_PASSES: u32 = 35;

/// Main configuration structure for FileVault.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Path confinement.
    pub sandbox: SandboxConfig,

    /// Sealed storage and secure deletion defaults.
    pub secure: SecureConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Path confinement configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SandboxConfig {
    /// Root every path must stay under. Unrestricted when unset.
    pub root: Option<PathBuf>,
}

/// Secure storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecureConfig {
    /// AEAD algorithm for sealed writes ("aes256" or "chachapoly").
    pub algorithm: Algorithm,

    /// Overwrite passes before a secure delete unlinks the file.
    pub deletion_passes: u32,

    /// Overwrite with random data instead of the fixed pattern.
    pub random_overwrite: bool,

    /// File holding the hex-encoded 32-byte key used by the CLI.
    pub key_file: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for SecureConfig {
    fn default() -> Self {
        let policy = SecureDeletionPolicy::default();
        Self {
            algorithm: Algorithm::default(),
            deletion_passes: policy.pass_count,
            random_overwrite: policy.use_random_data,
            key_file: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SecureConfig {
    /// The deletion policy these settings describe.
    pub fn deletion_policy(&self) -> SecureDeletionPolicy {
        SecureDeletionPolicy {
            pass_count: self.deletion_passes,
            use_random_data: self.random_overwrite,
        }
    }
}

/// `<config dir>/filevault/config.toml`, falling back to the working directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filevault")
        .join("config.toml")
}

impl Config {
    /// Override file values from the environment.
    ///
    /// - `FILEVAULT_SANDBOX_ROOT` replaces `sandbox.root`
    /// - `FILEVAULT_LOG_LEVEL` replaces `logging.level`
    ///
    /// Empty values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(root) = env_value("FILEVAULT_SANDBOX_ROOT") {
            tracing::info!(root = %root, "sandbox root set from environment");
            self.sandbox.root = Some(PathBuf::from(root));
        }
        if let Some(level) = env_value("FILEVAULT_LOG_LEVEL") {
            tracing::info!(level = %level, "log level set from environment");
            self.logging.level = level;
        }
    }

    /// Check value ranges. Paths are not touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let passes = self.secure.deletion_passes;
        if !(1..=MAX_DELETION_PASSES).contains(&passes) {
            return Err(ConfigError::InvalidDeletionPasses(passes));
        }

        if let Some(root) = &self.sandbox.root {
            if !root.is_absolute() {
                return Err(ConfigError::RelativeSandboxRoot(
                    root.display().to_string(),
                ));
            }
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// Read and parse the TOML file at `path`.
    ///
    /// A missing file yields [`Config::default`]; unreadable or malformed
    /// files are errors naming the path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read {}", path.display()));
            }
        };

        Self::from_toml(&text).with_context(|| format!("bad config in {}", path.display()))
    }

    /// [`Config::load`] on [`default_config_path`].
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| anyhow::anyhow!("invalid TOML: {}", describe_toml_error(&e)))
    }

    /// Write the configuration to `path`.
    ///
    /// Missing parent directories are created. The file is written to a
    /// sibling temp file and renamed into place.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;

        let mut staged = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("cannot stage config in {}", dir.display()))?;
        staged.write_all(self.to_toml()?.as_bytes())?;
        staged
            .persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("cannot write {}", path.display()))?;

        tracing::debug!(path = %path.display(), "config saved");
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("config is not representable as TOML")
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Error message plus byte range, when toml reports one.
fn describe_toml_error(error: &toml::de::Error) -> String {
    match error.span() {
        Some(span) => format!("{} (bytes {}..{})", error.message(), span.start, span.end),
        None => error.message().to_string(),
    }
}
