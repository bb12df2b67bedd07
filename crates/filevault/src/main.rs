//! FileVault CLI
//!
//! Sandboxed file operations and sealed storage from the command line.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use filevault::config::Config;
use filevault::{
    Algorithm, FileSystemService, KeyProvider, SecureDeletionPolicy, SecureReadOptions,
    StaticKeyProvider, SymmetricKey, WriteOptions,
};
use tracing_subscriber::EnvFilter;

/// FileVault - sandboxed file access with sealed storage.
#[derive(Parser, Debug)]
#[command(name = "filevault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Sandbox root (overrides the configured root)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// File holding a hex-encoded 256-bit key for seal/unseal
    #[arg(long, global = true, value_name = "FILE")]
    pub key_file: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print a file's contents
    Read {
        path: PathBuf,
    },

    /// Write stdin (or --data) to a file
    Write {
        path: PathBuf,

        /// Literal contents instead of stdin
        #[arg(long)]
        data: Option<String>,

        /// Replace an existing file
        #[arg(long, short)]
        force: bool,

        /// Create missing parent directories
        #[arg(long, short)]
        parents: bool,
    },

    /// List a directory
    Ls {
        path: PathBuf,

        /// Descend into subdirectories
        #[arg(long, short)]
        recursive: bool,
    },

    /// Show file attributes as JSON
    Stat {
        path: PathBuf,

        /// Include extended attributes
        #[arg(long)]
        xattrs: bool,
    },

    /// Create a directory
    Mkdir {
        path: PathBuf,

        /// Create missing parent directories
        #[arg(long, short)]
        parents: bool,
    },

    /// Delete a file or directory tree
    Rm {
        path: PathBuf,
    },

    /// Move or rename an item
    Mv {
        source: PathBuf,
        destination: PathBuf,

        /// Replace an existing destination
        #[arg(long, short)]
        force: bool,
    },

    /// Copy a file or directory tree
    Cp {
        source: PathBuf,
        destination: PathBuf,

        /// Replace an existing destination
        #[arg(long, short)]
        force: bool,
    },

    /// Manage extended attributes
    #[command(subcommand)]
    Xattr(XattrCommands),

    /// Seal stdin (or --data) into an encrypted file
    Seal {
        path: PathBuf,

        /// Literal contents instead of stdin
        #[arg(long)]
        data: Option<String>,

        /// AEAD algorithm (aes256 or chachapoly); defaults to the configured one
        #[arg(long, short)]
        algorithm: Option<Algorithm>,

        /// Replace an existing file
        #[arg(long, short)]
        force: bool,
    },

    /// Print the plaintext of a sealed file
    Unseal {
        path: PathBuf,
    },

    /// Overwrite a file several times, then delete it
    Shred {
        path: PathBuf,

        /// Number of overwrite passes (defaults to the configured count)
        #[arg(long, short = 'n')]
        passes: Option<u32>,

        /// Use the fixed FF/00/AA pattern instead of random data
        #[arg(long)]
        pattern: bool,
    },

    /// Print the SHA-256 of a file
    Digest {
        path: PathBuf,
    },

    /// Check a file against a hex SHA-256 digest
    Verify {
        path: PathBuf,
        digest: String,
    },

    /// Generate a new hex-encoded key
    Keygen,
}

/// Subcommands for extended attributes.
#[derive(Subcommand, Debug, Clone)]
pub enum XattrCommands {
    /// Print an attribute value
    Get { path: PathBuf, name: String },

    /// Set an attribute value
    Set {
        path: PathBuf,
        name: String,
        value: String,
    },

    /// List attribute names
    List { path: PathBuf },

    /// Remove an attribute
    Rm { path: PathBuf, name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides, then command-line overrides
    config.apply_env_overrides();
    if let Some(root) = &cli.root {
        config.sandbox.root = Some(std::path::absolute(root)?);
    }
    if let Some(key_file) = &cli.key_file {
        config.secure.key_file = Some(key_file.clone());
    }

    // Validate configuration
    config.validate()?;

    // Initialize tracing on stderr so stdout carries file data
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Keygen = cli.command {
        println!("{}", SymmetricKey::generate().to_hex());
        return Ok(());
    }

    let keys = match &config.secure.key_file {
        Some(path) => Some(load_key_provider(path)?),
        None => None,
    };
    let service = FileSystemService::from_config(&config, keys)?;

    match cli.command {
        Commands::Read { path } => {
            let data = service.read_file(&path).await?;
            std::io::stdout().write_all(&data)?;
        }
        Commands::Write {
            path,
            data,
            force,
            parents,
        } => {
            let data = input_bytes(data)?;
            let options = write_options(force, parents);
            let result = service.write_file(data, &path, options).await?;
            println!("{}", result.path.display());
        }
        Commands::Ls { path, recursive } => {
            let entries = if recursive {
                service.list_directory_recursively(&path).await?
            } else {
                service.list_directory(&path).await?
            };
            for entry in entries {
                println!("{}", entry.display());
            }
        }
        Commands::Stat { path, xattrs } => {
            let attributes = service.get_attributes(&path, xattrs).await?;
            println!("{}", serde_json::to_string_pretty(&attributes)?);
        }
        Commands::Mkdir { path, parents } => {
            let result = service.create_directory(&path, parents, None).await?;
            println!("{}", result.path.display());
        }
        Commands::Rm { path } => {
            service.delete(&path).await?;
        }
        Commands::Mv {
            source,
            destination,
            force,
        } => {
            let result = service
                .move_item(&source, &destination, write_options(force, false))
                .await?;
            println!("{}", result.path.display());
        }
        Commands::Cp {
            source,
            destination,
            force,
        } => {
            let result = service
                .copy_item(&source, &destination, write_options(force, false))
                .await?;
            println!("{}", result.path.display());
        }
        Commands::Xattr(command) => run_xattr(&service, command).await?,
        Commands::Seal {
            path,
            data,
            algorithm,
            force,
        } => {
            let data = input_bytes(data)?;
            let mut options = service.default_write_options();
            if let Some(algorithm) = algorithm {
                options.algorithm = algorithm;
            }
            options.write = write_options(force, false);
            let algorithm = options.algorithm;
            let result = service.secure_write_file(data, &path, options).await?;
            tracing::info!(%algorithm, path = %result.path.display(), "sealed");
            println!("{}", result.path.display());
        }
        Commands::Unseal { path } => {
            let plaintext = service
                .secure_read_file(&path, SecureReadOptions::default())
                .await?;
            std::io::stdout().write_all(&plaintext)?;
        }
        Commands::Shred {
            path,
            passes,
            pattern,
        } => {
            let mut policy = service.deletion_policy();
            if let Some(passes) = passes {
                policy.pass_count = passes;
            }
            if pattern {
                policy.use_random_data = false;
            }
            validate_policy(&policy)?;
            service.secure_delete(&path, policy).await?;
        }
        Commands::Digest { path } => {
            let digest = service.file_digest(&path).await?;
            println!("{}  {}", hex::encode(digest), path.display());
        }
        Commands::Verify { path, digest } => {
            let expected = hex::decode(digest.trim()).context("Digest must be hex-encoded")?;
            if service.verify_file_integrity(&path, &expected).await? {
                println!("{}: OK", path.display());
            } else {
                println!("{}: FAILED", path.display());
                std::process::exit(1);
            }
        }
        // Handled before the service is built
        Commands::Keygen => {}
    }

    Ok(())
}

async fn run_xattr(service: &FileSystemService, command: XattrCommands) -> anyhow::Result<()> {
    match command {
        XattrCommands::Get { path, name } => {
            let value = service.get_extended_attribute(&name, &path).await?;
            match std::str::from_utf8(&value) {
                Ok(text) => println!("{}", text),
                Err(_) => println!("0x{}", hex::encode(&value)),
            }
        }
        XattrCommands::Set { path, name, value } => {
            service
                .set_extended_attribute(&name, value.as_bytes(), &path)
                .await?;
        }
        XattrCommands::List { path } => {
            for name in service.list_extended_attributes(&path).await? {
                println!("{}", name);
            }
        }
        XattrCommands::Rm { path, name } => {
            service.remove_extended_attribute(&name, &path).await?;
        }
    }
    Ok(())
}

fn load_key_provider(path: &Path) -> anyhow::Result<Arc<dyn KeyProvider>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file: {}", path.display()))?;
    let key = SymmetricKey::from_hex(contents.trim())
        .with_context(|| format!("Invalid key in {}", path.display()))?;
    Ok(Arc::new(StaticKeyProvider::new(key)))
}

fn input_bytes(data: Option<String>) -> anyhow::Result<Vec<u8>> {
    match data {
        Some(data) => Ok(data.into_bytes()),
        None => {
            let mut buffer = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buffer)
                .context("Failed to read stdin")?;
            Ok(buffer)
        }
    }
}

fn write_options(force: bool, parents: bool) -> WriteOptions {
    WriteOptions {
        overwrite: force,
        create_parent_directories: parents,
        ..Default::default()
    }
}

fn validate_policy(policy: &SecureDeletionPolicy) -> anyhow::Result<()> {
    let max = filevault::config::MAX_DELETION_PASSES;
    if !(1..=max).contains(&policy.pass_count) {
        anyhow::bail!("--passes must be between 1 and {}", max);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_seal() {
        let cli = Cli::try_parse_from([
            "filevault",
            "--key-file",
            "/keys/k.hex",
            "seal",
            "secret.bin",
            "--algorithm",
            "chachapoly",
            "--force",
        ])
        .unwrap();

        assert_eq!(cli.key_file, Some(PathBuf::from("/keys/k.hex")));
        match cli.command {
            Commands::Seal {
                path,
                algorithm,
                force,
                data,
            } => {
                assert_eq!(path, PathBuf::from("secret.bin"));
                assert_eq!(algorithm, Some(Algorithm::ChaCha20Poly1305));
                assert!(force);
                assert!(data.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_algorithm() {
        let result = Cli::try_parse_from(["filevault", "seal", "x", "--algorithm", "rot13"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parses_xattr_set() {
        let cli =
            Cli::try_parse_from(["filevault", "xattr", "set", "a.txt", "user.tag", "blue"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Xattr(XattrCommands::Set { ref name, ref value, .. })
                if name == "user.tag" && value == "blue"
        ));
    }

    #[test]
    fn test_write_options_flags() {
        let options = write_options(true, true);
        assert!(options.overwrite);
        assert!(options.create_parent_directories);
        assert!(options.atomic_write);
    }

    #[test]
    fn test_validate_policy_bounds() {
        let mut policy = SecureDeletionPolicy::default();
        assert!(validate_policy(&policy).is_ok());
        policy.pass_count = 0;
        assert!(validate_policy(&policy).is_err());
        policy.pass_count = 36;
        assert!(validate_policy(&policy).is_err());
    }

    #[test]
    fn test_load_key_provider() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("key.hex");
        let key = SymmetricKey::generate();
        std::fs::write(&path, format!("{}\n", key.to_hex())).unwrap();

        let provider = load_key_provider(&path).unwrap();
        let loaded = provider.key_for(Path::new("/any")).unwrap();
        assert_eq!(loaded.to_hex(), key.to_hex());

        std::fs::write(&path, "not hex").unwrap();
        assert!(load_key_provider(&path).is_err());
    }
}
