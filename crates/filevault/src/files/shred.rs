//! Multi-pass overwriting for secure deletion.
//!
//! Each pass rewinds to offset 0 and rewrites the full length in chunks of at
//! most [`MAX_CHUNK_SIZE`] bytes, filled either from the OS CSPRNG or with the
//! fixed byte for that pass, and is synced to storage before the next begins.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::types::SecureDeletionPolicy;

/// Largest overwrite buffer (1 MiB).
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Fixed-pattern bytes, cycled by pass index.
pub const OVERWRITE_PATTERN: [u8; 3] = [0xFF, 0x00, 0xAA];

/// Something that can be overwritten in place and flushed to stable storage.
pub trait ShredTarget: Write + Seek {
    /// Flush written data to the device.
    fn sync(&mut self) -> io::Result<()>;
}

impl ShredTarget for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Fill byte for `pass` when random data is disabled.
pub fn pattern_byte(pass: u32) -> u8 {
    OVERWRITE_PATTERN[(pass % 3) as usize]
}

/// Overwrite the first `len` bytes of `target` according to `policy`.
pub fn overwrite<T: ShredTarget + ?Sized>(
    target: &mut T,
    len: u64,
    policy: &SecureDeletionPolicy,
) -> io::Result<()> {
    if len == 0 {
        return Ok(());
    }

    let chunk = len.min(MAX_CHUNK_SIZE as u64) as usize;
    let mut buffer = vec![0u8; chunk];

    for pass in 0..policy.pass_count {
        if !policy.use_random_data {
            buffer.fill(pattern_byte(pass));
        }

        target.seek(SeekFrom::Start(0))?;
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(chunk as u64) as usize;
            if policy.use_random_data {
                OsRng.fill_bytes(&mut buffer[..n]);
            }
            target.write_all(&buffer[..n])?;
            remaining -= n as u64;
        }
        target.flush()?;
        target.sync()?;
    }

    Ok(())
}

/// Overwrite and unlink the file at the already validated `path`.
///
/// Empty files, symlinks and special files are unlinked without overwriting.
/// Directories are rejected.
pub(crate) fn shred_file(path: &Path, policy: &SecureDeletionPolicy) -> FsResult<()> {
    let metadata = fs::symlink_metadata(path).map_err(|e| FsError::write(path, e))?;
    if metadata.is_dir() {
        return Err(FsError::Write {
            path: path.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::IsADirectory,
                "secure deletion only applies to files",
            ),
        });
    }

    if metadata.is_file() && metadata.len() > 0 {
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| FsError::write(path, e))?;
        overwrite(&mut file, metadata.len(), policy).map_err(|e| FsError::write(path, e))?;
        debug!(
            path = %path.display(),
            passes = policy.pass_count,
            random = policy.use_random_data,
            "overwrite passes complete"
        );
    }

    fs::remove_file(path).map_err(|e| FsError::write(path, e))
}
