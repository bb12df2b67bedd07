//! Raw extended-attribute syscalls.
//!
//! Thin wrappers over `getxattr`, `setxattr`, `listxattr` and `removexattr`
//! from libc. Linux and macOS differ only in the trailing position/options
//! arguments, which the `sys` shim hides. Every `-1` return is surfaced as the
//! thread's last OS error.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Read the value of attribute `name`.
///
/// Queries the value length first, then reads into a buffer of that size.
pub fn get(path: &Path, name: &str) -> io::Result<Vec<u8>> {
    let c_path = path_cstring(path)?;
    let c_name = name_cstring(name)?;

    let size = sys::getxattr(&c_path, &c_name, &mut [0u8; 0])?;
    let mut value = vec![0u8; size];
    let read = sys::getxattr(&c_path, &c_name, &mut value)?;
    value.truncate(read);
    Ok(value)
}

/// Create or replace attribute `name` with `value`.
pub fn set(path: &Path, name: &str, value: &[u8]) -> io::Result<()> {
    let c_path = path_cstring(path)?;
    let c_name = name_cstring(name)?;
    sys::setxattr(&c_path, &c_name, value)
}

/// Names of every attribute on `path`.
pub fn list(path: &Path) -> io::Result<Vec<String>> {
    let c_path = path_cstring(path)?;

    let size = sys::listxattr(&c_path, &mut [0u8; 0])?;
    if size == 0 {
        return Ok(Vec::new());
    }
    let mut buffer = vec![0u8; size];
    let read = sys::listxattr(&c_path, &mut buffer)?;
    buffer.truncate(read);

    Ok(split_names(&buffer))
}

/// Delete attribute `name`.
pub fn remove(path: &Path, name: &str) -> io::Result<()> {
    let c_path = path_cstring(path)?;
    let c_name = name_cstring(name)?;
    sys::removexattr(&c_path, &c_name)
}

/// Split a NUL-separated name list.
fn split_names(buffer: &[u8]) -> Vec<String> {
    buffer
        .split(|&b| b == 0)
        .filter(|name| !name.is_empty())
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .collect()
}

fn path_cstring(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte")
    })
}

fn name_cstring(name: &str) -> io::Result<CString> {
    if name.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "attribute name is empty",
        ));
    }
    CString::new(name).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "attribute name contains a NUL byte")
    })
}

fn check_len(ret: libc::ssize_t) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

fn check_status(ret: libc::c_int) -> io::Result<()> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use super::{check_len, check_status};
    use std::ffi::CStr;
    use std::io;

    pub fn getxattr(path: &CStr, name: &CStr, value: &mut [u8]) -> io::Result<usize> {
        // SAFETY: both strings are NUL-terminated and outlive the call; the
        // kernel writes at most `value.len()` bytes into `value`.
        check_len(unsafe {
            libc::getxattr(
                path.as_ptr(),
                name.as_ptr(),
                value.as_mut_ptr().cast(),
                value.len(),
            )
        })
    }

    pub fn setxattr(path: &CStr, name: &CStr, value: &[u8]) -> io::Result<()> {
        // SAFETY: pointers are valid for the given lengths for the whole call.
        check_status(unsafe {
            libc::setxattr(
                path.as_ptr(),
                name.as_ptr(),
                value.as_ptr().cast(),
                value.len(),
                0,
            )
        })
    }

    pub fn listxattr(path: &CStr, buffer: &mut [u8]) -> io::Result<usize> {
        // SAFETY: the kernel writes at most `buffer.len()` bytes.
        check_len(unsafe {
            libc::listxattr(path.as_ptr(), buffer.as_mut_ptr().cast(), buffer.len())
        })
    }

    pub fn removexattr(path: &CStr, name: &CStr) -> io::Result<()> {
        // SAFETY: both strings are NUL-terminated and outlive the call.
        check_status(unsafe { libc::removexattr(path.as_ptr(), name.as_ptr()) })
    }
}

#[cfg(target_os = "macos")]
mod sys {
    use super::{check_len, check_status};
    use std::ffi::CStr;
    use std::io;

    pub fn getxattr(path: &CStr, name: &CStr, value: &mut [u8]) -> io::Result<usize> {
        // SAFETY: both strings are NUL-terminated and outlive the call; the
        // kernel writes at most `value.len()` bytes into `value`.
        check_len(unsafe {
            libc::getxattr(
                path.as_ptr(),
                name.as_ptr(),
                value.as_mut_ptr().cast(),
                value.len(),
                0,
                0,
            )
        })
    }

    pub fn setxattr(path: &CStr, name: &CStr, value: &[u8]) -> io::Result<()> {
        // SAFETY: pointers are valid for the given lengths for the whole call.
        check_status(unsafe {
            libc::setxattr(
                path.as_ptr(),
                name.as_ptr(),
                value.as_ptr().cast(),
                value.len(),
                0,
                0,
            )
        })
    }

    pub fn listxattr(path: &CStr, buffer: &mut [u8]) -> io::Result<usize> {
        // SAFETY: the kernel writes at most `buffer.len()` bytes.
        check_len(unsafe {
            libc::listxattr(path.as_ptr(), buffer.as_mut_ptr().cast(), buffer.len(), 0)
        })
    }

    pub fn removexattr(path: &CStr, name: &CStr) -> io::Result<()> {
        // SAFETY: both strings are NUL-terminated and outlive the call.
        check_status(unsafe { libc::removexattr(path.as_ptr(), name.as_ptr(), 0) })
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
#[allow(dead_code)]
mod sys {
    use std::ffi::CStr;
    use std::io;

    fn unsupported() -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            "extended attributes are not supported on this platform",
        )
    }

    pub fn getxattr(_path: &CStr, _name: &CStr, _value: &mut [u8]) -> io::Result<usize> {
        Err(unsupported())
    }

    pub fn setxattr(_path: &CStr, _name: &CStr, _value: &[u8]) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn listxattr(_path: &CStr, _buffer: &mut [u8]) -> io::Result<usize> {
        Err(unsupported())
    }

    pub fn removexattr(_path: &CStr, _name: &CStr) -> io::Result<()> {
        Err(unsupported())
    }
}

/// True when `err` means the file system has no xattr support.
pub fn is_unsupported(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::Unsupported
        || err.raw_os_error() == Some(libc::ENOTSUP)
        || err.raw_os_error() == Some(libc::EOPNOTSUPP)
}
