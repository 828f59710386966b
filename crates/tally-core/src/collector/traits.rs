//! Abstractions for filesystem access to enable testing and mocking.
//!
//! The `FileSystem` trait lets the collector read the real `/proc` and
//! query real mount points on Linux, or work against an in-memory mock in
//! tests on any host.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Space figures of a mounted store, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpaceInfo {
    pub total: u64,
    /// Space available to unprivileged users.
    pub usable: u64,
}

/// Abstraction for filesystem operations.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as raw bytes.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Lists entries in a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Returns space figures for the store mounted at `mount_point`.
    fn space(&self, mount_point: &Path) -> io::Result<SpaceInfo>;
}

/// Real filesystem implementation that delegates to `std::fs` and `statvfs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }

    #[cfg(unix)]
    fn space(&self, mount_point: &Path) -> io::Result<SpaceInfo> {
        use std::ffi::CString;
        use std::mem::MaybeUninit;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(mount_point.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut stat = MaybeUninit::<libc::statvfs>::uninit();

        // SAFETY: c_path is NUL-terminated and stat points to writable storage
        // of the right type; statvfs initializes it when it returns 0.
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: statvfs returned 0.
        let stat = unsafe { stat.assume_init() };

        let block = stat.f_frsize as u64;
        Ok(SpaceInfo {
            total: (stat.f_blocks as u64).saturating_mul(block),
            usable: (stat.f_bavail as u64).saturating_mul(block),
        })
    }

    #[cfg(not(unix))]
    fn space(&self, mount_point: &Path) -> io::Result<SpaceInfo> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("space query not supported for {}", mount_point.display()),
        ))
    }
}
