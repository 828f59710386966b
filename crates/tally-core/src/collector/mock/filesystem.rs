//! In-memory mock filesystem for testing collectors without real `/proc`.

use crate::collector::traits::{FileSystem, SpaceInfo};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
///
/// Stores files, directories and per-mount space figures in memory. A mount
/// point registered with [`fail_space`](MockFs::fail_space) answers space
/// queries with an I/O error.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: HashMap<PathBuf, Vec<u8>>,
    directories: HashSet<PathBuf>,
    /// `None` marks a mount point whose space query fails.
    spaces: HashMap<PathBuf, Option<SpaceInfo>>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.add_bytes(path, content.into().into_bytes());
    }

    /// Adds a file whose content need not be valid UTF-8.
    pub fn add_bytes(&mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    /// Sets the space figures reported for a mount point.
    pub fn add_space(&mut self, mount_point: impl AsRef<Path>, space: SpaceInfo) {
        self.spaces
            .insert(mount_point.as_ref().to_path_buf(), Some(space));
    }

    /// Makes space queries for a mount point fail.
    pub fn fail_space(&mut self, mount_point: impl AsRef<Path>) {
        self.spaces.insert(mount_point.as_ref().to_path_buf(), None);
    }

    /// Adds `count` open descriptors under `/proc/self/fd`.
    pub fn add_fds(&mut self, count: usize) {
        self.add_dir("/proc/self/fd");
        for fd in 0..count {
            self.add_file(format!("/proc/self/fd/{fd}"), "");
        }
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }
}

impl FileSystem for MockFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        String::from_utf8(self.read(path)?)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        for file_path in self.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &self.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }

    fn space(&self, mount_point: &Path) -> io::Result<SpaceInfo> {
        match self.spaces.get(mount_point) {
            Some(Some(space)) => Ok(*space),
            Some(None) => Err(io::Error::other(format!(
                "space unavailable: {:?}",
                mount_point
            ))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("mount point not found: {:?}", mount_point),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_fs_add_file() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/meminfo", "MemTotal: 16384 kB\n");

        let content = fs.read_to_string(Path::new("/proc/meminfo")).unwrap();
        assert_eq!(content, "MemTotal: 16384 kB\n");
        assert!(fs.read_dir(Path::new("/proc")).is_ok());
    }

    #[test]
    fn test_mock_fs_bytes() {
        let mut fs = MockFs::new();
        fs.add_bytes("/proc/self/mounts", b"caf\xe9".to_vec());

        assert_eq!(fs.read(Path::new("/proc/self/mounts")).unwrap(), b"caf\xe9");
        assert_eq!(
            fs.read_to_string(Path::new("/proc/self/mounts"))
                .unwrap_err()
                .kind(),
            io::ErrorKind::InvalidData
        );
    }

    #[test]
    fn test_mock_fs_read_dir() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/self/stat", "stat content");
        fs.add_file("/proc/self/status", "status content");
        fs.add_dir("/proc/self/fd");

        let entries = fs.read_dir(Path::new("/proc/self")).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(fs.read_dir(Path::new("/sys")).is_err());
    }

    #[test]
    fn test_mock_fs_fds() {
        let mut fs = MockFs::new();
        fs.add_fds(4);
        assert_eq!(fs.read_dir(Path::new("/proc/self/fd")).unwrap().len(), 4);
    }

    #[test]
    fn test_mock_fs_space() {
        let mut fs = MockFs::new();
        let space = SpaceInfo {
            total: 100,
            usable: 30,
        };
        fs.add_space("/", space);
        fs.fail_space("/broken");

        assert_eq!(fs.space(Path::new("/")).unwrap(), space);
        assert!(fs.space(Path::new("/broken")).is_err());
        assert_eq!(
            fs.space(Path::new("/missing")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
