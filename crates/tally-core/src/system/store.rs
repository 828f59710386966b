//! Mounted file stores worth watching.

use serde::Serialize;

use crate::collector::procfs::parser::MountEntry;
use crate::collector::traits::SpaceInfo;

/// Store names that are never watched.
const IGNORED_STORES: &[&str] = &["udev", "tmpfs"];

/// Kernel filesystems without backing storage.
const PSEUDO_FILESYSTEMS: &[&str] = &[
    "autofs",
    "binfmt_misc",
    "bpf",
    "cgroup",
    "cgroup2",
    "configfs",
    "debugfs",
    "devpts",
    "devtmpfs",
    "fusectl",
    "hugetlbfs",
    "mqueue",
    "nsfs",
    "proc",
    "pstore",
    "rpc_pipefs",
    "securityfs",
    "sysfs",
    "tracefs",
];

/// A mounted store together with the space figures read while listing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStore {
    /// Device or source name, as listed in the mount table.
    pub name: String,
    pub mount_point: String,
    pub fs_type: String,
    pub read_only: bool,
    pub space: SpaceInfo,
}

impl FileStore {
    pub fn new(mount: MountEntry, space: SpaceInfo) -> Self {
        Self {
            name: mount.device,
            mount_point: mount.mount_point,
            fs_type: mount.fs_type,
            read_only: mount.read_only,
            space,
        }
    }

    /// Name of the usage gauge registered for this store.
    pub fn metric_name(&self) -> String {
        format!("file-{}-{}", self.name, super::METRICS_SPACE_USED)
    }

    pub fn is_eligible(&self) -> bool {
        self.space.usable > 0 && is_candidate(&self.name, &self.fs_type, self.read_only)
    }
}

/// Checks everything except space, so pseudo mounts are never queried.
pub(crate) fn is_candidate(name: &str, fs_type: &str, read_only: bool) -> bool {
    !read_only && !IGNORED_STORES.contains(&name) && !PSEUDO_FILESYSTEMS.contains(&fs_type)
}
