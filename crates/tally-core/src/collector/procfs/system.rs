//! System collector reading host and process figures from `/proc/`.

use std::path::Path;
use std::time::Duration;

use crate::collector::procfs::CollectError;
use crate::collector::procfs::parser::{
    LoadAvg, MemInfo, MountEntry, ProcStatus, parse_cpu_count, parse_loadavg, parse_meminfo,
    parse_mounts, parse_open_files_limit, parse_proc_starttime, parse_proc_status, parse_uptime,
};
use crate::collector::traits::{FileSystem, SpaceInfo};

/// Clock ticks per second (USER_HZ). Standard value for Linux.
const CLK_TCK: u64 = 100;

/// Collects host-wide figures and figures of the current process
/// (`/proc/self`).
pub struct SystemCollector<F: FileSystem> {
    fs: F,
    proc_path: String,
}

impl<F: FileSystem> SystemCollector<F> {
    /// Creates a new system collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    fn path(&self, relative: &str) -> String {
        format!("{}/{}", self.proc_path, relative)
    }

    fn read(&self, relative: &str) -> Result<String, CollectError> {
        Ok(self.fs.read_to_string(Path::new(&self.path(relative)))?)
    }

    /// Collects memory information from `/proc/meminfo`.
    pub fn collect_meminfo(&self) -> Result<MemInfo, CollectError> {
        Ok(parse_meminfo(&self.read("meminfo")?)?)
    }

    /// Collects load average from `/proc/loadavg`.
    pub fn collect_loadavg(&self) -> Result<LoadAvg, CollectError> {
        Ok(parse_loadavg(&self.read("loadavg")?)?)
    }

    /// Counts CPUs listed in `/proc/stat`.
    pub fn collect_cpu_count(&self) -> Result<usize, CollectError> {
        match parse_cpu_count(&self.read("stat")?) {
            0 => Err(CollectError::Parse("no cpu lines in stat".to_string())),
            count => Ok(count),
        }
    }

    /// Collects seconds since boot from `/proc/uptime`.
    pub fn collect_uptime(&self) -> Result<f64, CollectError> {
        Ok(parse_uptime(&self.read("uptime")?)?)
    }

    /// Collects `/proc/self/status`.
    pub fn collect_self_status(&self) -> Result<ProcStatus, CollectError> {
        Ok(parse_proc_status(&self.read("self/status")?)?)
    }

    /// Time since the current process started.
    ///
    /// Formula: uptime - (starttime_jiffies / CLK_TCK)
    pub fn collect_process_uptime(&self) -> Result<Duration, CollectError> {
        let starttime = parse_proc_starttime(&self.read("self/stat")?)?;
        let uptime = self.collect_uptime()?;

        let started = Duration::from_millis(starttime.saturating_mul(1000) / CLK_TCK);
        let since_boot = Duration::try_from_secs_f64(uptime)
            .map_err(|e| CollectError::Parse(format!("uptime {}: {}", uptime, e)))?;
        Ok(since_boot.saturating_sub(started))
    }

    /// Counts open descriptors in `/proc/self/fd`.
    pub fn collect_open_fds(&self) -> Result<usize, CollectError> {
        Ok(self.fs.read_dir(Path::new(&self.path("self/fd")))?.len())
    }

    /// Soft limit on open files from `/proc/self/limits`.
    pub fn collect_open_files_limit(&self) -> Result<u64, CollectError> {
        match parse_open_files_limit(&self.read("self/limits")?)? {
            Some(0) => Err(CollectError::Parse("open files limit is 0".to_string())),
            Some(limit) => Ok(limit),
            None => Err(CollectError::Unsupported(
                "open files limit is unlimited".to_string(),
            )),
        }
    }

    /// Collects the mount table of the current process.
    ///
    /// Mount points are not guaranteed to be UTF-8; invalid bytes are
    /// replaced so one odd path does not hide the rest of the table.
    pub fn collect_mounts(&self) -> Result<Vec<MountEntry>, CollectError> {
        let raw = self.fs.read(Path::new(&self.path("self/mounts")))?;
        Ok(parse_mounts(&String::from_utf8_lossy(&raw)))
    }

    /// Queries space figures of the store mounted at `mount_point`.
    pub fn collect_space(&self, mount_point: &str) -> Result<SpaceInfo, CollectError> {
        Ok(self.fs.space(Path::new(mount_point))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    #[test]
    fn test_collect_meminfo() {
        let collector = SystemCollector::new(MockFs::typical_system(), "/proc");
        let info = collector.collect_meminfo().unwrap();
        assert_eq!(info.mem_total, 8000000);
    }

    #[test]
    fn test_collect_loadavg_and_cpus() {
        let collector = SystemCollector::new(MockFs::typical_system(), "/proc");
        let load = collector.collect_loadavg().unwrap();
        assert!((load.load1 - 2.0).abs() < 0.001);
        assert_eq!(collector.collect_cpu_count().unwrap(), 4);
    }

    #[test]
    fn test_collect_cpu_count_without_cpu_lines() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/stat", "ctxt 1\n");
        let collector = SystemCollector::new(fs, "/proc");
        assert!(matches!(
            collector.collect_cpu_count(),
            Err(CollectError::Parse(_))
        ));
    }

    #[test]
    fn test_collect_process_uptime() {
        let collector = SystemCollector::new(MockFs::typical_system(), "/proc");
        // uptime 12345.5s, process started 12000s after boot
        let uptime = collector.collect_process_uptime().unwrap();
        assert_eq!(uptime.as_millis(), 345_500);
    }

    #[test]
    fn test_collect_self_status() {
        let collector = SystemCollector::new(MockFs::typical_system(), "/proc");
        let status = collector.collect_self_status().unwrap();
        assert_eq!(status.threads, 12);
    }

    #[test]
    fn test_collect_fds() {
        let collector = SystemCollector::new(MockFs::typical_system(), "/proc");
        assert_eq!(collector.collect_open_fds().unwrap(), 256);
        assert_eq!(collector.collect_open_files_limit().unwrap(), 1024);
    }

    #[test]
    fn test_collect_unlimited_fds_is_unsupported() {
        let mut fs = MockFs::new();
        fs.add_file(
            "/proc/self/limits",
            "Max open files            unlimited            unlimited            files\n",
        );
        let collector = SystemCollector::new(fs, "/proc");
        assert!(matches!(
            collector.collect_open_files_limit(),
            Err(CollectError::Unsupported(_))
        ));
    }

    #[test]
    fn test_collect_missing_file_is_io_error() {
        let collector = SystemCollector::new(MockFs::new(), "/proc");
        assert!(matches!(
            collector.collect_meminfo(),
            Err(CollectError::Io(_))
        ));
        assert!(collector.collect_open_fds().is_err());
    }

    #[test]
    fn test_collect_mounts_and_space() {
        let collector = SystemCollector::new(MockFs::typical_system(), "/proc");
        let mounts = collector.collect_mounts().unwrap();
        assert!(mounts.iter().any(|m| m.mount_point == "/"));

        let space = collector.collect_space("/").unwrap();
        assert_eq!(space.total, 100 * GIB);
    }

    #[test]
    fn test_collect_mounts_with_invalid_utf8() {
        let mut fs = MockFs::new();
        fs.add_bytes(
            "/proc/self/mounts",
            b"/dev/sda1 / ext4 rw 0 0\n/dev/sdb1 /mnt/caf\xe9 ext4 rw 0 0\n".to_vec(),
        );
        let collector = SystemCollector::new(fs, "/proc");

        let mounts = collector.collect_mounts().unwrap();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].mount_point, "/");
        assert_eq!(mounts[1].mount_point, "/mnt/caf\u{fffd}");
    }

    const GIB: u64 = 1024 * 1024 * 1024;
}
