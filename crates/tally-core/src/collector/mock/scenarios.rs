//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc` and mount states for testing
//! the system metrics catalogue.

use super::filesystem::MockFs;
use crate::collector::traits::SpaceInfo;

const GIB: u64 = 1024 * 1024 * 1024;

/// Mount table of [`MockFs::typical_system`]: two eligible stores, one
/// duplicate, pseudo and memory filesystems, a read-only snap and a full disk.
const TYPICAL_MOUNTS: &str = "\
/dev/sda1 / ext4 rw,relatime 0 0
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
udev /dev devtmpfs rw,nosuid,relatime 0 0
tmpfs /run tmpfs rw,nosuid,nodev,noexec,relatime 0 0
/dev/sdb1 /data xfs rw,relatime 0 0
/dev/loop0 /snap/core/1 squashfs ro,nodev,relatime 0 0
/dev/sdc1 /full ext4 rw,relatime 0 0
/dev/sda1 /var/lib/docker ext4 rw,relatime 0 0
";

impl MockFs {
    /// Creates a typical 4-CPU host running the current process.
    ///
    /// Figures are chosen so every percentage gauge lands on a round value:
    /// load 50, heap / nonHeap / memory 25, fileDescriptorUsed 25,
    /// `/` 60 and `/data` 25 percent used.
    pub fn typical_system() -> Self {
        let mut fs = Self::new();

        fs.add_file("/proc/uptime", "12345.50 98765.43\n");
        fs.add_file("/proc/loadavg", "2.00 1.50 1.00 3/412 9876\n");
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:        8000000 kB
MemFree:         4000000 kB
MemAvailable:    6000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
",
        );
        fs.add_file(
            "/proc/stat",
            "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 0 0
cpu2 2500 125 750 20000 250 50 25 0 0 0
cpu3 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
        );

        // The current process: started 1_200_000 ticks (12000s) after boot.
        fs.add_file(
            "/proc/self/stat",
            "4242 (tallyd) S 1 4242 4242 0 -1 4194560 1000 0 0 0 100 50 0 0 20 0 12 0 \
             1200000 41943040 2500 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0\n",
        );
        fs.add_file(
            "/proc/self/status",
            "\
Name:\ttallyd
Umask:\t0022
State:\tS (sleeping)
Pid:\t4242
PPid:\t1
VmPeak:\t 4200000 kB
VmSize:\t 4000000 kB
VmRSS:\t 1500000 kB
VmData:\t 2000000 kB
VmStk:\t    1000 kB
VmExe:\t   99000 kB
VmLib:\t  900000 kB
Threads:\t12
",
        );
        fs.add_file(
            "/proc/self/limits",
            "\
Limit                     Soft Limit           Hard Limit           Units
Max cpu time              unlimited            unlimited            seconds
Max open files            1024                 1048576              files
Max processes             63432                63432                processes
",
        );
        fs.add_fds(256);

        fs.add_file("/proc/self/mounts", TYPICAL_MOUNTS);
        fs.add_space(
            "/",
            SpaceInfo {
                total: 100 * GIB,
                usable: 40 * GIB,
            },
        );
        fs.add_space(
            "/data",
            SpaceInfo {
                total: 200 * GIB,
                usable: 150 * GIB,
            },
        );
        fs.add_space(
            "/run",
            SpaceInfo {
                total: GIB,
                usable: GIB,
            },
        );
        fs.add_space(
            "/snap/core/1",
            SpaceInfo {
                total: GIB,
                usable: 0,
            },
        );
        fs.add_space(
            "/full",
            SpaceInfo {
                total: 10 * GIB,
                usable: 0,
            },
        );

        fs
    }

    /// A typical host with an extra store whose space cannot be read.
    pub fn with_unreadable_store() -> Self {
        let mut fs = Self::typical_system();
        fs.add_file(
            "/proc/self/mounts",
            format!("{TYPICAL_MOUNTS}/dev/sdd1 /broken ext4 rw,relatime 0 0\n"),
        );
        fs.fail_space("/broken");
        fs
    }

    /// A host without `/proc/self/fd` or `/proc/self/limits`.
    pub fn without_fd_introspection() -> Self {
        let mut fs = Self::new();
        fs.add_file("/proc/uptime", "100.00 50.00\n");
        fs.add_file("/proc/loadavg", "0.50 0.40 0.30 1/100 10\n");
        fs.add_file("/proc/stat", "cpu  1 2 3 4\ncpu0 1 2 3 4\n");
        fs.add_file(
            "/proc/self/status",
            "Name:\ttallyd\nVmSize:\t1000 kB\nVmData:\t500 kB\nThreads:\t1\n",
        );
        fs.add_file("/proc/meminfo", "MemTotal:        1000000 kB\n");
        fs.add_file("/proc/self/mounts", "");
        fs
    }
}
