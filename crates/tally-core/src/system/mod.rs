//! Gauges describing the current process and its host.
//!
//! [`SystemMetrics`] registers a fixed catalogue of gauges on a
//! [`MetricInstance`]. Nothing is sampled in the background: every gauge
//! reads `/proc` (or queries a store) when the sink is read.
//!
//! ```
//! use tally_core::collector::MockFs;
//! use tally_core::sink::MemorySink;
//! use tally_core::system::{SystemMetrics, METRICS_LOAD};
//!
//! let sink = MemorySink::default();
//! SystemMetrics::new(MockFs::typical_system(), "/proc").record(&sink);
//! assert_eq!(sink.value(METRICS_LOAD), Some(50));
//! ```

mod memory;
mod store;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::collector::procfs::{CollectError, SystemCollector};
use crate::collector::traits::FileSystem;
use crate::metric::{MetricGauge, MetricInstance, MetricProvider};

pub use memory::{MemorySource, MemoryUsage, ProcMemory};
pub use store::FileStore;

pub const METRICS_HEAP_MAX: &str = "heapMax";
pub const METRICS_HEAP_INIT: &str = "heapInit";
pub const METRICS_HEAP_USED: &str = "heapUsed";
pub const METRICS_NON_HEAP_MAX: &str = "nonHeapMax";
pub const METRICS_NON_HEAP_INIT: &str = "nonHeapInit";
pub const METRICS_NON_HEAP_USED: &str = "nonHeapUsed";
pub const METRICS_HEAP: &str = "heap";
pub const METRICS_NON_HEAP: &str = "nonHeap";
pub const METRICS_MEMORY: &str = "memory";
pub const METRICS_PENDING_FINALIZATION: &str = "pendingFinalization";
pub const METRICS_UPTIME: &str = "uptime";
pub const METRICS_CURRENT_THREAD_COUNT: &str = "currentThreadCount";
pub const METRICS_PEAK_THREAD_COUNT: &str = "peakThreadCount";
pub const METRICS_LOAD: &str = "load";
pub const METRICS_SPACE_USED: &str = "spaceUsed";
pub const FILE_DESCRIPTOR_USED: &str = "fileDescriptorUsed";

/// Instance names used by [`SystemMetrics::record_provider`].
pub const INSTANCE_FILE: &str = "file";
pub const INSTANCE_MEMORY: &str = "memory";
pub const INSTANCE_RUNTIME: &str = "runtime";

/// Registers runtime, memory and file store gauges.
pub struct SystemMetrics<F: FileSystem + 'static> {
    collector: Arc<SystemCollector<F>>,
    memory: Arc<dyn MemorySource>,
}

impl<F: FileSystem + 'static> SystemMetrics<F> {
    /// Reads memory figures from procfs.
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        let collector = Arc::new(SystemCollector::new(fs, proc_path));
        let memory = Arc::new(ProcMemory::new(Arc::clone(&collector)));
        Self { collector, memory }
    }

    /// Replaces the source of the memory gauges.
    pub fn with_memory_source(mut self, memory: Arc<dyn MemorySource>) -> Self {
        self.memory = memory;
        self
    }

    pub fn collector(&self) -> &Arc<SystemCollector<F>> {
        &self.collector
    }

    pub fn fs(&self) -> &F {
        self.collector.fs()
    }

    /// Registers the whole catalogue on one instance.
    pub fn record(&self, instance: &dyn MetricInstance) {
        self.record_runtime_metrics(instance);
        self.record_memory_metrics(instance);
        self.record_file_metrics(instance);
    }

    /// Registers each group on its own named instance.
    pub fn record_provider(&self, provider: &dyn MetricProvider) {
        self.record_file_metrics(&*provider.metric_instance(INSTANCE_FILE));
        self.record_memory_metrics(&*provider.metric_instance(INSTANCE_MEMORY));
        self.record_runtime_metrics(&*provider.metric_instance(INSTANCE_RUNTIME));
    }

    pub fn record_memory_metrics(&self, instance: &dyn MetricInstance) {
        let memory = Arc::clone(&self.memory);
        instance.set_gauge(
            METRICS_PENDING_FINALIZATION,
            gauge(METRICS_PENDING_FINALIZATION, move || {
                Ok(to_i64(memory.pending_reclaim()?))
            }),
        );

        let pools: [(&'static str, &'static str, &'static str, &'static str, Pool); 2] = [
            (
                METRICS_HEAP_USED,
                METRICS_HEAP_INIT,
                METRICS_HEAP_MAX,
                METRICS_HEAP,
                Pool::Heap,
            ),
            (
                METRICS_NON_HEAP_USED,
                METRICS_NON_HEAP_INIT,
                METRICS_NON_HEAP_MAX,
                METRICS_NON_HEAP,
                Pool::NonHeap,
            ),
        ];
        for (used, init, max, ratio, pool) in pools {
            let memory = Arc::clone(&self.memory);
            instance.set_gauge(
                used,
                gauge(used, move || Ok(to_i64(pool.read(&*memory)?.used))),
            );
            let memory = Arc::clone(&self.memory);
            instance.set_gauge(
                init,
                gauge(init, move || Ok(to_i64(pool.read(&*memory)?.init))),
            );
            let memory = Arc::clone(&self.memory);
            instance.set_gauge(
                max,
                gauge(max, move || Ok(to_i64(pool.read(&*memory)?.max))),
            );
            let memory = Arc::clone(&self.memory);
            instance.set_gauge(
                ratio,
                gauge(ratio, move || {
                    let usage = pool.read(&*memory)?;
                    Ok(percentage(usage.used as f64, usage.max as f64))
                }),
            );
        }

        let memory = Arc::clone(&self.memory);
        instance.set_gauge(
            METRICS_MEMORY,
            gauge(METRICS_MEMORY, move || {
                let heap = memory.heap()?;
                let non_heap = memory.non_heap()?;
                Ok(percentage(
                    heap.used as f64 + non_heap.used as f64,
                    heap.max as f64 + non_heap.max as f64,
                ))
            }),
        );
    }

    pub fn record_runtime_metrics(&self, instance: &dyn MetricInstance) {
        let collector = Arc::clone(&self.collector);
        instance.set_gauge(
            METRICS_UPTIME,
            gauge(METRICS_UPTIME, move || {
                let uptime = collector.collect_process_uptime()?;
                Ok(i64::try_from(uptime.as_millis()).unwrap_or(i64::MAX))
            }),
        );

        let collector = Arc::clone(&self.collector);
        instance.set_gauge(
            METRICS_LOAD,
            gauge(METRICS_LOAD, move || {
                let load = collector.collect_loadavg()?;
                let cpus = collector.collect_cpu_count()?;
                Ok(percentage(load.load1, cpus as f64))
            }),
        );

        let threads = ThreadCounter {
            collector: Arc::clone(&self.collector),
            peak: Arc::new(AtomicU64::new(0)),
        };
        let current = threads.clone();
        instance.set_gauge(
            METRICS_CURRENT_THREAD_COUNT,
            gauge(METRICS_CURRENT_THREAD_COUNT, move || {
                Ok(to_i64(current.current()?))
            }),
        );
        instance.set_gauge(
            METRICS_PEAK_THREAD_COUNT,
            gauge(METRICS_PEAK_THREAD_COUNT, move || Ok(to_i64(threads.peak()?))),
        );

        self.register_file_descriptor_gauge(instance);
    }

    /// Registers `fileDescriptorUsed` if descriptors can be counted right now.
    fn register_file_descriptor_gauge(&self, instance: &dyn MetricInstance) {
        let probe = self
            .collector
            .collect_open_fds()
            .and_then(|_| self.collector.collect_open_files_limit());
        if let Err(e) = probe {
            warn!(error = %e, "can not register file descriptor gauge");
            return;
        }

        let collector = Arc::clone(&self.collector);
        instance.set_gauge(
            FILE_DESCRIPTOR_USED,
            gauge(FILE_DESCRIPTOR_USED, move || {
                let open = collector.collect_open_fds()?;
                let limit = collector.collect_open_files_limit()?;
                Ok(percentage(open as f64, limit as f64))
            }),
        );
    }

    pub fn record_file_metrics(&self, instance: &dyn MetricInstance) {
        for (name, store) in self.filestore_usage_metrics() {
            debug!(gauge = %name, mount_point = %store.mount_point, "registering file store gauge");
            let collector = Arc::clone(&self.collector);
            let mount_point = store.mount_point;
            instance.set_gauge(
                &name,
                Arc::new(move || match collector.collect_space(&mount_point) {
                    Ok(space) => percentage(
                        space.total.saturating_sub(space.usable) as f64,
                        space.total as f64,
                    ),
                    Err(e) => {
                        warn!(mount_point = %mount_point, error = %e, "could not read file usage");
                        0
                    }
                }),
            );
        }
    }

    /// Lists the mounted stores worth watching, one per store name.
    pub fn filestores(&self) -> Vec<FileStore> {
        let mounts = match self.collector.collect_mounts() {
            Ok(mounts) => mounts,
            Err(e) => {
                warn!(error = %e, "could not list file stores");
                return Vec::new();
            }
        };

        let mut seen = BTreeSet::new();
        let mut stores = Vec::new();
        for mount in mounts {
            if seen.contains(&mount.device)
                || !store::is_candidate(&mount.device, &mount.fs_type, mount.read_only)
            {
                continue;
            }
            let space = match self.collector.collect_space(&mount.mount_point) {
                Ok(space) => space,
                Err(e) => {
                    warn!(mount_point = %mount.mount_point, error = %e, "skipping unreadable file store");
                    continue;
                }
            };
            let store = FileStore::new(mount, space);
            if !store.is_eligible() {
                debug!(store = %store.name, "skipping file store without usable space");
                continue;
            }
            seen.insert(store.name.clone());
            stores.push(store);
        }
        stores
    }

    /// Gauge name of every watched store.
    pub fn filestore_usage_metrics(&self) -> BTreeMap<String, FileStore> {
        self.filestores()
            .into_iter()
            .map(|store| (store.metric_name(), store))
            .collect()
    }
}

#[derive(Clone, Copy)]
enum Pool {
    Heap,
    NonHeap,
}

impl Pool {
    fn read(self, source: &dyn MemorySource) -> Result<MemoryUsage, CollectError> {
        match self {
            Pool::Heap => source.heap(),
            Pool::NonHeap => source.non_heap(),
        }
    }
}

/// Thread count of the process plus the highest count seen on any read.
struct ThreadCounter<F: FileSystem> {
    collector: Arc<SystemCollector<F>>,
    peak: Arc<AtomicU64>,
}

impl<F: FileSystem> Clone for ThreadCounter<F> {
    fn clone(&self) -> Self {
        Self {
            collector: Arc::clone(&self.collector),
            peak: Arc::clone(&self.peak),
        }
    }
}

impl<F: FileSystem> ThreadCounter<F> {
    fn current(&self) -> Result<u64, CollectError> {
        let threads = self.collector.collect_self_status()?.threads;
        self.peak.fetch_max(threads, Ordering::Relaxed);
        Ok(threads)
    }

    fn peak(&self) -> Result<u64, CollectError> {
        let current = self.current()?;
        Ok(self.peak.load(Ordering::Relaxed).max(current))
    }
}

/// Wraps a fallible reading into a gauge that logs failures and reads 0.
fn gauge<R>(name: &'static str, read: R) -> Arc<dyn MetricGauge>
where
    R: Fn() -> Result<i64, CollectError> + Send + Sync + 'static,
{
    Arc::new(move || match read() {
        Ok(value) => value,
        Err(e) => {
            warn!(gauge = name, error = %e, "gauge read failed");
            0
        }
    })
}

/// `part / whole * 100`, truncated; 0 when `whole` is not positive.
fn percentage(part: f64, whole: f64) -> i64 {
    if whole <= 0.0 {
        return 0;
    }
    (100.0 * part / whole) as i64
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
