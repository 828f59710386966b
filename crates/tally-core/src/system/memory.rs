//! Heap and non-heap usage of the current process.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::collector::procfs::{CollectError, SystemCollector};
use crate::collector::traits::FileSystem;

/// A memory pool reading in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    /// Usage when the source was created.
    pub init: u64,
    pub used: u64,
    pub max: u64,
}

/// Where the memory gauges read their figures from.
pub trait MemorySource: Send + Sync {
    fn heap(&self) -> Result<MemoryUsage, CollectError>;

    fn non_heap(&self) -> Result<MemoryUsage, CollectError>;

    /// Memory released by the program but not yet returned to the system.
    fn pending_reclaim(&self) -> Result<u64, CollectError> {
        Ok(0)
    }
}

/// Memory figures from `/proc/self/status` and `/proc/meminfo`.
///
/// Heap is the data segment (`VmData`) against total RAM. Non-heap is stack,
/// text and shared libraries (`VmStk + VmExe + VmLib`) against the whole
/// address space (`VmSize`).
pub struct ProcMemory<F: FileSystem> {
    collector: Arc<SystemCollector<F>>,
    heap_init: u64,
    non_heap_init: u64,
}

impl<F: FileSystem> ProcMemory<F> {
    pub fn new(collector: Arc<SystemCollector<F>>) -> Self {
        let (heap_init, non_heap_init) = match collector.collect_self_status() {
            Ok(status) => (
                status.vm_data * 1024,
                (status.vm_stk + status.vm_exe + status.vm_lib) * 1024,
            ),
            Err(e) => {
                debug!(error = %e, "initial memory figures unavailable");
                (0, 0)
            }
        };
        Self {
            collector,
            heap_init,
            non_heap_init,
        }
    }
}

impl<F: FileSystem> MemorySource for ProcMemory<F> {
    fn heap(&self) -> Result<MemoryUsage, CollectError> {
        let status = self.collector.collect_self_status()?;
        let meminfo = self.collector.collect_meminfo()?;
        Ok(MemoryUsage {
            init: self.heap_init,
            used: status.vm_data * 1024,
            max: meminfo.mem_total * 1024,
        })
    }

    fn non_heap(&self) -> Result<MemoryUsage, CollectError> {
        let status = self.collector.collect_self_status()?;
        Ok(MemoryUsage {
            init: self.non_heap_init,
            used: (status.vm_stk + status.vm_exe + status.vm_lib) * 1024,
            max: status.vm_size * 1024,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    #[test]
    fn test_proc_memory_typical() {
        let collector = Arc::new(SystemCollector::new(MockFs::typical_system(), "/proc"));
        let source = ProcMemory::new(collector);

        let heap = source.heap().unwrap();
        assert_eq!(heap.used, 2_000_000 * 1024);
        assert_eq!(heap.max, 8_000_000 * 1024);
        assert_eq!(heap.init, heap.used);

        let non_heap = source.non_heap().unwrap();
        assert_eq!(non_heap.used, 1_000_000 * 1024);
        assert_eq!(non_heap.max, 4_000_000 * 1024);
        assert_eq!(source.pending_reclaim().unwrap(), 0);
    }

    #[test]
    fn test_proc_memory_without_status() {
        let collector = Arc::new(SystemCollector::new(MockFs::new(), "/proc"));
        let source = ProcMemory::new(collector);
        assert!(source.heap().is_err());
        assert!(source.non_heap().is_err());
    }
}
