//! Memory figures straight from jemalloc.

use std::ffi::CStr;
use std::sync::Arc;

use tally_core::collector::{CollectError, FileSystem, SystemCollector};
use tally_core::system::{MemorySource, MemoryUsage, ProcMemory};

/// Heap figures from the allocator, non-heap figures from procfs.
///
/// Heap used is `stats.allocated` against `stats.resident`; pending
/// reclamation is the size of dirty pages not yet purged.
pub struct JemallocMemory<F: FileSystem> {
    procfs: ProcMemory<F>,
    heap_init: u64,
}

impl<F: FileSystem> JemallocMemory<F> {
    pub fn new(collector: Arc<SystemCollector<F>>) -> Self {
        let heap_init = read_stat(c"stats.allocated").unwrap_or(0);
        Self {
            procfs: ProcMemory::new(collector),
            heap_init,
        }
    }
}

impl<F: FileSystem> MemorySource for JemallocMemory<F> {
    fn heap(&self) -> Result<MemoryUsage, CollectError> {
        Ok(MemoryUsage {
            init: self.heap_init,
            used: read_stat(c"stats.allocated")?,
            max: read_stat(c"stats.resident")?,
        })
    }

    fn non_heap(&self) -> Result<MemoryUsage, CollectError> {
        self.procfs.non_heap()
    }

    fn pending_reclaim(&self) -> Result<u64, CollectError> {
        // Arena 4096 is MALLCTL_ARENAS_ALL, the merge of every arena.
        let pages = read_stat(c"stats.arenas.4096.pdirty")?;
        let page_size = read_size(c"arenas.page")?;
        Ok(pages.saturating_mul(page_size as u64))
    }
}

/// Refreshes the statistics snapshot and reads one `size_t` statistic.
fn read_stat(name: &CStr) -> Result<u64, CollectError> {
    advance_epoch()?;
    read_size(name).map(|value| value as u64)
}

fn advance_epoch() -> Result<(), CollectError> {
    let mut epoch: u64 = 1;
    // SAFETY: "epoch" takes a u64 and the length matches the buffer.
    let rc = unsafe {
        tikv_jemalloc_sys::mallctl(
            c"epoch".as_ptr().cast(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            (&mut epoch as *mut u64).cast(),
            size_of::<u64>(),
        )
    };
    check(c"epoch", rc)
}

fn read_size(name: &CStr) -> Result<usize, CollectError> {
    let mut value: usize = 0;
    let mut len = size_of::<usize>();
    // SAFETY: the statistics read here are all size_t and `len` describes
    // the output buffer.
    let rc = unsafe {
        tikv_jemalloc_sys::mallctl(
            name.as_ptr().cast(),
            (&mut value as *mut usize).cast(),
            &mut len,
            std::ptr::null_mut(),
            0,
        )
    };
    check(name, rc).map(|()| value)
}

fn check(name: &CStr, rc: i32) -> Result<(), CollectError> {
    if rc == 0 {
        Ok(())
    } else {
        Err(CollectError::Unsupported(format!(
            "mallctl {} failed with code {}",
            name.to_string_lossy(),
            rc
        )))
    }
}
