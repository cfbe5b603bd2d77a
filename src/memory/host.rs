//! Direct host allocator backed by the system heap

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::device::{AllocatorKind, Device, MemType, MemoryInfo};
use crate::error::{AllocatorError, AllocatorResult};
use crate::memory::{Allocator, AllocatorStats, DevicePtr};

/// CPU allocator with no pooling: every `alloc` is one heap allocation
///
/// Blocks are zeroed and 64-byte aligned (AVX-512 width). Live layouts are
/// tracked so `free` can reject handles it never produced.
#[derive(Debug)]
pub struct HostAllocator {
    info: MemoryInfo,
    live: Mutex<HashMap<DevicePtr, Layout>>,
    stats: Mutex<AllocatorStats>,
}

impl HostAllocator {
    pub const ALIGNMENT: usize = 64;

    pub fn new() -> Self {
        Self::with_mem_type(MemType::Default)
    }

    /// Host allocator registered under a CPU-visible mem type of another provider
    pub fn with_mem_type(mem_type: MemType) -> Self {
        Self {
            info: MemoryInfo::new("Cpu", AllocatorKind::Device, Device::cpu(), mem_type),
            live: Mutex::new(HashMap::new()),
            stats: Mutex::new(AllocatorStats::default()),
        }
    }

    /// Number of blocks not yet freed
    pub fn live_count(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or(0)
    }
}

impl Default for HostAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for HostAllocator {
    fn alloc(&self, size: usize) -> AllocatorResult<DevicePtr> {
        if size == 0 {
            return Err(AllocatorError::InvalidSize(size));
        }

        let layout = Layout::from_size_align(size, Self::ALIGNMENT)
            .map_err(|e| {
                AllocatorError::InvalidConfiguration(format!("cannot lay out {} bytes: {}", size, e))
            })?;

        // SAFETY: layout has non-zero size
        let raw = unsafe { alloc_zeroed(layout) };
        if raw.is_null() {
            tracing::warn!("HostAllocator: system heap refused {} bytes", size);
            return Err(AllocatorError::out_of_memory(size, "system heap exhausted"));
        }

        let ptr = DevicePtr::new(raw as u64);
        self.live.lock()?.insert(ptr, layout);
        self.stats.lock()?.record_alloc(size);
        tracing::trace!("HostAllocator allocated {} bytes at {}", size, ptr);
        Ok(ptr)
    }

    fn free(&self, ptr: DevicePtr) -> AllocatorResult<()> {
        let layout = self
            .live
            .lock()?
            .remove(&ptr)
            .ok_or(AllocatorError::InvalidHandle(ptr))?;

        // SAFETY: ptr was returned by alloc_zeroed with this exact layout and
        // has just been removed from the live set, so it is freed once
        unsafe { dealloc(ptr.addr() as *mut u8, layout) };
        self.stats.lock()?.record_free(layout.size());
        tracing::trace!("HostAllocator freed {} bytes at {}", layout.size(), ptr);
        Ok(())
    }

    fn info(&self) -> &MemoryInfo {
        &self.info
    }

    fn stats(&self) -> Option<AllocatorStats> {
        self.stats.lock().ok().map(|stats| stats.clone())
    }
}

impl Drop for HostAllocator {
    fn drop(&mut self) {
        let live = match self.live.get_mut() {
            Ok(live) => live,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !live.is_empty() {
            tracing::warn!(
                "HostAllocator dropped with {} live blocks, releasing them",
                live.len()
            );
        }
        for (ptr, layout) in live.drain() {
            // SAFETY: every entry is a live allocation made with its layout
            unsafe { dealloc(ptr.addr() as *mut u8, layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_alloc_is_aligned_and_zeroed() {
        let allocator = HostAllocator::new();
        let ptr = allocator.alloc(100).unwrap();
        assert_eq!(ptr.addr() % HostAllocator::ALIGNMENT as u64, 0);

        // SAFETY: 100 bytes were just allocated at ptr
        let bytes = unsafe { std::slice::from_raw_parts(ptr.addr() as *const u8, 100) };
        assert!(bytes.iter().all(|&b| b == 0));

        allocator.free(ptr).unwrap();
        assert_eq!(allocator.live_count(), 0);
    }

    #[test]
    fn test_host_zero_size_fails() {
        let allocator = HostAllocator::new();
        assert!(matches!(
            allocator.alloc(0),
            Err(AllocatorError::InvalidSize(0))
        ));
    }

    #[test]
    fn test_host_double_free_is_rejected() {
        let allocator = HostAllocator::new();
        let ptr = allocator.alloc(32).unwrap();
        allocator.free(ptr).unwrap();

        let result = allocator.free(ptr);
        assert!(matches!(result, Err(AllocatorError::InvalidHandle(p)) if p == ptr));
    }

    #[test]
    fn test_host_stats() {
        let allocator = HostAllocator::new();
        let a = allocator.alloc(128).unwrap();
        let b = allocator.alloc(64).unwrap();
        allocator.free(a).unwrap();

        let stats = allocator.stats().unwrap();
        assert_eq!(stats.num_allocs, 2);
        assert_eq!(stats.bytes_in_use, 64);
        assert_eq!(stats.max_bytes_in_use, 192);

        allocator.free(b).unwrap();
    }

    #[test]
    fn test_host_info() {
        let allocator = HostAllocator::with_mem_type(MemType::CpuInput);
        assert_eq!(allocator.info().device, Device::cpu());
        assert_eq!(allocator.info().mem_type, MemType::CpuInput);
        assert_eq!(allocator.info().kind, AllocatorKind::Device);
    }
}
