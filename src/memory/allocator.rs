//! Allocator capability shared by device allocators and arenas

use std::fmt;
use std::sync::Arc;

use crate::device::MemoryInfo;
use crate::error::AllocatorResult;

/// Opaque handle to a block of device memory
///
/// For host allocators this is the address itself; for accelerators it is
/// whatever the device runtime returns. Only the allocator that produced a
/// handle may free it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevicePtr(u64);

impl DevicePtr {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn addr(self) -> u64 {
        self.0
    }

    /// Handle `bytes` past this one
    pub fn offset(self, bytes: usize) -> Self {
        Self(self.0 + bytes as u64)
    }
}

impl fmt::Display for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Memory allocator for one device and memory type
///
/// Implementations must be safe to call from any kernel thread.
pub trait Allocator: Send + Sync + fmt::Debug {
    /// Allocate `size` bytes
    ///
    /// # Errors
    /// - `OutOfMemory` when neither the allocator nor the device can serve it
    /// - `InvalidSize` for zero-sized requests
    fn alloc(&self, size: usize) -> AllocatorResult<DevicePtr>;

    /// Release a block obtained from [`Allocator::alloc`] or [`Allocator::reserve`]
    ///
    /// # Errors
    /// `InvalidHandle` for foreign handles and double frees.
    fn free(&self, ptr: DevicePtr) -> AllocatorResult<()>;

    /// Descriptor used for registry lookup
    fn info(&self) -> &MemoryInfo;

    /// Allocate a block that should not be pooled with other traffic
    fn reserve(&self, size: usize) -> AllocatorResult<DevicePtr> {
        self.alloc(size)
    }

    /// Usage counters, when the allocator tracks them
    fn stats(&self) -> Option<AllocatorStats> {
        None
    }
}

/// Shared handle to an allocator
///
/// The registry and every backend that resolved the allocator co-own it.
pub type AllocatorPtr = Arc<dyn Allocator>;

/// Allocation counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Successful `alloc` calls
    pub num_allocs: usize,
    /// Successful `reserve` calls
    pub num_reserves: usize,
    /// Chunks requested from the device
    pub num_arena_extensions: usize,
    /// Chunks returned to the device
    pub num_arena_shrinkages: usize,
    /// Bytes in live blocks (rounded sizes)
    pub bytes_in_use: usize,
    /// Bytes currently held from the device
    pub total_allocated_bytes: usize,
    /// High-water mark of `bytes_in_use`
    pub max_bytes_in_use: usize,
    /// Largest single request served
    pub max_alloc_size: usize,
    /// Configured upper bound, if any
    pub bytes_limit: Option<usize>,
}

impl AllocatorStats {
    pub(crate) fn record_alloc(&mut self, rounded: usize) {
        self.num_allocs += 1;
        self.bytes_in_use += rounded;
        self.max_bytes_in_use = self.max_bytes_in_use.max(self.bytes_in_use);
        self.max_alloc_size = self.max_alloc_size.max(rounded);
    }

    pub(crate) fn record_free(&mut self, rounded: usize) {
        self.bytes_in_use -= rounded;
    }
}

impl fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bytes_limit {
            Some(limit) => writeln!(f, "Limit:                    {}", limit)?,
            None => writeln!(f, "Limit:                    unbounded")?,
        }
        writeln!(f, "InUse:                    {}", self.bytes_in_use)?;
        writeln!(f, "TotalAllocated:           {}", self.total_allocated_bytes)?;
        writeln!(f, "MaxInUse:                 {}", self.max_bytes_in_use)?;
        writeln!(f, "NumAllocs:                {}", self.num_allocs)?;
        writeln!(f, "NumReserves:              {}", self.num_reserves)?;
        writeln!(f, "NumArenaExtensions:       {}", self.num_arena_extensions)?;
        writeln!(f, "NumArenaShrinkages:       {}", self.num_arena_shrinkages)?;
        write!(f, "MaxAllocSize:             {}", self.max_alloc_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_ptr_offset_and_display() {
        let ptr = DevicePtr::new(0x1000);
        assert_eq!(ptr.offset(256).addr(), 0x1100);
        assert_eq!(ptr.to_string(), "0x1000");
    }

    #[test]
    fn test_stats_high_water_mark() {
        let mut stats = AllocatorStats::default();
        stats.record_alloc(512);
        stats.record_alloc(256);
        stats.record_free(512);
        stats.record_alloc(256);

        assert_eq!(stats.num_allocs, 3);
        assert_eq!(stats.bytes_in_use, 512);
        assert_eq!(stats.max_bytes_in_use, 768);
        assert_eq!(stats.max_alloc_size, 512);
    }

    #[test]
    fn test_stats_display_mentions_limit() {
        let stats = AllocatorStats {
            bytes_limit: Some(4096),
            ..Default::default()
        };
        let text = stats.to_string();
        assert!(text.contains("Limit:                    4096"));
        assert!(text.contains("NumAllocs:                0"));
    }

    #[test]
    fn test_allocator_ptr_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AllocatorPtr>();
    }
}
