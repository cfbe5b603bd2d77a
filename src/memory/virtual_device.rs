//! Address-space-only device allocator
//!
//! Hands out deterministic, never-reused addresses without touching real
//! memory. Arena and registry behavior can be exercised (and benchmarked)
//! through it on machines without an accelerator, and its call counters make
//! the number of device round-trips observable.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::device::{AllocatorKind, Device, MemType, MemoryInfo};
use crate::error::{AllocatorError, AllocatorResult};
use crate::memory::{Allocator, AllocatorStats, DevicePtr};

/// Counters shared between a [`VirtualDeviceAllocator`] and its observers
///
/// Keep a clone of the `Arc` before handing the allocator to a factory to
/// observe the device traffic an arena generates.
#[derive(Debug, Default)]
pub struct DeviceCallCounters {
    pub alloc_calls: AtomicUsize,
    pub free_calls: AtomicUsize,
    pub bytes_in_use: AtomicUsize,
}

impl DeviceCallCounters {
    pub fn alloc_calls(&self) -> usize {
        self.alloc_calls.load(Ordering::SeqCst)
    }

    pub fn free_calls(&self) -> usize {
        self.free_calls.load(Ordering::SeqCst)
    }

    pub fn bytes_in_use(&self) -> usize {
        self.bytes_in_use.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct AddressSpace {
    next: u64,
    live: BTreeMap<DevicePtr, usize>,
}

/// Fake device allocator with deterministic addresses
#[derive(Debug)]
pub struct VirtualDeviceAllocator {
    info: MemoryInfo,
    capacity: Option<usize>,
    space: Mutex<AddressSpace>,
    counters: Arc<DeviceCallCounters>,
}

impl VirtualDeviceAllocator {
    pub const BASE_ADDRESS: u64 = 0x1000_0000;
    pub const ALIGNMENT: u64 = 256;

    pub fn new(device: Device) -> Self {
        Self {
            info: MemoryInfo::new("Virtual", AllocatorKind::Device, device, MemType::Default),
            capacity: None,
            space: Mutex::new(AddressSpace {
                next: Self::BASE_ADDRESS,
                live: BTreeMap::new(),
            }),
            counters: Arc::new(DeviceCallCounters::default()),
        }
    }

    /// Fail with `OutOfMemory` once more than `bytes` would be in use
    pub fn with_capacity(mut self, bytes: usize) -> Self {
        self.capacity = Some(bytes);
        self
    }

    pub fn with_mem_type(mut self, mem_type: MemType) -> Self {
        self.info.mem_type = mem_type;
        self
    }

    pub fn counters(&self) -> Arc<DeviceCallCounters> {
        Arc::clone(&self.counters)
    }

    /// Sizes of the live device allocations, in address order
    pub fn live_sizes(&self) -> Vec<usize> {
        self.space
            .lock()
            .map(|space| space.live.values().copied().collect())
            .unwrap_or_default()
    }
}

impl Allocator for VirtualDeviceAllocator {
    fn alloc(&self, size: usize) -> AllocatorResult<DevicePtr> {
        self.counters.alloc_calls.fetch_add(1, Ordering::SeqCst);
        if size == 0 {
            return Err(AllocatorError::InvalidSize(size));
        }

        let mut space = self.space.lock()?;
        let in_use = self.counters.bytes_in_use();
        if let Some(capacity) = self.capacity {
            if in_use + size > capacity {
                return Err(AllocatorError::out_of_memory(
                    size,
                    format!(
                        "virtual device {} has {} of {} bytes in use",
                        self.info.device, in_use, capacity
                    ),
                ));
            }
        }

        let ptr = DevicePtr::new(space.next);
        let stride = (size as u64).div_ceil(Self::ALIGNMENT) * Self::ALIGNMENT;
        space.next += stride;
        space.live.insert(ptr, size);
        self.counters.bytes_in_use.fetch_add(size, Ordering::SeqCst);
        Ok(ptr)
    }

    fn free(&self, ptr: DevicePtr) -> AllocatorResult<()> {
        self.counters.free_calls.fetch_add(1, Ordering::SeqCst);
        let size = self
            .space
            .lock()?
            .live
            .remove(&ptr)
            .ok_or(AllocatorError::InvalidHandle(ptr))?;
        self.counters.bytes_in_use.fetch_sub(size, Ordering::SeqCst);
        Ok(())
    }

    fn info(&self) -> &MemoryInfo {
        &self.info
    }

    fn stats(&self) -> Option<AllocatorStats> {
        let in_use = self.counters.bytes_in_use();
        Some(AllocatorStats {
            num_allocs: self.counters.alloc_calls(),
            bytes_in_use: in_use,
            total_allocated_bytes: in_use,
            bytes_limit: self.capacity,
            ..Default::default()
        })
    }
}
