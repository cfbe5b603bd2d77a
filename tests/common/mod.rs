//! Shared fixtures for allocator integration tests
//!
//! Everything runs against [`VirtualDeviceAllocator`], so no accelerator is
//! needed. [`RecordingFactory`] keeps the call counters of every device
//! allocator it creates so tests can count device round-trips.
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::RecordingFactory;
//!
//! let factory = RecordingFactory::new();
//! let allocator = create_allocator(&factory.creation_info(0))?;
//! allocator.alloc(1024)?;
//! assert_eq!(factory.device_alloc_calls(), 1);
//! ```

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use forge_alloc::memory::{
    Allocator, AllocatorCreationInfo, ArenaAllocator, ArenaConfig, ArenaExtendStrategy,
    DeviceCallCounters, VirtualDeviceAllocator,
};
use forge_alloc::{AllocatorManager, Device};
use once_cell::sync::Lazy;
pub use serial_test::serial;

/// Registry shared by tests that exercise cross-thread lookup
pub static SHARED_MANAGER: Lazy<AllocatorManager> = Lazy::new(AllocatorManager::new);

/// Device allocator factory that remembers what it created
#[derive(Clone, Default)]
pub struct RecordingFactory {
    capacity: Option<usize>,
    created: Arc<Mutex<Vec<Arc<DeviceCallCounters>>>>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device allocators created by this factory fail past `bytes` in use
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            capacity: Some(bytes),
            ..Self::default()
        }
    }

    pub fn creation_info(&self, device_id: u16) -> AllocatorCreationInfo {
        let factory = self.clone();
        AllocatorCreationInfo::new(move |ordinal| {
            let mut device = VirtualDeviceAllocator::new(Device::gpu(ordinal));
            if let Some(capacity) = factory.capacity {
                device = device.with_capacity(capacity);
            }
            factory
                .created
                .lock()
                .unwrap()
                .push(device.counters());
            Ok(Box::new(device) as Box<dyn Allocator>)
        })
        .with_device_id(device_id)
    }

    /// Number of device allocators created so far
    pub fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn counters(&self, idx: usize) -> Arc<DeviceCallCounters> {
        Arc::clone(&self.created.lock().unwrap()[idx])
    }

    pub fn device_alloc_calls(&self) -> usize {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.alloc_calls())
            .sum()
    }

    pub fn device_free_calls(&self) -> usize {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.free_calls())
            .sum()
    }
}

/// Arena over a fresh virtual GPU 0, plus that device's counters
pub fn arena_on_virtual_device(config: ArenaConfig) -> (ArenaAllocator, Arc<DeviceCallCounters>) {
    let device = VirtualDeviceAllocator::new(Device::gpu(0));
    let counters = device.counters();
    let settings = config.resolve().expect("test arena config must be valid");
    (ArenaAllocator::new(Box::new(device), settings), counters)
}

/// SameAsRequested arena with 256-byte initial and growth chunks
pub fn small_same_as_requested() -> ArenaConfig {
    ArenaConfig::new()
        .with_extend_strategy(ArenaExtendStrategy::SameAsRequested)
        .with_initial_chunk_size(256)
        .with_initial_growth_chunk_size(256)
}
