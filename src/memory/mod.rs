//! Device memory allocators
//!
//! Backends obtain allocators here and share them through the registry.
//!
//! # Pattern
//!
//! 1. A backend describes the allocator it needs with an
//!    [`AllocatorCreationInfo`]: a factory for its device allocator, the device
//!    ordinal and optional arena tuning.
//! 2. [`create_allocator`] builds either the device allocator itself or an
//!    [`ArenaAllocator`] wrapping it.
//! 3. The result goes into a shared [`AllocatorManager`] so other backends
//!    targeting the same device reuse it instead of reserving their own pool.
//!
//! Kernels only ever see an [`AllocatorPtr`].

pub mod allocator;
pub mod arena;
pub mod factory;
pub mod host;
pub mod manager;
pub mod virtual_device;

pub use allocator::{Allocator, AllocatorPtr, AllocatorStats, DevicePtr};
pub use arena::{ArenaAllocator, ArenaConfig, ArenaExtendStrategy, ArenaSettings};
pub use factory::{create_allocator, AllocatorCreationInfo, DeviceAllocatorFactory};
pub use host::HostAllocator;
pub use manager::AllocatorManager;
pub use virtual_device::{DeviceCallCounters, VirtualDeviceAllocator};
