//! forge-alloc - device-scoped memory allocators
//!
//! Creates per-device allocators, optionally wrapped in a growing arena,
//! and keeps one registry entry per device identity so execution backends
//! share the same pool instead of each reserving their own.

pub mod device;
pub mod error;
pub mod logging;
pub mod memory;

pub use device::{Device, DeviceKey, DeviceMemKind, DeviceOrdinal, DeviceType, MemType, MemoryInfo};
pub use error::{AllocatorError, AllocatorResult, ErrorCategory};
pub use memory::{
    create_allocator, Allocator, AllocatorCreationInfo, AllocatorManager, AllocatorPtr,
    ArenaAllocator, ArenaConfig, ArenaExtendStrategy, DevicePtr,
};
