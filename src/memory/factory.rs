//! Allocator construction from creation info

use std::fmt;
use std::sync::Arc;

use crate::device::DeviceOrdinal;
use crate::error::AllocatorResult;
use crate::memory::{Allocator, AllocatorPtr, ArenaAllocator, ArenaConfig};

/// Produces the device allocator for an ordinal
///
/// Supplied by each backend; the only point of contact with real device
/// memory.
pub type DeviceAllocatorFactory =
    Arc<dyn Fn(DeviceOrdinal) -> AllocatorResult<Box<dyn Allocator>> + Send + Sync>;

/// Everything needed to build one allocator
#[derive(Clone)]
pub struct AllocatorCreationInfo {
    pub device_alloc_factory: DeviceAllocatorFactory,
    pub device_id: DeviceOrdinal,
    pub use_arena: bool,
    pub arena_cfg: ArenaConfig,
}

impl AllocatorCreationInfo {
    /// Arena-backed allocator for device 0 with default tuning
    pub fn new<F>(device_alloc_factory: F) -> Self
    where
        F: Fn(DeviceOrdinal) -> AllocatorResult<Box<dyn Allocator>> + Send + Sync + 'static,
    {
        Self {
            device_alloc_factory: Arc::new(device_alloc_factory),
            device_id: 0,
            use_arena: true,
            arena_cfg: ArenaConfig::default(),
        }
    }

    pub fn with_device_id(mut self, device_id: DeviceOrdinal) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn with_arena(mut self, use_arena: bool) -> Self {
        self.use_arena = use_arena;
        self
    }

    pub fn with_arena_config(mut self, arena_cfg: ArenaConfig) -> Self {
        self.arena_cfg = arena_cfg;
        self
    }
}

impl fmt::Debug for AllocatorCreationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocatorCreationInfo")
            .field("device_id", &self.device_id)
            .field("use_arena", &self.use_arena)
            .field("arena_cfg", &self.arena_cfg)
            .finish_non_exhaustive()
    }
}

/// Build an allocator as described by `info`
///
/// The arena configuration is validated before the device factory runs, so
/// a bad configuration never creates a device allocator. The factory is
/// called exactly once otherwise, and its allocator is owned by the result.
///
/// # Errors
/// - `InvalidExtendStrategy` when the strategy code is not -1, 0 or 1
/// - `InvalidConfiguration` for other malformed arena fields
/// - whatever the device factory returns
pub fn create_allocator(info: &AllocatorCreationInfo) -> AllocatorResult<AllocatorPtr> {
    let settings = if info.use_arena {
        let settings = info.arena_cfg.resolve().map_err(|e| {
            tracing::error!(
                "Rejected arena configuration for device {}: {}",
                info.device_id,
                e
            );
            e
        })?;
        Some(settings)
    } else {
        None
    };

    let device = (info.device_alloc_factory)(info.device_id)?;

    match settings {
        Some(settings) => Ok(Arc::new(ArenaAllocator::new(device, settings))),
        None => {
            tracing::debug!(
                "Using {} directly for {} (no arena)",
                device.info().name,
                device.info().key()
            );
            Ok(Arc::from(device))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{AllocatorKind, Device};
    use crate::error::AllocatorError;
    use crate::memory::{ArenaExtendStrategy, VirtualDeviceAllocator};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_info(calls: Arc<AtomicUsize>) -> AllocatorCreationInfo {
        AllocatorCreationInfo::new(move |ordinal| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(VirtualDeviceAllocator::new(Device::gpu(ordinal))) as Box<dyn Allocator>)
        })
    }

    #[test]
    fn test_defaults() {
        let info = counting_info(Arc::new(AtomicUsize::new(0)));
        assert_eq!(info.device_id, 0);
        assert!(info.use_arena);
        assert_eq!(info.arena_cfg, ArenaConfig::default());
    }

    #[test]
    fn test_arena_allocator_created() {
        let calls = Arc::new(AtomicUsize::new(0));
        let info = counting_info(Arc::clone(&calls)).with_device_id(2);

        let allocator = create_allocator(&info).unwrap();
        assert_eq!(allocator.info().kind, AllocatorKind::Arena);
        assert_eq!(allocator.info().device, Device::gpu(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_direct_allocator_created() {
        let info = counting_info(Arc::new(AtomicUsize::new(0))).with_arena(false);
        let allocator = create_allocator(&info).unwrap();
        assert_eq!(allocator.info().kind, AllocatorKind::Device);
    }

    #[test]
    fn test_invalid_strategy_skips_factory() {
        let calls = Arc::new(AtomicUsize::new(0));
        let info = counting_info(Arc::clone(&calls))
            .with_arena_config(ArenaConfig::new().with_extend_strategy_code(9));

        let result = create_allocator(&info);
        assert!(matches!(result, Err(AllocatorError::InvalidExtendStrategy(9))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_strategy_ignored_without_arena() {
        let info = counting_info(Arc::new(AtomicUsize::new(0)))
            .with_arena(false)
            .with_arena_config(ArenaConfig::new().with_extend_strategy_code(9));
        assert!(create_allocator(&info).is_ok());
    }

    #[test]
    fn test_factory_error_propagates() {
        let info = AllocatorCreationInfo::new(|ordinal| {
            Err(AllocatorError::DeviceNotFound(format!("gpu:{}", ordinal)))
        })
        .with_device_id(7);

        let result = create_allocator(&info);
        assert!(matches!(result, Err(AllocatorError::DeviceNotFound(_))));
    }

    #[test]
    fn test_resolved_strategy_reaches_arena() {
        let device = VirtualDeviceAllocator::new(Device::gpu(0));
        let settings = ArenaConfig::new()
            .with_extend_strategy(ArenaExtendStrategy::SameAsRequested)
            .resolve()
            .unwrap();
        let arena = ArenaAllocator::new(Box::new(device), settings);
        assert_eq!(
            arena.settings().extend_strategy,
            ArenaExtendStrategy::SameAsRequested
        );
    }

    #[test]
    fn test_debug_omits_factory() {
        let info = counting_info(Arc::new(AtomicUsize::new(0)));
        let text = format!("{:?}", info);
        assert!(text.contains("use_arena: true"));
    }
}
