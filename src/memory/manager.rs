//! Registry of allocators shared across backends

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::device::{Device, DeviceKey, MemType};
use crate::error::{AllocatorError, AllocatorResult};
use crate::memory::AllocatorPtr;

/// Maps a device identity to the one allocator serving it
///
/// Each mutation is a single map operation, so a lock poisoned by a
/// panicking reader or writer still guards a consistent map and is
/// recovered rather than surfaced.
#[derive(Debug, Default)]
pub struct AllocatorManager {
    allocators: RwLock<HashMap<DeviceKey, AllocatorPtr>>,
}

impl AllocatorManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<DeviceKey, AllocatorPtr>> {
        self.allocators.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<DeviceKey, AllocatorPtr>> {
        self.allocators.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `allocator` under the identity in its memory info
    ///
    /// # Errors
    /// `DuplicateAllocator` if that identity is already registered; the
    /// existing entry is left in place.
    pub fn insert_allocator(&self, allocator: AllocatorPtr) -> AllocatorResult<()> {
        let key = allocator.info().key();
        let mut map = self.write();
        if map.contains_key(&key) {
            tracing::warn!("Allocator for {} already registered", key);
            return Err(AllocatorError::DuplicateAllocator(key));
        }
        tracing::info!("Registered {} allocator for {}", allocator.info().name, key);
        map.insert(key, allocator);
        Ok(())
    }

    /// Register `allocator`, displacing whatever was there
    ///
    /// The displaced allocator stays alive for anyone still holding it.
    pub fn replace_allocator(&self, allocator: AllocatorPtr) -> Option<AllocatorPtr> {
        let key = allocator.info().key();
        let name = allocator.info().name.clone();
        let previous = self.write().insert(key, allocator);
        match &previous {
            Some(old) => tracing::info!(
                "Replaced {} allocator for {} with {}",
                old.info().name,
                key,
                name
            ),
            None => tracing::info!("Registered {} allocator for {}", name, key),
        }
        previous
    }

    pub fn get_allocator(&self, mem_type: MemType, device: Device) -> Option<AllocatorPtr> {
        self.read().get(&DeviceKey::new(mem_type, device)).cloned()
    }

    /// Look up an allocator, creating and registering it if absent
    ///
    /// `create` runs under the write lock, so concurrent callers for the same
    /// identity get the same instance and `create` runs at most once.
    ///
    /// # Errors
    /// - whatever `create` returns
    /// - `InvalidConfiguration` if the created allocator reports a different
    ///   identity than the one requested
    pub fn get_or_insert_with<F>(
        &self,
        mem_type: MemType,
        device: Device,
        create: F,
    ) -> AllocatorResult<AllocatorPtr>
    where
        F: FnOnce() -> AllocatorResult<AllocatorPtr>,
    {
        let key = DeviceKey::new(mem_type, device);
        if let Some(existing) = self.read().get(&key) {
            return Ok(existing.clone());
        }

        let mut map = self.write();
        // Another caller may have won the race between the two locks.
        if let Some(existing) = map.get(&key) {
            return Ok(existing.clone());
        }

        let allocator = create()?;
        let created_key = allocator.info().key();
        if created_key != key {
            return Err(AllocatorError::InvalidConfiguration(format!(
                "allocator created for {} reports {}",
                key, created_key
            )));
        }

        tracing::info!("Registered {} allocator for {}", allocator.info().name, key);
        map.insert(key, allocator.clone());
        Ok(allocator)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Registered identities in ascending order
    pub fn keys(&self) -> Vec<DeviceKey> {
        let mut keys: Vec<DeviceKey> = self.read().keys().copied().collect();
        keys.sort();
        keys
    }
}
