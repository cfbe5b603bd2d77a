//! Growable memory arena over a device allocator
//!
//! Serves most alloc/free traffic from chunks already held from the device,
//! so the expensive (and often synchronizing) device allocator is only called
//! when the arena has to grow or give memory back.
//!
//! - Best-fit free block search across all chunks, ties broken by chunk
//!   creation order then offset, so a fixed call sequence always produces the
//!   same layout
//! - Adjacent free blocks within a chunk are merged on free
//! - Chunk sizes follow [`ArenaExtendStrategy`]
//! - A chunk whose dead bytes exceed `max_dead_bytes_per_chunk` is returned to
//!   the device once its last live block is freed
//!
//! # Thread Safety
//!
//! All state sits behind one mutex. Extension calls the device allocator
//! while holding it.

use std::sync::Mutex;

use super::chunk::Chunk;
use super::config::{align_up, ArenaExtendStrategy, ArenaSettings, ARENA_ALIGNMENT};
use crate::device::{AllocatorKind, MemoryInfo};
use crate::error::{AllocatorError, AllocatorResult};
use crate::memory::{Allocator, AllocatorStats, DevicePtr};

#[derive(Debug, Default)]
struct ArenaState {
    /// Creation order
    chunks: Vec<Chunk>,
    next_chunk_id: u64,
    stats: AllocatorStats,
}

impl ArenaState {
    /// Best fit over regular chunks: `(chunk index, block index)`
    fn best_fit(&self, size: usize) -> Option<(usize, usize)> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.reserved)
            .filter_map(|(ci, c)| c.best_fit(size).map(|(bi, block_size)| (ci, bi, block_size)))
            .min_by_key(|&(_, _, block_size)| block_size)
            .map(|(ci, bi, _)| (ci, bi))
    }

    fn largest_regular_chunk(&self) -> Option<usize> {
        self.chunks
            .iter()
            .filter(|c| !c.reserved)
            .map(|c| c.size)
            .max()
    }

    fn chunk_holding(&self, ptr: DevicePtr) -> Option<usize> {
        self.chunks.iter().position(|c| c.contains(ptr))
    }
}

/// Arena-backed allocator
///
/// # Example
///
/// ```rust,ignore
/// let device = VirtualDeviceAllocator::new(Device::gpu(0));
/// let settings = ArenaConfig::new()
///     .with_extend_strategy(ArenaExtendStrategy::SameAsRequested)
///     .resolve()?;
/// let arena = ArenaAllocator::new(Box::new(device), settings);
///
/// let ptr = arena.alloc(1000)?;
/// arena.free(ptr)?;
/// ```
#[derive(Debug)]
pub struct ArenaAllocator {
    device: Box<dyn Allocator>,
    info: MemoryInfo,
    settings: ArenaSettings,
    state: Mutex<ArenaState>,
}

impl ArenaAllocator {
    /// Wrap `device`; no device memory is requested until the first allocation
    pub fn new(device: Box<dyn Allocator>, settings: ArenaSettings) -> Self {
        let info = device.info().with_kind(AllocatorKind::Arena);

        tracing::info!(
            "ArenaAllocator created for {}: strategy={:?}, initial_chunk={} bytes, limit={}",
            info.key(),
            settings.extend_strategy,
            settings.initial_chunk_size,
            settings
                .max_memory
                .map_or_else(|| "unbounded".to_string(), |m| format!("{} bytes", m))
        );

        let state = ArenaState {
            stats: AllocatorStats {
                bytes_limit: settings.max_memory,
                ..Default::default()
            },
            ..Default::default()
        };

        Self {
            device,
            info,
            settings,
            state: Mutex::new(state),
        }
    }

    pub fn settings(&self) -> &ArenaSettings {
        &self.settings
    }

    /// Number of chunks currently held from the device
    pub fn chunk_count(&self) -> usize {
        self.state.lock().map(|s| s.chunks.len()).unwrap_or(0)
    }

    /// Chunk sizes in creation order
    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.state
            .lock()
            .map(|s| s.chunks.iter().map(|c| c.size).collect())
            .unwrap_or_default()
    }

    pub fn live_block_count(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.chunks.iter().map(Chunk::live_count).sum())
            .unwrap_or(0)
    }

    /// Free bytes across all chunks
    pub fn free_bytes(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.chunks.iter().map(Chunk::free_bytes).sum())
            .unwrap_or(0)
    }

    /// 0.0 when free memory is one contiguous block, approaching 1.0 as it scatters
    pub fn fragmentation(&self) -> f32 {
        let Ok(state) = self.state.lock() else {
            return 0.0;
        };
        let free: usize = state.chunks.iter().map(Chunk::free_bytes).sum();
        if free == 0 {
            return 0.0;
        }
        let largest = state
            .chunks
            .iter()
            .map(Chunk::largest_free_block)
            .max()
            .unwrap_or(0);
        1.0 - (largest as f32 / free as f32)
    }

    /// Return every chunk without live blocks to the device
    ///
    /// Returns the number of bytes released.
    pub fn shrink(&self) -> AllocatorResult<usize> {
        let mut state = self.state.lock()?;
        let released = self.release_idle_chunks(&mut state);
        if released > 0 {
            tracing::debug!("{}: shrink released {} bytes", self.info.name, released);
        }
        Ok(released)
    }

    fn release_idle_chunks(&self, state: &mut ArenaState) -> usize {
        let mut released = 0;
        let mut idx = 0;
        while idx < state.chunks.len() {
            if state.chunks[idx].has_live_blocks() {
                idx += 1;
            } else {
                released += self.release_chunk(state, idx);
            }
        }
        released
    }

    fn rounded_size(&self, size: usize) -> AllocatorResult<usize> {
        if size == 0 {
            return Err(AllocatorError::InvalidSize(size));
        }
        let rounded = align_up(size).ok_or(AllocatorError::InvalidSize(size))?;
        if let Some(limit) = self.settings.max_memory {
            if rounded > limit {
                tracing::warn!(
                    "{}: request of {} bytes exceeds arena limit {}",
                    self.info.name,
                    size,
                    limit
                );
                return Err(AllocatorError::out_of_memory(
                    size,
                    format!("arena limit is {} bytes", limit),
                ));
            }
        }
        Ok(rounded)
    }

    /// Size of the next chunk before the memory limit is applied
    ///
    /// A power of two past `usize::MAX` falls back to the limit, which
    /// `fit_to_limit` then clamps; without a limit the request is out of memory.
    fn next_chunk_size(&self, state: &ArenaState, rounded: usize) -> AllocatorResult<usize> {
        let largest = state.largest_regular_chunk();
        let next_power_of_two = |floor: usize| {
            rounded
                .max(floor)
                .checked_next_power_of_two()
                .or(self.settings.max_memory)
                .ok_or_else(|| {
                    AllocatorError::out_of_memory(
                        rounded,
                        "no power-of-two chunk can hold the request",
                    )
                })
        };
        match (self.settings.extend_strategy, largest) {
            (ArenaExtendStrategy::SameAsRequested, None) => {
                Ok(rounded.max(self.settings.initial_chunk_size))
            }
            (ArenaExtendStrategy::SameAsRequested, Some(_)) => {
                Ok(rounded.max(self.settings.initial_growth_chunk_size))
            }
            (ArenaExtendStrategy::NextPowerOfTwo, None) => {
                next_power_of_two(self.settings.initial_chunk_size)
            }
            (ArenaExtendStrategy::NextPowerOfTwo, Some(largest)) => next_power_of_two(largest),
        }
    }

    fn available_budget(state: &ArenaState, limit: usize) -> usize {
        limit.saturating_sub(state.stats.total_allocated_bytes) & !(ARENA_ALIGNMENT - 1)
    }

    /// Clamp a chunk size to the remaining budget
    ///
    /// Chunks without live blocks count against the limit, so they are given
    /// back to the device before a request is refused.
    fn fit_to_limit(
        &self,
        state: &mut ArenaState,
        rounded: usize,
        desired: usize,
    ) -> AllocatorResult<usize> {
        let Some(limit) = self.settings.max_memory else {
            return Ok(desired);
        };
        let mut available = Self::available_budget(state, limit);
        if available < rounded {
            let released = self.release_idle_chunks(state);
            if released > 0 {
                tracing::debug!(
                    "{}: released {} idle bytes to fit {} under the limit",
                    self.info.name,
                    released,
                    rounded
                );
                available = Self::available_budget(state, limit);
            }
        }
        if available < rounded {
            let held = state.stats.total_allocated_bytes;
            tracing::warn!(
                "{}: out of memory, need {} bytes, {} of {} held",
                self.info.name,
                rounded,
                held,
                limit
            );
            return Err(AllocatorError::out_of_memory(
                rounded,
                format!("arena holds {} of {} bytes", held, limit),
            ));
        }
        Ok(desired.min(available))
    }

    /// Request a chunk from the device; returns its index
    fn extend(&self, state: &mut ArenaState, rounded: usize) -> AllocatorResult<usize> {
        let desired = self.next_chunk_size(state, rounded)?;
        let chunk_size = self.fit_to_limit(state, rounded, desired)?;

        let base = self.device.alloc(chunk_size).map_err(|e| {
            tracing::warn!(
                "{}: device refused chunk of {} bytes: {}",
                self.info.name,
                chunk_size,
                e
            );
            e
        })?;

        let id = state.next_chunk_id;
        state.next_chunk_id += 1;
        state.chunks.push(Chunk::new(id, base, chunk_size));
        state.stats.num_arena_extensions += 1;
        state.stats.total_allocated_bytes += chunk_size;

        tracing::debug!(
            "{}: extended with chunk #{} of {} bytes at {} (total {} bytes in {} chunks)",
            self.info.name,
            id,
            chunk_size,
            base,
            state.stats.total_allocated_bytes,
            state.chunks.len()
        );
        Ok(state.chunks.len() - 1)
    }

    /// Drop chunk `idx` and return it to the device
    ///
    /// The chunk leaves the arena even if the device refuses it back; the
    /// refusal is logged.
    fn release_chunk(&self, state: &mut ArenaState, idx: usize) -> usize {
        let chunk = state.chunks.remove(idx);
        state.stats.total_allocated_bytes -= chunk.size;
        state.stats.num_arena_shrinkages += 1;
        tracing::debug!(
            "{}: releasing chunk #{} of {} bytes (dead bytes {})",
            self.info.name,
            chunk.id,
            chunk.size,
            chunk.dead_bytes
        );
        if let Err(e) = self.device.free(chunk.base) {
            tracing::error!(
                "{}: failed to return chunk #{} at {}: {}",
                self.info.name,
                chunk.id,
                chunk.base,
                e
            );
        }
        chunk.size
    }
}

impl Allocator for ArenaAllocator {
    fn alloc(&self, size: usize) -> AllocatorResult<DevicePtr> {
        let rounded = self.rounded_size(size)?;
        let mut state = self.state.lock()?;

        let found = state.best_fit(rounded);
        let (ci, bi) = match found {
            Some(found) => found,
            None => (self.extend(&mut state, rounded)?, 0),
        };
        let ptr = state.chunks[ci].take(bi, rounded);
        state.stats.record_alloc(rounded);

        tracing::trace!("{}: allocated {} bytes ({} rounded) at {}", self.info.name, size, rounded, ptr);
        Ok(ptr)
    }

    fn free(&self, ptr: DevicePtr) -> AllocatorResult<()> {
        let mut state = self.state.lock()?;

        let ci = state
            .chunk_holding(ptr)
            .ok_or(AllocatorError::InvalidHandle(ptr))?;
        let bi = state.chunks[ci]
            .live_block_at(ptr)
            .ok_or(AllocatorError::InvalidHandle(ptr))?;

        let size = state.chunks[ci].release(bi);
        state.stats.record_free(size);
        tracing::trace!("{}: freed {} bytes at {}", self.info.name, size, ptr);

        let chunk = &state.chunks[ci];
        if chunk.reserved {
            self.release_chunk(&mut state, ci);
        } else if chunk.has_live_blocks() {
            state.chunks[ci].dead_bytes += size;
        } else if chunk.dead_bytes > self.settings.max_dead_bytes_per_chunk {
            self.release_chunk(&mut state, ci);
        }
        Ok(())
    }

    fn info(&self) -> &MemoryInfo {
        &self.info
    }

    /// Dedicated chunk of exactly the rounded size, returned to the device on free
    fn reserve(&self, size: usize) -> AllocatorResult<DevicePtr> {
        let rounded = self.rounded_size(size)?;
        let mut state = self.state.lock()?;
        let chunk_size = self.fit_to_limit(&mut state, rounded, rounded)?;

        let base = self.device.alloc(chunk_size)?;
        let id = state.next_chunk_id;
        state.next_chunk_id += 1;

        let mut chunk = Chunk::new(id, base, chunk_size);
        chunk.reserved = true;
        let ptr = chunk.take(0, rounded);
        state.chunks.push(chunk);

        state.stats.num_reserves += 1;
        state.stats.total_allocated_bytes += chunk_size;
        state.stats.bytes_in_use += rounded;
        state.stats.max_bytes_in_use = state.stats.max_bytes_in_use.max(state.stats.bytes_in_use);

        tracing::debug!("{}: reserved {} bytes at {}", self.info.name, rounded, ptr);
        Ok(ptr)
    }

    fn stats(&self) -> Option<AllocatorStats> {
        self.state.lock().ok().map(|s| s.stats.clone())
    }
}

impl Drop for ArenaAllocator {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let live: usize = state.chunks.iter().map(Chunk::live_count).sum();
        if live > 0 {
            tracing::warn!(
                "{}: dropped with {} live blocks ({} bytes in use)",
                self.info.name,
                live,
                state.stats.bytes_in_use
            );
        }
        for chunk in state.chunks.drain(..) {
            if let Err(e) = self.device.free(chunk.base) {
                tracing::error!(
                    "{}: failed to return chunk #{} at {}: {}",
                    self.info.name,
                    chunk.id,
                    chunk.base,
                    e
                );
            }
        }
    }
}
