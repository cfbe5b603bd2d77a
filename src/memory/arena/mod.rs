//! Arena allocation strategy
//!
//! An arena holds a few large chunks from a device allocator and serves many
//! smaller allocations out of them. See [`ArenaAllocator`] for the algorithm
//! and [`ArenaConfig`] for its tuning surface.

pub mod allocator;
mod chunk;
pub mod config;

pub use allocator::ArenaAllocator;
pub use config::{
    ArenaConfig, ArenaExtendStrategy, ArenaSettings, ARENA_ALIGNMENT,
    DEFAULT_INITIAL_CHUNK_SIZE_BYTES, DEFAULT_INITIAL_GROWTH_CHUNK_SIZE_BYTES,
    DEFAULT_MAX_DEAD_BYTES_PER_CHUNK,
};
