//! Arena configuration types
//!
//! [`ArenaConfig`] is the user-facing record (serde-loadable, every tuning
//! field optional). [`ArenaSettings`] is what an arena actually runs with,
//! produced by [`ArenaConfig::resolve`].

use serde::{Deserialize, Serialize};

use crate::error::{AllocatorError, AllocatorResult};

/// Every block handed out by an arena is a multiple of this
pub const ARENA_ALIGNMENT: usize = 256;

pub const DEFAULT_INITIAL_CHUNK_SIZE_BYTES: usize = 1024 * 1024;
pub const DEFAULT_MAX_DEAD_BYTES_PER_CHUNK: usize = 128 * 1024 * 1024;
pub const DEFAULT_INITIAL_GROWTH_CHUNK_SIZE_BYTES: usize = 2 * 1024 * 1024;

/// Policy for sizing the chunk requested when an arena grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArenaExtendStrategy {
    /// Smallest power of two covering the request and the largest chunk so far
    #[default]
    NextPowerOfTwo,
    /// The rounded request, or the initial growth size if larger
    SameAsRequested,
}

impl ArenaExtendStrategy {
    /// Code meaning "let the arena pick"
    pub const UNSPECIFIED: i32 = -1;

    pub fn code(self) -> i32 {
        match self {
            ArenaExtendStrategy::NextPowerOfTwo => 0,
            ArenaExtendStrategy::SameAsRequested => 1,
        }
    }

    /// Resolve an integer strategy code; unset and `UNSPECIFIED` pick the default
    pub fn from_code(code: Option<i32>) -> AllocatorResult<Self> {
        match code {
            None | Some(Self::UNSPECIFIED) => Ok(Self::default()),
            Some(0) => Ok(ArenaExtendStrategy::NextPowerOfTwo),
            Some(1) => Ok(ArenaExtendStrategy::SameAsRequested),
            Some(other) => Err(AllocatorError::InvalidExtendStrategy(other)),
        }
    }
}

/// Arena tuning parameters as supplied by the session layer
///
/// `None` means "use the default"; see the `DEFAULT_*` constants.
///
/// # Example
/// ```ignore
/// let cfg: ArenaConfig = serde_json::from_str(r#"{"max_mem": 1073741824}"#)?;
/// let cfg = ArenaConfig::new()
///     .with_extend_strategy(ArenaExtendStrategy::SameAsRequested)
///     .with_initial_chunk_size(256);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Upper bound on bytes held from the device; `0` is unbounded
    pub max_mem: usize,
    /// Integer strategy code, validated when an allocator is created
    pub arena_extend_strategy: Option<i32>,
    pub initial_chunk_size_bytes: Option<usize>,
    pub max_dead_bytes_per_chunk: Option<usize>,
    pub initial_growth_chunk_size_bytes: Option<usize>,
}

impl ArenaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the sentinel-integer surface where `-1` means "default"
    ///
    /// # Errors
    /// `InvalidConfiguration` for negative sizes other than `-1`. The strategy
    /// code is carried through unvalidated.
    pub fn from_raw(
        max_mem: usize,
        arena_extend_strategy: i32,
        initial_chunk_size_bytes: i64,
        max_dead_bytes_per_chunk: i64,
        initial_growth_chunk_size_bytes: i64,
    ) -> AllocatorResult<Self> {
        Ok(Self {
            max_mem,
            arena_extend_strategy: (arena_extend_strategy != ArenaExtendStrategy::UNSPECIFIED)
                .then_some(arena_extend_strategy),
            initial_chunk_size_bytes: optional_size(
                "initial_chunk_size_bytes",
                initial_chunk_size_bytes,
            )?,
            max_dead_bytes_per_chunk: optional_size(
                "max_dead_bytes_per_chunk",
                max_dead_bytes_per_chunk,
            )?,
            initial_growth_chunk_size_bytes: optional_size(
                "initial_growth_chunk_size_bytes",
                initial_growth_chunk_size_bytes,
            )?,
        })
    }

    pub fn with_max_mem(mut self, bytes: usize) -> Self {
        self.max_mem = bytes;
        self
    }

    pub fn with_extend_strategy(mut self, strategy: ArenaExtendStrategy) -> Self {
        self.arena_extend_strategy = Some(strategy.code());
        self
    }

    /// Set a raw strategy code, as read from an options table
    pub fn with_extend_strategy_code(mut self, code: i32) -> Self {
        self.arena_extend_strategy = Some(code);
        self
    }

    pub fn with_initial_chunk_size(mut self, bytes: usize) -> Self {
        self.initial_chunk_size_bytes = Some(bytes);
        self
    }

    pub fn with_max_dead_bytes_per_chunk(mut self, bytes: usize) -> Self {
        self.max_dead_bytes_per_chunk = Some(bytes);
        self
    }

    pub fn with_initial_growth_chunk_size(mut self, bytes: usize) -> Self {
        self.initial_growth_chunk_size_bytes = Some(bytes);
        self
    }

    /// Validate and fill in defaults
    ///
    /// # Errors
    /// - `InvalidExtendStrategy` for an unknown strategy code
    /// - `InvalidConfiguration` for a zero initial chunk size
    pub fn resolve(&self) -> AllocatorResult<ArenaSettings> {
        let extend_strategy = ArenaExtendStrategy::from_code(self.arena_extend_strategy)?;

        let initial_chunk_size = self
            .initial_chunk_size_bytes
            .unwrap_or(DEFAULT_INITIAL_CHUNK_SIZE_BYTES);
        if initial_chunk_size == 0 {
            return Err(AllocatorError::InvalidConfiguration(
                "initial_chunk_size_bytes must be > 0".to_string(),
            ));
        }

        let max_memory = (self.max_mem != 0).then_some(self.max_mem);

        Ok(ArenaSettings {
            max_memory,
            extend_strategy,
            initial_chunk_size: aligned_size("initial_chunk_size_bytes", initial_chunk_size)?,
            max_dead_bytes_per_chunk: self
                .max_dead_bytes_per_chunk
                .unwrap_or(DEFAULT_MAX_DEAD_BYTES_PER_CHUNK),
            initial_growth_chunk_size: aligned_size(
                "initial_growth_chunk_size_bytes",
                self.initial_growth_chunk_size_bytes
                    .unwrap_or(DEFAULT_INITIAL_GROWTH_CHUNK_SIZE_BYTES),
            )?,
        })
    }
}

/// Resolved arena parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaSettings {
    /// `None` is unbounded
    pub max_memory: Option<usize>,
    pub extend_strategy: ArenaExtendStrategy,
    pub initial_chunk_size: usize,
    pub max_dead_bytes_per_chunk: usize,
    pub initial_growth_chunk_size: usize,
}

impl Default for ArenaSettings {
    fn default() -> Self {
        ArenaSettings {
            max_memory: None,
            extend_strategy: ArenaExtendStrategy::default(),
            initial_chunk_size: DEFAULT_INITIAL_CHUNK_SIZE_BYTES,
            max_dead_bytes_per_chunk: DEFAULT_MAX_DEAD_BYTES_PER_CHUNK,
            initial_growth_chunk_size: DEFAULT_INITIAL_GROWTH_CHUNK_SIZE_BYTES,
        }
    }
}

/// Round up to [`ARENA_ALIGNMENT`]; `None` if the result does not fit in `usize`
pub(crate) fn align_up(bytes: usize) -> Option<usize> {
    bytes
        .checked_add(ARENA_ALIGNMENT - 1)
        .map(|b| b & !(ARENA_ALIGNMENT - 1))
}

fn aligned_size(field: &str, bytes: usize) -> AllocatorResult<usize> {
    align_up(bytes).ok_or_else(|| {
        AllocatorError::InvalidConfiguration(format!("{} too large: {}", field, bytes))
    })
}

fn optional_size(field: &str, value: i64) -> AllocatorResult<Option<usize>> {
    match value {
        -1 => Ok(None),
        v if v < 0 => Err(AllocatorError::InvalidConfiguration(format!(
            "{} must be -1 (default) or >= 0, got {}",
            field, v
        ))),
        v => usize::try_from(v).map(Some).map_err(|_| {
            AllocatorError::InvalidConfiguration(format!("{} too large: {}", field, v))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0), Some(0));
        assert_eq!(align_up(1), Some(256));
        assert_eq!(align_up(256), Some(256));
        assert_eq!(align_up(257), Some(512));
        assert_eq!(align_up(1000), Some(1024));
        assert_eq!(align_up(usize::MAX), None);
        assert_eq!(align_up(usize::MAX - 254), None);
    }

    #[test]
    fn test_resolve_rejects_unalignable_sizes() {
        let result = ArenaConfig::new().with_initial_chunk_size(usize::MAX).resolve();
        assert!(matches!(result, Err(AllocatorError::InvalidConfiguration(_))));

        let result = ArenaConfig::new()
            .with_initial_growth_chunk_size(usize::MAX - 100)
            .resolve();
        assert!(matches!(result, Err(AllocatorError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_strategy_codes() {
        assert_eq!(
            ArenaExtendStrategy::from_code(None).unwrap(),
            ArenaExtendStrategy::NextPowerOfTwo
        );
        assert_eq!(
            ArenaExtendStrategy::from_code(Some(-1)).unwrap(),
            ArenaExtendStrategy::NextPowerOfTwo
        );
        assert_eq!(
            ArenaExtendStrategy::from_code(Some(1)).unwrap(),
            ArenaExtendStrategy::SameAsRequested
        );
        assert!(matches!(
            ArenaExtendStrategy::from_code(Some(2)),
            Err(AllocatorError::InvalidExtendStrategy(2))
        ));
        assert!(matches!(
            ArenaExtendStrategy::from_code(Some(-7)),
            Err(AllocatorError::InvalidExtendStrategy(-7))
        ));
    }

    #[test]
    fn test_resolve_defaults() {
        let settings = ArenaConfig::new().resolve().unwrap();
        assert_eq!(settings, ArenaSettings::default());
        assert_eq!(settings.max_memory, None);
    }

    #[test]
    fn test_resolve_aligns_sizes() {
        let settings = ArenaConfig::new()
            .with_max_mem(4096)
            .with_initial_chunk_size(300)
            .with_initial_growth_chunk_size(10)
            .resolve()
            .unwrap();
        assert_eq!(settings.max_memory, Some(4096));
        assert_eq!(settings.initial_chunk_size, 512);
        assert_eq!(settings.initial_growth_chunk_size, 256);
    }

    #[test]
    fn test_resolve_rejects_zero_initial_chunk() {
        let result = ArenaConfig::new().with_initial_chunk_size(0).resolve();
        assert!(matches!(result, Err(AllocatorError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_from_raw_sentinels() {
        let cfg = ArenaConfig::from_raw(0, -1, -1, -1, -1).unwrap();
        assert_eq!(cfg, ArenaConfig::default());

        let cfg = ArenaConfig::from_raw(1 << 20, 1, 256, 0, 512).unwrap();
        assert_eq!(cfg.arena_extend_strategy, Some(1));
        assert_eq!(cfg.initial_chunk_size_bytes, Some(256));
        assert_eq!(cfg.max_dead_bytes_per_chunk, Some(0));
        assert_eq!(cfg.initial_growth_chunk_size_bytes, Some(512));
    }

    #[test]
    fn test_from_raw_rejects_other_negatives() {
        let result = ArenaConfig::from_raw(0, -1, -2, -1, -1);
        assert!(matches!(result, Err(AllocatorError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_from_raw_keeps_invalid_strategy_for_factory() {
        let cfg = ArenaConfig::from_raw(0, 42, -1, -1, -1).unwrap();
        assert_eq!(cfg.arena_extend_strategy, Some(42));
        assert!(matches!(
            cfg.resolve(),
            Err(AllocatorError::InvalidExtendStrategy(42))
        ));
    }
}
