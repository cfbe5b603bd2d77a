//! Unified error handling for forge-alloc
//!
//! Every fallible operation in the crate returns [`AllocatorResult`]. Errors are
//! categorized so the calling backend can decide whether to surface the failure
//! to the user, retry through another allocation path, or report a bug:
//! - User errors (invalid configuration or request)
//! - Recoverable errors (out of memory)
//! - Backend errors (device allocator failures)
//! - Internal errors (contract violations, poisoned locks)

use std::fmt;

use crate::device::DeviceKey;
use crate::memory::DevicePtr;

/// Unified error type for forge-alloc
#[derive(Debug, thiserror::Error)]
pub enum AllocatorError {
    // ========== Capacity Errors ==========
    /// The arena or the device could not satisfy the request
    #[error("Out of memory: failed to allocate {requested} bytes ({reason})")]
    OutOfMemory { requested: usize, reason: String },

    // ========== Backend Errors ==========
    /// The device allocation primitive reported a failure
    #[error("Device allocation failed: {0}")]
    DeviceAllocationFailed(String),

    /// No device allocator exists for the requested ordinal
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    // ========== Configuration Errors ==========
    /// Arena extend strategy code outside the known set
    #[error("Invalid arena extend strategy: {0}. Must be -1, 0 or 1")]
    InvalidExtendStrategy(i32),

    /// Malformed arena or creation configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Allocation size that can never be served
    #[error("Invalid allocation size: {0}")]
    InvalidSize(usize),

    // ========== Contract Violations ==========
    /// Free of a handle that is not a live block of this allocator
    #[error("Invalid handle: {0} is not a live allocation of this allocator")]
    InvalidHandle(DevicePtr),

    /// A second allocator registered for an occupied identity
    #[error("Allocator already registered for {0}")]
    DuplicateAllocator(DeviceKey),

    // ========== Internal Errors ==========
    /// Lock poisoned (a thread panicked while holding it)
    #[error("Internal lock poisoned: {0}")]
    LockPoisoned(String),

    /// Internal error (indicates a bug)
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AllocatorError {
    /// Categorize the error for handling decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            AllocatorError::InvalidExtendStrategy(_)
            | AllocatorError::InvalidConfiguration(_)
            | AllocatorError::InvalidSize(_) => ErrorCategory::User,

            AllocatorError::OutOfMemory { .. } => ErrorCategory::Recoverable,

            AllocatorError::DeviceAllocationFailed(_) | AllocatorError::DeviceNotFound(_) => {
                ErrorCategory::Backend
            }

            AllocatorError::InvalidHandle(_)
            | AllocatorError::DuplicateAllocator(_)
            | AllocatorError::LockPoisoned(_)
            | AllocatorError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// Check if the caller may retry through another allocation path
    ///
    /// Out-of-memory is never retried inside this crate; the calling layer
    /// decides whether to shrink an arena or fall back to a direct allocator.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Recoverable | ErrorCategory::Backend
        )
    }

    /// Check if this is a user-facing error (bad configuration or request)
    pub fn is_user_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::User)
    }

    /// Check if this is an internal error (caller bug or crate bug)
    pub fn is_internal_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Internal)
    }

    /// Build an out-of-memory error
    pub fn out_of_memory(requested: usize, reason: impl Into<String>) -> Self {
        AllocatorError::OutOfMemory {
            requested,
            reason: reason.into(),
        }
    }
}

/// Error category for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid input or configuration
    User,
    /// Temporary condition, another path may succeed
    Recoverable,
    /// Device allocator failure
    Backend,
    /// Contract violation or bug
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::User => write!(f, "User"),
            ErrorCategory::Recoverable => write!(f, "Recoverable"),
            ErrorCategory::Backend => write!(f, "Backend"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for AllocatorError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        AllocatorError::LockPoisoned(err.to_string())
    }
}

/// Result type alias using [`AllocatorError`]
pub type AllocatorResult<T> = std::result::Result<T, AllocatorError>;
