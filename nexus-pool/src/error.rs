//! Construction and allocation errors.
//!
//! Hot-path operations never return these. Lookups report "not found" as
//! `None`/`false` and [`SlotStore::acquire`](crate::SlotStore::acquire)
//! reports exhaustion as `false`.

use core::fmt;

/// Error building or growing a pool component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// A hash index needs at least one bucket.
    ZeroBuckets,
    /// Chunk size configured as zero.
    ZeroCapacity,
    /// Slot size exceeds chunk size. Use a smaller type or larger chunks.
    SlotTooLarge {
        /// `size_of::<T>()`, or 1 for zero-sized types.
        slot_size: usize,
        /// Configured chunk size in bytes.
        chunk_bytes: usize,
    },
    /// More slots requested than the id type can address.
    IdSpaceExhausted {
        /// Total slots requested.
        requested: usize,
        /// Number of ids the id type can mint.
        max: usize,
    },
    /// Memory allocation failed.
    AllocationFailed,
    /// Huge pages requested but not available.
    HugePagesUnavailable,
    /// mlock failed (likely RLIMIT_MEMLOCK too low).
    MlockFailed,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::ZeroBuckets => write!(f, "bucket count cannot be zero"),
            PoolError::ZeroCapacity => write!(f, "chunk size cannot be zero"),
            PoolError::SlotTooLarge {
                slot_size,
                chunk_bytes,
            } => {
                write!(
                    f,
                    "slot size ({slot_size}) exceeds chunk size ({chunk_bytes})"
                )
            }
            PoolError::IdSpaceExhausted { requested, max } => {
                write!(f, "{requested} slots requested, id type holds {max}")
            }
            PoolError::AllocationFailed => write!(f, "memory allocation failed"),
            PoolError::HugePagesUnavailable => write!(f, "huge pages unavailable"),
            PoolError::MlockFailed => write!(f, "mlock failed"),
        }
    }
}

impl std::error::Error for PoolError {}
