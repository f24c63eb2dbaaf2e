//! Error types for arena access

use thiserror::Error;

use ember_common::ids::MemoryClass;

use crate::region::RegionId;

/// Errors raised when a region view is requested from an [`Arena`](crate::Arena)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    /// No buffer exists for the memory class
    #[error("Unknown memory class: {class}")]
    UnknownClass {
        /// Requested class
        class: MemoryClass,
    },

    /// Region does not fit inside its class buffer
    #[error("Region {region:?} [{offset}..{end}) exceeds arena {class} of {capacity} bytes")]
    OutOfBounds {
        /// Region id
        region: RegionId,
        /// Memory class
        class: MemoryClass,
        /// Region start
        offset: usize,
        /// Region end (exclusive)
        end: usize,
        /// Buffer length
        capacity: usize,
    },

    /// Region offset is not a multiple of its alignment
    #[error("Memory alignment error: offset {offset:#x} not aligned to {alignment}")]
    AlignmentError {
        /// Region offset
        offset: usize,
        /// Required alignment
        alignment: usize,
    },
}

/// Result type for arena operations
pub type ArenaResult<T> = Result<T, ArenaError>;
