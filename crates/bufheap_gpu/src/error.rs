use crate::settings::SettingsError;
use bufheap_core::AllocatorError;
use thiserror::Error;

/// Errors raised by managed buffers and their backing stores.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("no live region starts at offset {offset}")]
    UnknownOffset { offset: u64 },

    #[error("access of {len} bytes at offset {offset} is outside any live region")]
    OutOfBounds { offset: u64, len: u64 },

    #[error("{what} {value} is not a multiple of {required}")]
    Unaligned {
        what: &'static str,
        value: u64,
        required: u64,
    },

    #[error("alignment {requested} combined with minimum {minimum} overflows")]
    AlignmentOverflow { requested: u64, minimum: u64 },

    #[error("capacity of {requested} bytes cannot be addressed by this store")]
    CapacityOverflow { requested: u64 },

    #[error("failed to map {len} bytes at offset {offset} for reading")]
    Readback { offset: u64, len: u64 },

    #[error(transparent)]
    Allocator(#[from] AllocatorError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}
