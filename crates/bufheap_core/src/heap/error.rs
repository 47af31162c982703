use thiserror::Error;

/// Failure of [`Allocator::try_request_memory`](super::Allocator::try_request_memory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocatorError {
    #[error("request of {size} bytes aligned to {alignment} overflows the 64-bit address space")]
    AddressSpaceOverflow { size: u64, alignment: u64 },
}

/// A broken allocator invariant found by [`Allocator::validate`](super::Allocator::validate).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("region at offset {offset} has zero size")]
    EmptyRegion { offset: u64 },

    #[error("region at offset {offset} starts before the previous region ends at {previous_end}")]
    Overlap { offset: u64, previous_end: u64 },

    #[error("region store links are inconsistent")]
    BrokenLinks,

    #[error("fragment at offset {offset} (size {size}) has zero size or dangling bounds")]
    MalformedFragment { offset: u64, size: u64 },

    #[error("fragments {actual:?} do not match the free gaps {expected:?}")]
    FragmentMismatch {
        expected: Vec<(u64, u64)>,
        actual: Vec<(u64, u64)>,
    },
}
