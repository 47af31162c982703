//! Allocated byte ranges and the keys that name them.

use serde::{Deserialize, Serialize};

/// One allocated byte range `[offset, offset + size)`.
///
/// Handed to callers by value; the allocator keeps its own copy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub offset: u64,
    pub size: u64,
}

impl Region {
    pub const fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// First byte past the region.
    #[inline]
    pub const fn end(&self) -> u64 {
        self.offset + self.size
    }

    #[inline]
    pub const fn contains(&self, offset: u64) -> bool {
        offset >= self.offset && offset < self.end()
    }

    #[inline]
    pub const fn overlaps(&self, other: &Region) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Generation-checked handle to a slot in the region store.
///
/// Format: [32-bit index | 32-bit generation]
/// - Index: slot position in the store arena
/// - Generation: incremented when the slot is released, so a stale key
///   never resolves to the region that later reuses the slot
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionKey {
    index: u32,
    generation: u32,
}

impl RegionKey {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}
