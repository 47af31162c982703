//! bufheap Core
//!
//! Sub-allocation of byte ranges inside one large GPU buffer:
//! - Regions (live allocations) and fragments (free gaps)
//! - Reuse of freed space with splitting and coalescing
//! - Layout dumps and occupancy statistics

pub mod heap;

pub use heap::{
    fragmentation_ratio, Allocator, AllocatorError, AllocatorStats, InvariantViolation, Layout,
    Region, RegionKey, Segment, SegmentKind,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
