//! Offset allocator for one linear address space.
//!
//! Live allocations are [`Region`]s kept in an ordered arena; free spans
//! between them are fragments referring to their bounding regions by
//! generation-checked [`RegionKey`]. The [`Allocator`] owns both and is the
//! only public entry point.

mod allocator;
mod error;
mod fragment;
mod layout;
mod region;
mod stats;
mod store;

pub use allocator::Allocator;
pub use error::{AllocatorError, InvariantViolation};
pub use layout::{Layout, Segment, SegmentKind};
pub use region::{Region, RegionKey};
pub use stats::{fragmentation_ratio, AllocatorStats};
