//! Diagnostic snapshots of the address space.
//!
//! A [`Layout`] lists used and free segments in offset order. Rendering it
//! draws one cell group per segment, `[***]` for a live region and `[---]`
//! for a fragment, which makes fragmentation visible in logs and tests.

use super::allocator::Allocator;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Used,
    Free,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub offset: u64,
    pub size: u64,
    pub kind: SegmentKind,
}

/// Ordered segments covering `[0, high_water_mark)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub segments: Vec<Segment>,
}

impl Layout {
    pub fn used(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| s.kind == SegmentKind::Used)
    }

    pub fn free(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| s.kind == SegmentKind::Free)
    }

    /// Render with one glyph per `bytes_per_cell` bytes (rounded up, at
    /// least one glyph per segment). A cell width of 0 counts as 1.
    pub fn render(&self, bytes_per_cell: u64) -> String {
        let bytes_per_cell = bytes_per_cell.max(1);
        let mut out = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let glyph = match segment.kind {
                SegmentKind::Used => '*',
                SegmentKind::Free => '-',
            };
            let cells = segment.size.div_ceil(bytes_per_cell).max(1);
            out.push('[');
            out.extend(std::iter::repeat(glyph).take(cells as usize));
            out.push(']');
        }
        out
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(1))
    }
}

impl Allocator {
    /// Snapshot of live regions and fragments in offset order.
    pub fn layout(&self) -> Layout {
        let mut segments: Vec<Segment> = self
            .regions
            .iter()
            .map(|(_, region)| Segment {
                offset: region.offset,
                size: region.size,
                kind: SegmentKind::Used,
            })
            .chain(self.fragments.iter().map(|fragment| Segment {
                offset: fragment.offset,
                size: fragment.size,
                kind: SegmentKind::Free,
            }))
            .collect();
        segments.sort_unstable_by_key(|s| s.offset);
        Layout { segments }
    }

    /// Render the layout as a single line of cells.
    pub fn dump(&self, bytes_per_cell: u64) -> String {
        self.layout().render(bytes_per_cell)
    }
}
