// fragment.rs - free spans between live regions
//
// A fragment is bounded on the right by a live region, and on the left by a
// live region or the start of the address space. Free space past the last
// region is never a fragment; the high-water mark covers it.

use super::region::RegionKey;
use std::cmp::{Ordering, Reverse};

/// One free byte range `[offset, offset + size)` and the regions around it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Fragment {
    /// Region ending at `offset`; `None` when the fragment starts at 0.
    pub left: Option<RegionKey>,
    /// Region starting at `offset + size`.
    pub right: RegionKey,
    pub offset: u64,
    pub size: u64,
}

impl Fragment {
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Largest first, then lowest offset.
    fn priority(&self, other: &Fragment) -> Ordering {
        (Reverse(self.size), self.offset).cmp(&(Reverse(other.size), other.offset))
    }
}

/// Fragments kept in priority order. Entries are edited in place through
/// [`FragmentIndex::get_mut`] and the order is re-derived with
/// [`FragmentIndex::rebuild`] once the edit is complete.
#[derive(Debug, Clone, Default)]
pub(crate) struct FragmentIndex {
    entries: Vec<Fragment>,
}

impl FragmentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Fragments in priority order (valid after the last `rebuild`).
    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.entries.iter()
    }

    pub fn get(&self, slot: usize) -> Option<&Fragment> {
        self.entries.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Fragment> {
        self.entries.get_mut(slot)
    }

    pub fn push(&mut self, fragment: Fragment) {
        debug_assert!(fragment.size > 0, "empty fragments are never stored");
        self.entries.push(fragment);
    }

    pub fn remove(&mut self, slot: usize) -> Fragment {
        self.entries.swap_remove(slot)
    }

    /// Slot of the fragment whose right bound is `key` (the gap before it).
    pub fn position_before(&self, key: RegionKey) -> Option<usize> {
        self.entries.iter().position(|f| f.right == key)
    }

    /// Slot of the fragment whose left bound is `key` (the gap after it).
    pub fn position_after(&self, key: RegionKey) -> Option<usize> {
        self.entries.iter().position(|f| f.left == Some(key))
    }

    pub fn largest(&self) -> Option<&Fragment> {
        self.entries.first()
    }

    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|f| f.size).sum()
    }

    pub fn rebuild(&mut self) {
        self.entries.sort_unstable_by(Fragment::priority);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
