// allocator.rs - offset allocator over one linear address space
//
// Requests are served from the fragment index when a free span fits, and
// appended at the high-water mark otherwise. Frees extend or merge the
// fragments touching the released region.

use super::error::{AllocatorError, InvariantViolation};
use super::fragment::{Fragment, FragmentIndex};
use super::region::{Region, RegionKey};
use super::store::RegionStore;
use bufheap_metrics::Counter;

/// Round `value` up to a multiple of `alignment`. Alignments 0 and 1 impose
/// no constraint; any other value is accepted, power of two or not.
#[inline]
pub(crate) fn align_up(value: u64, alignment: u64) -> Option<u64> {
    if alignment <= 1 {
        return Some(value);
    }
    let rem = value % alignment;
    if rem == 0 {
        Some(value)
    } else {
        value.checked_add(alignment - rem)
    }
}

/// Sub-allocator handing out non-overlapping byte ranges of one buffer.
///
/// The allocator only tracks offsets. Keeping the physical buffer at least
/// [`high_water_mark`](Self::high_water_mark) bytes long is the caller's job.
///
/// Not synchronized: wrap it in a mutex if several threads need it.
///
/// ```
/// use bufheap_core::{Allocator, Region};
///
/// let mut heap = Allocator::new();
/// let a = heap.request_memory(100, 0);
/// let _b = heap.request_memory(50, 0);
/// assert!(heap.free_memory(a.offset));
/// assert_eq!(heap.request_memory(40, 0), Region::new(0, 40));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Allocator {
    pub(super) regions: RegionStore,
    pub(super) fragments: FragmentIndex,
    counters: Counter,
}

impl Allocator {
    pub fn new() -> Self {
        Self {
            regions: RegionStore::new(),
            fragments: FragmentIndex::new(),
            counters: Counter::new(),
        }
    }

    /// Allocate `size` bytes at an offset that is a multiple of `alignment`.
    ///
    /// A fitting fragment is reused before the address space grows. A zero
    /// `size` is served as a one-byte region.
    ///
    /// # Panics
    /// If the region would end past `u64::MAX`. Use
    /// [`try_request_memory`](Self::try_request_memory) to observe that case.
    pub fn request_memory(&mut self, size: u64, alignment: u64) -> Region {
        match self.try_request_memory(size, alignment) {
            Ok(region) => region,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_request_memory(
        &mut self,
        size: u64,
        alignment: u64,
    ) -> Result<Region, AllocatorError> {
        let size = if size == 0 {
            tracing::warn!("zero-sized request promoted to one byte");
            1
        } else {
            size
        };
        if let Some((slot, offset)) = self.find_fragment(size, alignment) {
            let region = self.carve(slot, offset, size);
            self.counters.increment("requests", 1);
            self.counters.increment("reused", 1);
            tracing::trace!(offset = region.offset, size, alignment, "reused fragment");
            return Ok(region);
        }

        let region = self.append(size, alignment)?;
        self.counters.increment("requests", 1);
        self.counters.increment("appended", 1);
        bufheap_metrics::metrics! {
            self.counters
                .record_max("peak_high_water", region.end() as usize);
        }
        tracing::trace!(offset = region.offset, size, alignment, "appended region");
        Ok(region)
    }

    /// Release the region starting at `offset`.
    ///
    /// Returns `false`, leaving the allocator untouched, when no live region
    /// starts there (double free, or an offset this allocator never issued).
    pub fn free_memory(&mut self, offset: u64) -> bool {
        let Some(key) = self.regions.find_by_offset(offset) else {
            tracing::debug!(offset, "free of unknown offset ignored");
            self.counters.increment("free_misses", 1);
            return false;
        };

        let prev = self.regions.prev(key);
        let next = self
            .regions
            .next(key)
            .and_then(|n| self.regions.get(n).map(|region| (n, region)));
        let before = self.fragments.position_before(key);
        let after = self.fragments.position_after(key);

        match next {
            // Freeing the last region: the space drops below the high-water
            // mark, so the gap in front of it stops being a fragment.
            None => {
                debug_assert!(after.is_none());
                if let Some(slot) = before {
                    self.fragments.remove(slot);
                }
            }
            Some((next_key, next_region)) => {
                let start = prev
                    .and_then(|p| self.regions.get(p))
                    .map_or(0, |region| region.end());
                match (before, after) {
                    (Some(slot), after) => {
                        if let Some(entry) = self.fragments.get_mut(slot) {
                            entry.right = next_key;
                            entry.size = next_region.offset - entry.offset;
                        }
                        // coalesce: the gap after the freed region joins the one before it
                        if let Some(after) = after {
                            self.fragments.remove(after);
                        }
                    }
                    (None, Some(slot)) => {
                        if let Some(entry) = self.fragments.get_mut(slot) {
                            entry.left = prev;
                            entry.offset = start;
                            entry.size = next_region.offset - start;
                        }
                    }
                    (None, None) => self.fragments.push(Fragment {
                        left: prev,
                        right: next_key,
                        offset: start,
                        size: next_region.offset - start,
                    }),
                }
            }
        }

        let freed = self.regions.remove(key);
        self.fragments.rebuild();
        self.counters.increment("frees", 1);
        tracing::trace!(offset, size = freed.map_or(0, |r| r.size), "freed region");
        true
    }

    /// Highest-priority fragment that can hold `size` bytes at an aligned
    /// offset, with that offset.
    fn find_fragment(&self, size: u64, alignment: u64) -> Option<(usize, u64)> {
        for (slot, fragment) in self.fragments.iter().enumerate() {
            // ordered largest first: nothing further down can fit
            if fragment.size < size {
                break;
            }
            let Some(offset) = align_up(fragment.offset, alignment) else {
                continue;
            };
            if offset
                .checked_add(size)
                .is_some_and(|end| end <= fragment.end())
            {
                return Some((slot, offset));
            }
        }
        None
    }

    /// Place a region at `offset` inside the fragment at `slot` and keep
    /// whatever is left on either side as fragments.
    fn carve(&mut self, slot: usize, offset: u64, size: u64) -> Region {
        let region = Region::new(offset, size);
        let Some(fragment) = self.fragments.get(slot).copied() else {
            return region;
        };
        let key = self.regions.insert_before(Some(fragment.right), region);
        let padding = offset - fragment.offset;
        let tail = fragment.end() - region.end();

        match (padding > 0, tail > 0) {
            (true, tail_left) => {
                if let Some(entry) = self.fragments.get_mut(slot) {
                    entry.right = key;
                    entry.size = padding;
                }
                if tail_left {
                    self.fragments.push(Fragment {
                        left: Some(key),
                        right: fragment.right,
                        offset: region.end(),
                        size: tail,
                    });
                }
            }
            (false, true) => {
                if let Some(entry) = self.fragments.get_mut(slot) {
                    entry.left = Some(key);
                    entry.offset = region.end();
                    entry.size = tail;
                }
            }
            (false, false) => {
                self.fragments.remove(slot);
            }
        }

        self.fragments.rebuild();
        region
    }

    /// Place a region at the high-water mark, recording any alignment gap.
    fn append(&mut self, size: u64, alignment: u64) -> Result<Region, AllocatorError> {
        let overflow = AllocatorError::AddressSpaceOverflow { size, alignment };
        let high_water = self.regions.high_water_mark();
        let offset = align_up(high_water, alignment).ok_or(overflow)?;
        offset.checked_add(size).ok_or(overflow)?;

        let previous = self.regions.last();
        let region = Region::new(offset, size);
        let key = self.regions.push_back(region);

        if offset > high_water {
            self.fragments.push(Fragment {
                left: previous,
                right: key,
                offset: high_water,
                size: offset - high_water,
            });
            self.fragments.rebuild();
        }
        Ok(region)
    }

    /// Number of live regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// End of the last live region: the minimum backing buffer size.
    pub fn high_water_mark(&self) -> u64 {
        self.regions.high_water_mark()
    }

    /// Whether a live region starts at `offset`.
    pub fn contains(&self, offset: u64) -> bool {
        self.regions.find_by_offset(offset).is_some()
    }

    /// The live region starting at `offset`.
    pub fn region_at(&self, offset: u64) -> Option<Region> {
        self.regions
            .find_by_offset(offset)
            .and_then(|key| self.regions.get(key))
    }

    /// Live regions in ascending offset order.
    pub fn regions(&self) -> impl Iterator<Item = Region> + '_ {
        self.regions.iter().map(|(_, region)| region)
    }

    /// Event counters (`requests`, `reused`, `appended`, `frees`,
    /// `free_misses`, `peak_high_water`). All zero without the `metrics`
    /// feature.
    pub fn counters(&self) -> &Counter {
        &self.counters
    }

    /// Forget every region and fragment, and zero the counters.
    pub fn clear(&mut self) {
        self.regions.clear();
        self.fragments.clear();
        self.counters.reset_all();
    }

    /// Check every structural invariant.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        if !self.regions.links_consistent() {
            return Err(InvariantViolation::BrokenLinks);
        }

        let mut expected: Vec<Fragment> = Vec::new();
        let mut previous: Option<(RegionKey, Region)> = None;
        for (key, region) in self.regions.iter() {
            if region.size == 0 {
                return Err(InvariantViolation::EmptyRegion {
                    offset: region.offset,
                });
            }
            let previous_end = previous.map_or(0, |(_, r)| r.end());
            if region.offset < previous_end {
                return Err(InvariantViolation::Overlap {
                    offset: region.offset,
                    previous_end,
                });
            }
            if region.offset > previous_end {
                expected.push(Fragment {
                    left: previous.map(|(k, _)| k),
                    right: key,
                    offset: previous_end,
                    size: region.offset - previous_end,
                });
            }
            previous = Some((key, region));
        }

        for fragment in self.fragments.iter() {
            let left_ok = fragment
                .left
                .map_or(fragment.offset == 0, |k| self.regions.get(k).is_some());
            if fragment.size == 0 || !left_ok || self.regions.get(fragment.right).is_none() {
                return Err(InvariantViolation::MalformedFragment {
                    offset: fragment.offset,
                    size: fragment.size,
                });
            }
        }

        let mut actual: Vec<Fragment> = self.fragments.iter().copied().collect();
        actual.sort_unstable_by_key(|f| f.offset);
        if actual != expected {
            let spans = |list: &[Fragment]| -> Vec<(u64, u64)> {
                list.iter().map(|f| (f.offset, f.size)).collect()
            };
            return Err(InvariantViolation::FragmentMismatch {
                expected: spans(&expected),
                actual: spans(&actual),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(heap: &Allocator) -> Vec<(u64, u64)> {
        let mut spans: Vec<_> = heap.fragments.iter().map(|f| (f.offset, f.size)).collect();
        spans.sort_unstable();
        spans
    }

    #[test]
    fn align_up_rounds_to_any_multiple() {
        assert_eq!(align_up(13, 0), Some(13));
        assert_eq!(align_up(13, 1), Some(13));
        assert_eq!(align_up(13, 4), Some(16));
        assert_eq!(align_up(16, 4), Some(16));
        assert_eq!(align_up(13, 12), Some(24));
        assert_eq!(align_up(u64::MAX, 2), None);
    }

    #[test]
    fn sequential_requests_append() {
        let mut heap = Allocator::new();
        assert_eq!(heap.request_memory(100, 0), Region::new(0, 100));
        assert_eq!(heap.request_memory(50, 0), Region::new(100, 50));
        assert_eq!(heap.high_water_mark(), 150);
        assert_eq!(heap.fragment_count(), 0);
        heap.validate().unwrap();
    }

    #[test]
    fn freed_head_is_reused() {
        let mut heap = Allocator::new();
        heap.request_memory(100, 0);
        heap.request_memory(50, 0);
        assert!(heap.free_memory(0));
        assert_eq!(spans(&heap), vec![(0, 100)]);

        assert_eq!(heap.request_memory(40, 0), Region::new(0, 40));
        assert_eq!(spans(&heap), vec![(40, 60)]);
        assert_eq!(heap.high_water_mark(), 150);
        heap.validate().unwrap();
    }

    #[test]
    fn neighbouring_frees_coalesce() {
        let mut heap = Allocator::new();
        assert_eq!(heap.request_memory(10, 0), Region::new(0, 10));
        assert_eq!(heap.request_memory(10, 0), Region::new(10, 10));
        assert_eq!(heap.request_memory(10, 0), Region::new(20, 10));

        assert!(heap.free_memory(10));
        assert!(heap.free_memory(0));
        assert_eq!(spans(&heap), vec![(0, 20)]);

        assert_eq!(heap.request_memory(20, 0), Region::new(0, 20));
        assert_eq!(heap.fragment_count(), 0);
        heap.validate().unwrap();
    }

    #[test]
    fn freeing_between_two_gaps_merges_them() {
        let mut heap = Allocator::new();
        for _ in 0..5 {
            heap.request_memory(8, 0);
        }
        assert!(heap.free_memory(8));
        assert!(heap.free_memory(24));
        assert_eq!(spans(&heap), vec![(8, 8), (24, 8)]);

        assert!(heap.free_memory(16));
        assert_eq!(spans(&heap), vec![(8, 24)]);
        heap.validate().unwrap();
    }

    #[test]
    fn freeing_tail_shrinks_high_water_mark() {
        let mut heap = Allocator::new();
        heap.request_memory(10, 0);
        heap.request_memory(10, 0);
        heap.request_memory(10, 0);
        assert!(heap.free_memory(10));
        assert!(heap.free_memory(20));

        assert_eq!(heap.high_water_mark(), 10);
        assert_eq!(heap.fragment_count(), 0);
        assert_eq!(heap.request_memory(30, 0), Region::new(10, 30));
        heap.validate().unwrap();
    }

    #[test]
    fn alignment_gap_becomes_fragment() {
        let mut heap = Allocator::new();
        heap.request_memory(10, 0);
        let aligned = heap.request_memory(8, 16);
        assert_eq!(aligned, Region::new(16, 8));
        assert_eq!(spans(&heap), vec![(10, 6)]);

        // fits in the gap, unaligned
        assert_eq!(heap.request_memory(6, 0), Region::new(10, 6));
        assert_eq!(heap.fragment_count(), 0);
        heap.validate().unwrap();
    }

    #[test]
    fn aligned_reuse_keeps_padding_and_tail() {
        let mut heap = Allocator::new();
        heap.request_memory(3, 0);
        heap.request_memory(61, 0);
        heap.request_memory(4, 0);
        assert!(heap.free_memory(3));
        assert_eq!(spans(&heap), vec![(3, 61)]);

        let region = heap.request_memory(16, 16);
        assert_eq!(region, Region::new(16, 16));
        assert_eq!(spans(&heap), vec![(3, 13), (32, 32)]);
        heap.validate().unwrap();

        assert!(heap.free_memory(16));
        assert_eq!(spans(&heap), vec![(3, 61)]);
        heap.validate().unwrap();
    }

    #[test]
    fn unaligned_fragment_is_skipped_for_later_candidate() {
        let mut heap = Allocator::new();
        heap.request_memory(1, 0);
        heap.request_memory(8, 0); // [1, 9)
        heap.request_memory(7, 0); // [9, 16)
        heap.request_memory(6, 0); // [16, 22)
        heap.request_memory(2, 0); // [22, 24)
        assert!(heap.free_memory(1));
        assert!(heap.free_memory(16));
        // largest gap [1, 9) cannot hold 6 bytes at an 8-aligned offset
        assert_eq!(heap.request_memory(6, 8), Region::new(16, 6));
        heap.validate().unwrap();
    }

    #[test]
    fn unknown_offset_is_rejected_without_change() {
        let mut heap = Allocator::new();
        heap.request_memory(10, 0);
        heap.request_memory(10, 4);
        heap.request_memory(10, 0);
        assert!(heap.free_memory(12));
        let before = heap.layout();
        let before_spans = spans(&heap);

        assert!(!heap.free_memory(12));
        assert!(!heap.free_memory(5));
        assert!(!heap.free_memory(1_000));
        assert_eq!(heap.layout(), before);
        assert_eq!(spans(&heap), before_spans);
    }

    #[test]
    fn zero_size_request_gets_one_byte() {
        let mut heap = Allocator::new();
        assert_eq!(heap.request_memory(0, 0), Region::new(0, 1));
        assert_eq!(heap.request_memory(0, 0), Region::new(1, 1));
        heap.validate().unwrap();
    }

    #[test]
    fn overflow_is_reported() {
        let mut heap = Allocator::new();
        heap.request_memory(u64::MAX - 4, 0);
        let err = heap.try_request_memory(8, 0).unwrap_err();
        assert_eq!(
            err,
            AllocatorError::AddressSpaceOverflow {
                size: 8,
                alignment: 0
            }
        );
        assert_eq!(heap.len(), 1);
        heap.validate().unwrap();
    }

    #[test]
    fn queries_follow_live_regions() {
        let mut heap = Allocator::new();
        let a = heap.request_memory(4, 0);
        let b = heap.request_memory(4, 0);
        assert!(heap.contains(b.offset));
        assert_eq!(heap.region_at(a.offset), Some(a));
        assert_eq!(heap.regions().collect::<Vec<_>>(), vec![a, b]);

        heap.clear();
        assert!(heap.is_empty());
        assert_eq!(heap.high_water_mark(), 0);
        assert_eq!(heap.request_memory(4, 0), a);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn counters_track_events() {
        let mut heap = Allocator::new();
        heap.request_memory(10, 0);
        heap.request_memory(10, 0);
        heap.free_memory(0);
        heap.request_memory(5, 0);
        heap.free_memory(99);

        let counters = heap.counters();
        assert_eq!(counters.get("requests"), 3);
        assert_eq!(counters.get("appended"), 2);
        assert_eq!(counters.get("reused"), 1);
        assert_eq!(counters.get("frees"), 1);
        assert_eq!(counters.get("free_misses"), 1);
        assert_eq!(counters.get("peak_high_water"), 20);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn failed_requests_are_not_counted() {
        let mut heap = Allocator::new();
        heap.request_memory(1, 0);
        assert!(heap.try_request_memory(u64::MAX, 0).is_err());

        let counters = heap.counters();
        assert_eq!(counters.get("requests"), 1);
        assert_eq!(counters.get("appended"), 1);
        assert_eq!(counters.get("reused"), 0);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn clear_resets_counters() {
        let mut heap = Allocator::new();
        heap.request_memory(8, 0);
        heap.free_memory(0);
        heap.clear();
        assert_eq!(heap.counters().iter().count(), 0);

        heap.request_memory(8, 0);
        assert_eq!(heap.counters().get("requests"), 1);
    }
}
