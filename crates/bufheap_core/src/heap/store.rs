// store.rs - ordered arena of live regions
//
// Regions live in a slot vector and are chained in ascending offset order
// through prev/next keys, so neighbours stay reachable after any insert or
// erase. Released slots go on a free list and their generation is bumped.

use super::region::{Region, RegionKey};

#[derive(Debug, Clone, PartialEq, Eq)]
struct RegionNode {
    region: Region,
    prev: Option<RegionKey>,
    next: Option<RegionKey>,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<RegionNode>,
}

/// Live regions sorted by ascending offset.
#[derive(Debug, Clone, Default)]
pub(crate) struct RegionStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: Option<RegionKey>,
    tail: Option<RegionKey>,
    len: usize,
}

impl RegionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn first(&self) -> Option<RegionKey> {
        self.head
    }

    pub fn last(&self) -> Option<RegionKey> {
        self.tail
    }

    fn node(&self, key: RegionKey) -> Option<&RegionNode> {
        let slot = self.slots.get(key.index() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        slot.node.as_ref()
    }

    fn node_mut(&mut self, key: RegionKey) -> Option<&mut RegionNode> {
        let slot = self.slots.get_mut(key.index() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        slot.node.as_mut()
    }

    /// Resolve a key; stale keys yield `None`.
    pub fn get(&self, key: RegionKey) -> Option<Region> {
        self.node(key).map(|node| node.region)
    }

    pub fn prev(&self, key: RegionKey) -> Option<RegionKey> {
        self.node(key).and_then(|node| node.prev)
    }

    pub fn next(&self, key: RegionKey) -> Option<RegionKey> {
        self.node(key).and_then(|node| node.next)
    }

    /// End of the last region, or 0 when the store is empty.
    pub fn high_water_mark(&self) -> u64 {
        self.tail
            .and_then(|key| self.get(key))
            .map_or(0, |region| region.end())
    }

    fn alloc_slot(&mut self, node: RegionNode) -> RegionKey {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            RegionKey::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            RegionKey::new(index, 0)
        }
    }

    /// Insert `region` immediately before `before`, or append when `before`
    /// is `None`. The caller guarantees the result stays sorted and
    /// non-overlapping.
    pub fn insert_before(&mut self, before: Option<RegionKey>, region: Region) -> RegionKey {
        let (prev, next) = match before {
            Some(next) => (self.prev(next), Some(next)),
            None => (self.tail, None),
        };
        debug_assert!(prev
            .and_then(|key| self.get(key))
            .map_or(true, |p| p.end() <= region.offset));
        debug_assert!(next
            .and_then(|key| self.get(key))
            .map_or(true, |n| region.end() <= n.offset));

        let key = self.alloc_slot(RegionNode { region, prev, next });
        match prev.and_then(|p| self.node_mut(p)) {
            Some(node) => node.next = Some(key),
            None => self.head = Some(key),
        }
        match next.and_then(|n| self.node_mut(n)) {
            Some(node) => node.prev = Some(key),
            None => self.tail = Some(key),
        }
        self.len += 1;
        key
    }

    pub fn push_back(&mut self, region: Region) -> RegionKey {
        self.insert_before(None, region)
    }

    /// Unlink and release a region. Returns `None` for a stale key.
    pub fn remove(&mut self, key: RegionKey) -> Option<Region> {
        let slot = self.slots.get_mut(key.index() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index());

        match node.prev.and_then(|p| self.node_mut(p)) {
            Some(prev) => prev.next = node.next,
            None => self.head = node.next,
        }
        match node.next.and_then(|n| self.node_mut(n)) {
            Some(next) => next.prev = node.prev,
            None => self.tail = node.prev,
        }
        self.len -= 1;
        Some(node.region)
    }

    /// Linear scan for the region starting exactly at `offset`.
    pub fn find_by_offset(&self, offset: u64) -> Option<RegionKey> {
        self.iter()
            .take_while(|(_, region)| region.offset <= offset)
            .find(|(_, region)| region.offset == offset)
            .map(|(key, _)| key)
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            store: self,
            cursor: self.first(),
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Check that the chain is consistent with the slot arena: every link
    /// points back, the chain visits exactly `len` regions, and head/tail
    /// agree with the ends of the chain.
    pub fn links_consistent(&self) -> bool {
        let mut count = 0usize;
        let mut prev: Option<RegionKey> = None;
        let mut cursor = self.head;
        while let Some(key) = cursor {
            let Some(node) = self.node(key) else {
                return false;
            };
            if node.prev != prev {
                return false;
            }
            count += 1;
            if count > self.len {
                return false;
            }
            prev = Some(key);
            cursor = node.next;
        }
        let occupied = self.slots.iter().filter(|slot| slot.node.is_some()).count();
        prev == self.tail && count == self.len && occupied == self.len
    }
}

/// Ordered iterator over `(key, region)` pairs.
pub(crate) struct Iter<'a> {
    store: &'a RegionStore,
    cursor: Option<RegionKey>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (RegionKey, Region);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.cursor?;
        let node = self.store.node(key)?;
        self.cursor = node.next;
        Some((key, node.region))
    }
}
