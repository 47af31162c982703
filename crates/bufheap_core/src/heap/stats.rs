use super::allocator::Allocator;
use serde::Serialize;

/// Point-in-time occupancy figures for one allocator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AllocatorStats {
    pub live_regions: usize,
    pub fragments: usize,
    pub used_bytes: u64,
    /// Bytes held by fragments (below the high-water mark).
    pub free_bytes: u64,
    pub high_water_mark: u64,
    pub largest_fragment: u64,
    /// `1 - largest_fragment / free_bytes`, 0 when nothing is free.
    pub fragmentation: f64,
}

pub fn fragmentation_ratio(free_bytes: u64, largest_fragment: u64) -> f64 {
    if free_bytes == 0 {
        return 0.0;
    }
    let largest = largest_fragment.min(free_bytes) as f64;
    (1.0 - largest / free_bytes as f64).clamp(0.0, 1.0)
}

impl Allocator {
    pub fn stats(&self) -> AllocatorStats {
        let free_bytes = self.fragments.total_size();
        let largest_fragment = self.fragments.largest().map_or(0, |f| f.size);
        AllocatorStats {
            live_regions: self.regions.len(),
            fragments: self.fragments.len(),
            used_bytes: self.regions.iter().map(|(_, r)| r.size).sum(),
            free_bytes,
            high_water_mark: self.regions.high_water_mark(),
            largest_fragment,
            fragmentation: fragmentation_ratio(free_bytes, largest_fragment),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_edges() {
        assert_eq!(fragmentation_ratio(0, 0), 0.0);
        assert_eq!(fragmentation_ratio(100, 100), 0.0);
        assert_eq!(fragmentation_ratio(100, 25), 0.75);
    }

    #[test]
    fn stats_account_for_every_byte() {
        let mut heap = Allocator::new();
        for _ in 0..4 {
            heap.request_memory(16, 0);
        }
        heap.free_memory(0);
        heap.free_memory(32);

        let stats = heap.stats();
        assert_eq!(stats.live_regions, 2);
        assert_eq!(stats.fragments, 2);
        assert_eq!(stats.used_bytes, 32);
        assert_eq!(stats.free_bytes, 32);
        assert_eq!(stats.high_water_mark, 64);
        assert_eq!(stats.used_bytes + stats.free_bytes, stats.high_water_mark);
        assert_eq!(stats.largest_fragment, 16);
        assert_eq!(stats.fragmentation, 0.5);
    }
}
