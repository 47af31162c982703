//! Named counters for tracking allocator events

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Counter {
    counters: HashMap<String, usize>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            counters: HashMap::new(),
        }
    }

    pub fn increment(&mut self, name: &str, value: usize) {
        *self.counters.entry(name.to_string()).or_insert(0) += value;
    }

    /// Keep the largest value ever recorded under `name` (peaks, watermarks).
    pub fn record_max(&mut self, name: &str, value: usize) {
        let slot = self.counters.entry(name.to_string()).or_insert(0);
        if value > *slot {
            *slot = value;
        }
    }

    pub fn get(&self, name: &str) -> usize {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn reset_all(&mut self) {
        self.counters.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &usize)> {
        self.counters.iter()
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}
