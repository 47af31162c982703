//! Managed buffer: one allocator, one backing store
//!
//! Sub-allocations come from the allocator; the store grows geometrically
//! whenever a region ends past its capacity. Writes and copies are checked
//! against live regions so stray offsets never reach the store.

use crate::error::BufferError;
use crate::settings::BufferSettings;
use crate::store::BackingStore;
use bufheap_core::{Allocator, Region};

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Least common multiple of two alignments, where 0 and 1 mean "none".
fn combined_alignment(a: u64, b: u64) -> Option<u64> {
    match (a.max(1), b.max(1)) {
        (1, other) | (other, 1) => Some(other),
        (a, b) => (a / gcd(a, b)).checked_mul(b),
    }
}

pub struct ManagedBuffer<S: BackingStore> {
    allocator: Allocator,
    store: S,
    settings: BufferSettings,
}

impl<S: BackingStore> ManagedBuffer<S> {
    /// Wrap `store`, growing it to the configured initial capacity.
    pub fn new(mut store: S, settings: BufferSettings) -> Result<Self, BufferError> {
        settings.validate()?;
        store.grow(settings.initial_capacity)?;
        Ok(Self {
            allocator: Allocator::new(),
            store,
            settings,
        })
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &BufferSettings {
        &self.settings
    }

    pub fn capacity(&self) -> u64 {
        self.store.capacity()
    }

    /// Make sure the store holds at least `capacity` bytes.
    pub fn reserve(&mut self, capacity: u64) -> Result<(), BufferError> {
        if capacity > self.store.capacity() {
            self.store.grow(capacity)?;
        }
        Ok(())
    }

    /// Allocate `size` bytes aligned to both `alignment` and the configured
    /// minimum, growing the store if the region ends past its capacity.
    pub fn sub_allocate(&mut self, size: u64, alignment: u64) -> Result<Region, BufferError> {
        let minimum = self.settings.min_alignment;
        let alignment = combined_alignment(alignment, minimum).ok_or(
            BufferError::AlignmentOverflow {
                requested: alignment,
                minimum,
            },
        )?;
        let region = self.allocator.try_request_memory(size, alignment)?;

        if let Err(err) = self.ensure_capacity(region.end()) {
            self.allocator.free_memory(region.offset);
            return Err(err);
        }
        Ok(region)
    }

    /// Release the region starting at `offset`.
    pub fn sub_deallocate(&mut self, offset: u64) -> Result<(), BufferError> {
        if self.allocator.free_memory(offset) {
            Ok(())
        } else {
            Err(BufferError::UnknownOffset { offset })
        }
    }

    fn ensure_capacity(&mut self, required: u64) -> Result<(), BufferError> {
        let capacity = self.store.capacity();
        if required <= capacity {
            return Ok(());
        }
        let scaled = (capacity as f64 * self.settings.growth_factor as f64).ceil();
        // f64 -> u64 saturates, so huge capacities clamp rather than wrap
        let target = required.max(scaled as u64);
        tracing::debug!(
            label = %self.settings.label,
            capacity,
            required,
            target,
            "growing backing store"
        );
        self.store.grow(target)
    }

    /// The live region that fully contains `[offset, offset + len)`.
    fn region_covering(&self, offset: u64, len: u64) -> Result<Region, BufferError> {
        let out_of_bounds = || BufferError::OutOfBounds { offset, len };
        let end = offset.checked_add(len).ok_or_else(out_of_bounds)?;
        self.allocator
            .regions()
            .take_while(|region| region.offset <= offset)
            .find(|region| region.contains(offset) && end <= region.end())
            .ok_or_else(out_of_bounds)
    }

    /// Write raw bytes inside a live region.
    pub fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<(), BufferError> {
        self.region_covering(offset, bytes.len() as u64)?;
        self.store.write(offset, bytes)
    }

    /// Write a slice of plain-old-data values inside a live region.
    pub fn write_pod<T: bytemuck::Pod>(
        &mut self,
        offset: u64,
        data: &[T],
    ) -> Result<(), BufferError> {
        self.write(offset, bytemuck::cast_slice(data))
    }

    /// Copy `size` bytes between two live regions of this buffer.
    pub fn copy(&mut self, src_offset: u64, dst_offset: u64, size: u64) -> Result<(), BufferError> {
        self.region_covering(src_offset, size)?;
        self.region_covering(dst_offset, size)?;
        self.store.copy_within(src_offset, dst_offset, size)
    }

    /// Copy `size` bytes from a live region of this buffer into a live
    /// region of `dst`.
    pub fn copy_to(
        &self,
        dst: &mut ManagedBuffer<S>,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), BufferError> {
        self.region_covering(src_offset, size)?;
        dst.region_covering(dst_offset, size)?;
        self.store.copy_to(&mut dst.store, src_offset, dst_offset, size)
    }

    /// Read back `len` bytes inside a live region.
    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>, BufferError> {
        self.region_covering(offset, len)?;
        self.store.read(offset, len)
    }
}
