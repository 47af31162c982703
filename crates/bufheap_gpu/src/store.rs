//! Backing store abstraction
//!
//! A store is the physical buffer behind an allocator. The allocator never
//! touches it; [`ManagedBuffer`](crate::ManagedBuffer) keeps the two in step.

use crate::error::BufferError;

/// Physical memory that a managed buffer sub-allocates.
pub trait BackingStore {
    /// Current size in bytes.
    fn capacity(&self) -> u64;

    /// Grow to at least `new_capacity` bytes, preserving existing contents.
    fn grow(&mut self, new_capacity: u64) -> Result<(), BufferError>;

    /// Copy `bytes` into the store at `offset`.
    fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<(), BufferError>;

    /// Copy `size` bytes from `src` to `dst` inside the store.
    fn copy_within(&mut self, src: u64, dst: u64, size: u64) -> Result<(), BufferError>;

    /// Copy `size` bytes from `src` in this store to `dst_offset` in `dst`.
    fn copy_to(
        &self,
        dst: &mut Self,
        src: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), BufferError>;

    /// Read back `len` bytes starting at `offset`.
    fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>, BufferError>;
}

/// Host memory store.
#[derive(Debug, Clone, Default)]
pub struct HostStore {
    bytes: Vec<u8>,
}

impl HostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: u64) -> Result<Self, BufferError> {
        let mut store = Self::new();
        store.grow(capacity)?;
        Ok(store)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn span(&self, offset: u64, len: u64) -> Result<std::ops::Range<usize>, BufferError> {
        let out_of_bounds = BufferError::OutOfBounds { offset, len };
        let end = offset.checked_add(len).ok_or(out_of_bounds)?;
        if end > self.capacity() {
            return Err(BufferError::OutOfBounds { offset, len });
        }
        // capacity fits in usize, so both ends do too
        Ok(offset as usize..end as usize)
    }
}

impl BackingStore for HostStore {
    fn capacity(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn grow(&mut self, new_capacity: u64) -> Result<(), BufferError> {
        if new_capacity <= self.capacity() {
            return Ok(());
        }
        let overflow = || BufferError::CapacityOverflow {
            requested: new_capacity,
        };
        let len = usize::try_from(new_capacity).map_err(|_| overflow())?;
        self.bytes
            .try_reserve_exact(len - self.bytes.len())
            .map_err(|_| overflow())?;
        self.bytes.resize(len, 0);
        Ok(())
    }

    fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<(), BufferError> {
        let span = self.span(offset, bytes.len() as u64)?;
        self.bytes[span].copy_from_slice(bytes);
        Ok(())
    }

    fn copy_within(&mut self, src: u64, dst: u64, size: u64) -> Result<(), BufferError> {
        let from = self.span(src, size)?;
        let to = self.span(dst, size)?;
        self.bytes.copy_within(from, to.start);
        Ok(())
    }

    fn copy_to(
        &self,
        dst: &mut Self,
        src: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), BufferError> {
        let from = self.span(src, size)?;
        let to = dst.span(dst_offset, size)?;
        dst.bytes[to].copy_from_slice(&self.bytes[from]);
        Ok(())
    }

    fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>, BufferError> {
        let span = self.span(offset, len)?;
        Ok(self.bytes[span].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_preserves_contents() {
        let mut store = HostStore::with_capacity(4).unwrap();
        store.write(0, &[1, 2, 3, 4]).unwrap();
        store.grow(8).unwrap();
        assert_eq!(store.capacity(), 8);
        assert_eq!(store.as_bytes(), &[1, 2, 3, 4, 0, 0, 0, 0]);

        // never shrinks
        store.grow(2).unwrap();
        assert_eq!(store.capacity(), 8);
    }

    #[test]
    fn unsatisfiable_growth_is_an_error() {
        let mut store = HostStore::with_capacity(4).unwrap();
        let err = store.grow(1 << 62).unwrap_err();
        assert!(matches!(
            err,
            BufferError::CapacityOverflow { requested } if requested == 1 << 62
        ));
        assert_eq!(store.capacity(), 4);
    }

    #[test]
    fn writes_past_capacity_fail() {
        let mut store = HostStore::with_capacity(4).unwrap();
        let err = store.write(2, &[0; 4]).unwrap_err();
        assert!(matches!(err, BufferError::OutOfBounds { offset: 2, len: 4 }));
        assert!(store.write(u64::MAX, &[0]).is_err());
    }

    #[test]
    fn copy_within_moves_bytes() {
        let mut store = HostStore::with_capacity(8).unwrap();
        store.write(0, &[9, 8, 7]).unwrap();
        store.copy_within(0, 5, 3).unwrap();
        assert_eq!(&store.as_bytes()[5..], &[9, 8, 7]);
        assert!(store.copy_within(6, 0, 3).is_err());
    }

    #[test]
    fn copy_to_another_store() {
        let mut src = HostStore::with_capacity(8).unwrap();
        let mut dst = HostStore::with_capacity(4).unwrap();
        src.write(4, &[1, 2, 3, 4]).unwrap();
        src.copy_to(&mut dst, 4, 1, 3).unwrap();
        assert_eq!(dst.as_bytes(), &[0, 1, 2, 3]);

        // destination bounds are checked against the destination
        assert!(src.copy_to(&mut dst, 0, 2, 4).is_err());
        assert_eq!(dst.as_bytes(), &[0, 1, 2, 3]);
    }

    #[test]
    fn read_returns_a_copy() {
        let mut store = HostStore::with_capacity(8).unwrap();
        store.write(2, &[5, 6]).unwrap();
        assert_eq!(store.read(1, 3).unwrap(), vec![0, 5, 6]);
        assert!(store.read(6, 4).is_err());
    }
}
