//! `wgpu::Buffer` backing store
//!
//! Growth allocates a larger buffer and copies the old contents on the GPU
//! timeline. Every offset and size handed to wgpu must be a multiple of
//! [`wgpu::COPY_BUFFER_ALIGNMENT`]; give the managed buffer a
//! `min_alignment` of at least 4 to keep regions on that boundary.

use crate::error::BufferError;
use crate::store::BackingStore;

pub struct WgpuStore<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    buffer: wgpu::Buffer,
    usage: wgpu::BufferUsages,
    label: String,
}

fn copy_aligned(capacity: u64) -> u64 {
    capacity.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT
}

fn check_aligned(what: &'static str, value: u64) -> Result<(), BufferError> {
    if value % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
        return Err(BufferError::Unaligned {
            what,
            value,
            required: wgpu::COPY_BUFFER_ALIGNMENT,
        });
    }
    Ok(())
}

fn check_bounds(offset: u64, len: u64, capacity: u64) -> Result<(), BufferError> {
    if offset.checked_add(len).map_or(true, |end| end > capacity) {
        return Err(BufferError::OutOfBounds { offset, len });
    }
    Ok(())
}

impl<'a> WgpuStore<'a> {
    /// Create a buffer of `capacity` bytes. `COPY_SRC | COPY_DST` are added
    /// to `usage` so the buffer can be grown and written.
    pub fn new(
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        label: &str,
        usage: wgpu::BufferUsages,
        capacity: u64,
    ) -> Self {
        let usage = usage | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: copy_aligned(capacity),
            usage,
            mapped_at_creation: false,
        });
        Self {
            device,
            queue,
            buffer,
            usage,
            label: label.to_string(),
        }
    }

    /// The current buffer. Replaced on growth, so bind groups that refer to
    /// it must be rebuilt after the capacity changes.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

impl BackingStore for WgpuStore<'_> {
    fn capacity(&self) -> u64 {
        self.buffer.size()
    }

    fn grow(&mut self, new_capacity: u64) -> Result<(), BufferError> {
        let old_capacity = self.capacity();
        if new_capacity <= old_capacity {
            return Ok(());
        }
        let size = copy_aligned(new_capacity);
        let grown = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(self.label.as_str()),
            size,
            usage: self.usage,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("bufheap grow"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &grown, 0, old_capacity);
        self.queue.submit(std::iter::once(encoder.finish()));

        tracing::debug!(label = %self.label, old_capacity, new_capacity = size, "grew gpu buffer");
        self.buffer = grown;
        Ok(())
    }

    fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<(), BufferError> {
        let len = bytes.len() as u64;
        check_aligned("write offset", offset)?;
        check_aligned("write size", len)?;
        check_bounds(offset, len, self.capacity())?;
        self.queue.write_buffer(&self.buffer, offset, bytes);
        Ok(())
    }

    fn copy_within(&mut self, src: u64, dst: u64, size: u64) -> Result<(), BufferError> {
        check_aligned("copy source", src)?;
        check_aligned("copy destination", dst)?;
        check_aligned("copy size", size)?;
        check_bounds(src, size, self.capacity())?;
        check_bounds(dst, size, self.capacity())?;

        // wgpu rejects copies whose source and destination are one buffer
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bufheap copy staging"),
            size,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("bufheap copy"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, src, &staging, 0, size);
        encoder.copy_buffer_to_buffer(&staging, 0, &self.buffer, dst, size);
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Both stores must come from the same device.
    fn copy_to(
        &self,
        dst: &mut Self,
        src: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), BufferError> {
        check_aligned("copy source", src)?;
        check_aligned("copy destination", dst_offset)?;
        check_aligned("copy size", size)?;
        check_bounds(src, size, self.capacity())?;
        check_bounds(dst_offset, size, dst.capacity())?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("bufheap copy to"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, src, &dst.buffer, dst_offset, size);
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Blocks until the GPU has finished every submitted copy into the
    /// range.
    fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>, BufferError> {
        check_aligned("read offset", offset)?;
        check_aligned("read size", len)?;
        check_bounds(offset, len, self.capacity())?;
        if len == 0 {
            return Ok(Vec::new());
        }

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bufheap readback"),
            size: len,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("bufheap readback"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, offset, &staging, 0, len);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        match receiver.recv() {
            Ok(Ok(())) => {}
            _ => return Err(BufferError::Readback { offset, len }),
        }

        let bytes = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Option<(wgpu::Device, wgpu::Queue)> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
        pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None)).ok()
    }

    #[test]
    fn copy_aligned_rounds_to_four() {
        assert_eq!(copy_aligned(0), 0);
        assert_eq!(copy_aligned(1), 4);
        assert_eq!(copy_aligned(8), 8);
        assert_eq!(copy_aligned(10), 12);
    }

    #[test]
    fn unaligned_access_is_rejected() {
        assert!(check_aligned("offset", 8).is_ok());
        let err = check_aligned("offset", 6).unwrap_err();
        assert!(matches!(
            err,
            BufferError::Unaligned { value: 6, required: 4, .. }
        ));
    }

    #[test]
    fn grows_on_a_real_device() {
        // Skipped on machines without any adapter.
        let Some((device, queue)) = device() else {
            return;
        };
        let mut store = WgpuStore::new(&device, &queue, "test", wgpu::BufferUsages::VERTEX, 16);
        assert_eq!(store.capacity(), 16);
        store.write(0, &[1u8; 16]).unwrap();
        store.grow(30).unwrap();
        assert_eq!(store.capacity(), 32);
        store.copy_within(0, 16, 16).unwrap();
        assert_eq!(store.read(16, 16).unwrap(), vec![1u8; 16]);
        assert!(store.write(2, &[0u8; 4]).is_err());
        assert!(store.write(32, &[0u8; 4]).is_err());
        assert!(store.read(2, 4).is_err());
    }

    #[test]
    fn copies_between_buffers_on_a_real_device() {
        let Some((device, queue)) = device() else {
            return;
        };
        let mut src = WgpuStore::new(&device, &queue, "src", wgpu::BufferUsages::UNIFORM, 16);
        let mut dst = WgpuStore::new(&device, &queue, "dst", wgpu::BufferUsages::UNIFORM, 8);
        src.write(8, &[3u8; 8]).unwrap();
        src.copy_to(&mut dst, 8, 4, 4).unwrap();
        assert_eq!(dst.read(0, 8).unwrap(), vec![0, 0, 0, 0, 3, 3, 3, 3]);
        assert!(src.copy_to(&mut dst, 0, 8, 4).is_err());
    }

    #[test]
    fn out_of_range_offsets_are_rejected() {
        assert!(check_bounds(0, 16, 16).is_ok());
        assert!(matches!(
            check_bounds(12, 8, 16),
            Err(BufferError::OutOfBounds { offset: 12, len: 8 })
        ));
        assert!(check_bounds(u64::MAX, 4, 16).is_err());
    }
}
