//! bufheap GPU buffers
//!
//! Pairs one [`Allocator`](bufheap_core::Allocator) with the buffer it
//! sub-allocates, growing the buffer as the allocator's high-water mark moves.
//!
//! Backing stores:
//! - [`HostStore`]: plain host memory (staging, tooling, tests)
//! - [`WgpuStore`]: a `wgpu::Buffer`

pub mod error;
pub mod managed;
pub mod settings;
pub mod store;
pub mod wgpu_store;

pub use bytemuck;
pub use wgpu;

pub use error::BufferError;
pub use managed::ManagedBuffer;
pub use settings::{BufferSettings, SettingsError};
pub use store::{BackingStore, HostStore};
pub use wgpu_store::WgpuStore;
