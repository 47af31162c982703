//! bufheap walkthrough
//!
//! Runs scripted sub-allocation sequences against host-backed managed
//! buffers and logs the layout after every step. Pass a JSON settings file
//! as the first argument to override the buffer settings.

use anyhow::{Context, Result};
use bufheap_gpu::{BufferSettings, HostStore, ManagedBuffer};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy)]
enum Step {
    Request { size: u64, alignment: u64 },
    Free { offset: u64 },
}

const fn request(size: u64, alignment: u64) -> Step {
    Step::Request { size, alignment }
}

const REUSE_HEAD: &[Step] = &[
    request(100, 0),
    request(50, 0),
    Step::Free { offset: 0 },
    request(40, 0),
];

const COALESCE: &[Step] = &[
    request(10, 0),
    request(10, 0),
    request(10, 0),
    Step::Free { offset: 10 },
    Step::Free { offset: 0 },
    request(20, 0),
];

const UNIFORM_PACKING: &[Step] = &[
    request(300, 4),
    request(64, 256),
    request(64, 256),
    request(200, 4),
    Step::Free { offset: 512 },
    request(96, 16),
    Step::Free { offset: 768 },
];

/// Cell width that keeps a dump around 64 cells wide.
fn cell_width(high_water_mark: u64) -> u64 {
    high_water_mark.div_ceil(64).max(1)
}

fn run_scenario(name: &str, settings: &BufferSettings, steps: &[Step]) -> Result<()> {
    let _span = tracing::info_span!("scenario", name).entered();
    let mut buffer = ManagedBuffer::new(HostStore::new(), settings.clone())?;

    for step in steps {
        match *step {
            Step::Request { size, alignment } => {
                let region = buffer.sub_allocate(size, alignment)?;
                tracing::info!(size, alignment, offset = region.offset, "request");
            }
            Step::Free { offset } => match buffer.sub_deallocate(offset) {
                Ok(()) => tracing::info!(offset, "free"),
                Err(err) => tracing::warn!(%err, "free rejected"),
            },
        }
        let heap = buffer.allocator();
        let width = cell_width(heap.high_water_mark());
        tracing::info!(bytes_per_cell = width, "{}", heap.dump(width));
    }

    let stats = buffer.allocator().stats();
    tracing::info!(
        capacity = buffer.capacity(),
        stats = %serde_json::to_string(&stats)?,
        "finished"
    );
    for (name, value) in buffer.allocator().counters().iter() {
        tracing::debug!(counter = %name, value, "allocator counter");
    }
    Ok(())
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("bufheap v{}", bufheap_core::VERSION);
    let settings = match std::env::args().nth(1) {
        Some(path) => BufferSettings::load(&path)
            .with_context(|| format!("failed to load settings from {path}"))?,
        None => BufferSettings::default(),
    };
    tracing::info!(?settings, "buffer settings");

    run_scenario("reuse-head", &settings, REUSE_HEAD)?;
    run_scenario("coalesce", &settings, COALESCE)?;
    run_scenario("uniform-packing", &settings, UNIFORM_PACKING)?;

    tracing::info!("walkthrough complete");
    Ok(())
}
