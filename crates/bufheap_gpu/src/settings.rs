//! Managed buffer settings

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("growth factor {factor} must be a finite value of at least 1.0")]
    InvalidGrowthFactor { factor: f32 },
}

/// Per-buffer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSettings {
    /// Debug label given to the backing buffer
    pub label: String,
    /// Bytes reserved when the buffer is created
    pub initial_capacity: u64,
    /// Capacity multiplier applied each time the buffer has to grow
    pub growth_factor: f32,
    /// Alignment applied to every sub-allocation (0 = none)
    pub min_alignment: u64,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            label: "bufheap".to_string(),
            initial_capacity: 64 * 1024,
            growth_factor: 2.0,
            min_alignment: 0,
        }
    }
}

impl BufferSettings {
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.growth_factor.is_finite() || self.growth_factor < 1.0 {
            return Err(SettingsError::InvalidGrowthFactor {
                factor: self.growth_factor,
            });
        }
        Ok(())
    }
}
