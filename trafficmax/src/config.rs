//! Pipeline configuration.
//!
//! A [`PipelineConfig`] decides how large the handoff channel is and how many
//! consumer threads drain it. Producer count is implied by the number of
//! sources handed to [`Pipeline::run`](crate::Pipeline::run).
//!
//! Configurations can be built in code or loaded from JSON; missing fields
//! take their defaults.
//!
//! ```json
//! { "capacity": 32, "consumers": 4 }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, ConfigError, Result};

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 10;

/// Default number of consumer threads.
pub const DEFAULT_CONSUMERS: usize = 1;

/// Sizing of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of records queued between producers and consumers.
    pub capacity: usize,

    /// Number of consumer threads folding records into the aggregator.
    pub consumers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            consumers: DEFAULT_CONSUMERS,
        }
    }
}

impl PipelineConfig {
    /// Creates and validates a configuration.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn new(capacity: usize, consumers: usize) -> Result<Self> {
        let config = Self {
            capacity,
            consumers,
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] if the file
    /// cannot be read or decoded, and any error from
    /// [`validate`](Self::validate).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidCapacity`] if `capacity` is 0 and
    /// [`ConfigError::InvalidConsumers`] if `consumers` is 0.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ChannelError::InvalidCapacity {
                capacity: self.capacity,
            }
            .into());
        }

        if self.consumers == 0 {
            return Err(ConfigError::InvalidConsumers {
                count: self.consumers,
            }
            .into());
        }

        Ok(())
    }
}
