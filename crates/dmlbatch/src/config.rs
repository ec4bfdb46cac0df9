//! Engine-wide batch limits
//!
//! Hard ceilings applied to client-supplied batch options, plus the sizing
//! of the in-memory arena segment. Loaded from TOML or built in code.

use std::path::PathBuf;

use dmlbatch_core::{BatchError, Result};
use serde::{Deserialize, Serialize};

/// Default size of the in-memory segment of each arena
pub const DEFAULT_RAM_BUFFER_SIZE: usize = 128 * 1024;

/// Default ceiling on the size of a single message
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Default ceiling on failures that keep a detailed error
pub const DEFAULT_DETAILED_ERROR_CEILING: usize = 256;

/// Default ceiling on the bytes buffered by one arena
pub const DEFAULT_BUFFER_BYTES_CEILING: u64 = 256 * 1024 * 1024;

/// Engine-wide limits for batches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchLimits {
    /// Size of the in-memory segment of each arena
    pub ram_buffer_size: usize,
    /// Largest aligned message a batch accepts
    pub max_message_size: usize,
    /// Ceiling for the detailed-error-limit option
    pub detailed_error_ceiling: usize,
    /// Ceiling for the buffer-byte-limit option
    pub buffer_bytes_ceiling: u64,
    /// Directory for scratch files (system temporary directory when unset)
    pub scratch_dir: Option<PathBuf>,
}

impl BatchLimits {
    /// Create limits with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse limits from a TOML document; absent keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let limits: Self = toml::from_str(source)
            .map_err(|e| BatchError::Configuration(format!("invalid batch limits: {}", e)))?;
        limits.validate()?;
        Ok(limits)
    }

    /// Set the in-memory segment size
    pub fn with_ram_buffer_size(mut self, size: usize) -> Self {
        self.ram_buffer_size = size;
        self
    }

    /// Set the single message ceiling
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the detailed error ceiling
    pub fn with_detailed_error_ceiling(mut self, ceiling: usize) -> Self {
        self.detailed_error_ceiling = ceiling;
        self
    }

    /// Set the buffer byte ceiling
    pub fn with_buffer_bytes_ceiling(mut self, ceiling: u64) -> Self {
        self.buffer_bytes_ceiling = ceiling;
        self
    }

    /// Set the scratch directory
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Check that the limits are usable.
    ///
    /// A message must fit in the in-memory segment, since messages are
    /// drained one contiguous chunk at a time.
    pub fn validate(&self) -> Result<()> {
        if self.ram_buffer_size == 0 {
            return Err(BatchError::Configuration(
                "ram_buffer_size must be positive".to_string(),
            ));
        }
        if self.max_message_size > self.ram_buffer_size {
            return Err(BatchError::Configuration(format!(
                "max_message_size {} exceeds ram_buffer_size {}",
                self.max_message_size, self.ram_buffer_size
            )));
        }
        Ok(())
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            ram_buffer_size: DEFAULT_RAM_BUFFER_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            detailed_error_ceiling: DEFAULT_DETAILED_ERROR_CEILING,
            buffer_bytes_ceiling: DEFAULT_BUFFER_BYTES_CEILING,
            scratch_dir: None,
        }
    }
}
