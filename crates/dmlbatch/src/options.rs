//! Batch options and the tagged parameter block they travel in
//!
//! Clients describe a batch with a self-describing parameter block: one
//! version byte followed by `{tag: u8, length: u32 LE, value}` items. The
//! block is decoded once when the batch opens; afterwards only the plain
//! `BatchOptions` value is consulted.

use dmlbatch_core::{BatchError, Result};
use serde::{Deserialize, Serialize};

use crate::config::BatchLimits;

/// Version byte that starts every parameter block
pub const PARAMS_VERSION: u8 = 1;

/// Continue past failed rows instead of stopping at the first
pub const TAG_MULTI_ERROR: u8 = 1;
/// Keep per-row affected counts
pub const TAG_RECORD_COUNTS: u8 = 2;
/// Byte limit of each arena
pub const TAG_BUFFER_BYTES: u8 = 3;
/// Client supplies blob ids
pub const TAG_USER_BLOB_IDS: u8 = 4;
/// Number of failures that keep a detailed error
pub const TAG_DETAILED_ERRORS: u8 = 5;
/// Blob parameter block used for every buffered blob
pub const TAG_DEFAULT_BPB: u8 = 6;

/// Default number of failures that keep a detailed error
pub const DEFAULT_DETAILED_ERRORS: usize = 64;

/// Default byte limit of each arena
pub const DEFAULT_BUFFER_BYTES: u64 = 16 * 1024 * 1024;

const ITEM_HEADER_SIZE: usize = 5;

/// Configuration of one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Whether to continue with remaining rows after a row fails
    pub multi_error: bool,
    /// Whether to keep the affected row count of every row
    pub record_counts: bool,
    /// Whether the client supplies blob ids
    pub user_blob_ids: bool,
    /// Number of failures that keep a detailed error
    pub detailed_errors: usize,
    /// Byte limit of each arena
    pub buffer_bytes: u64,
    /// Blob parameter block used for every buffered blob
    pub default_bpb: Vec<u8>,
}

impl BatchOptions {
    /// Create new batch options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable multi-error mode
    pub fn with_multi_error(mut self, multi_error: bool) -> Self {
        self.multi_error = multi_error;
        self
    }

    /// Enable per-row record counts
    pub fn with_record_counts(mut self, record_counts: bool) -> Self {
        self.record_counts = record_counts;
        self
    }

    /// Enable client-supplied blob ids
    pub fn with_user_blob_ids(mut self, user_blob_ids: bool) -> Self {
        self.user_blob_ids = user_blob_ids;
        self
    }

    /// Set the number of failures that keep a detailed error
    pub fn with_detailed_errors(mut self, limit: usize) -> Self {
        self.detailed_errors = limit;
        self
    }

    /// Set the byte limit of each arena
    pub fn with_buffer_bytes(mut self, limit: u64) -> Self {
        self.buffer_bytes = limit;
        self
    }

    /// Set the blob parameter block used for buffered blobs
    pub fn with_default_bpb(mut self, bpb: impl Into<Vec<u8>>) -> Self {
        self.default_bpb = bpb.into();
        self
    }

    /// Decode a parameter block and clamp the result to `limits`.
    ///
    /// An empty block yields the defaults. Unknown tags are skipped.
    pub fn decode(block: &[u8], limits: &BatchLimits) -> Result<Self> {
        let mut options = Self::default();
        let Some((&version, mut rest)) = block.split_first() else {
            return Ok(options.clamped(limits));
        };
        if version != PARAMS_VERSION {
            return Err(BatchError::Configuration(format!(
                "unsupported batch parameter block version {}",
                version
            )));
        }

        while !rest.is_empty() {
            if rest.len() < ITEM_HEADER_SIZE {
                return Err(BatchError::Configuration(
                    "truncated batch parameter item header".to_string(),
                ));
            }
            let tag = rest[0];
            let len = u32::from_le_bytes([rest[1], rest[2], rest[3], rest[4]]) as usize;
            let value = rest
                .get(ITEM_HEADER_SIZE..ITEM_HEADER_SIZE + len)
                .ok_or_else(|| {
                    BatchError::Configuration(format!(
                        "batch parameter {} declares {} bytes past the end of the block",
                        tag, len
                    ))
                })?;

            match tag {
                TAG_MULTI_ERROR => options.multi_error = read_int(tag, value)? != 0,
                TAG_RECORD_COUNTS => options.record_counts = read_int(tag, value)? != 0,
                TAG_USER_BLOB_IDS => options.user_blob_ids = read_int(tag, value)? != 0,
                TAG_DETAILED_ERRORS => options.detailed_errors = read_int(tag, value)? as usize,
                TAG_BUFFER_BYTES => {
                    let bytes = read_int(tag, value)? as u64;
                    options.buffer_bytes = if bytes == 0 {
                        DEFAULT_BUFFER_BYTES
                    } else {
                        bytes
                    };
                }
                TAG_DEFAULT_BPB => options.default_bpb = value.to_vec(),
                other => {
                    tracing::warn!(tag = other, len, "ignoring unknown batch parameter");
                }
            }
            rest = &rest[ITEM_HEADER_SIZE + len..];
        }

        let options = options.clamped(limits);
        tracing::debug!(?options, "decoded batch parameters");
        Ok(options)
    }

    /// Encode the options as a parameter block
    pub fn encode(&self) -> Vec<u8> {
        let mut builder = BatchParamsBuilder::new()
            .insert_int(TAG_MULTI_ERROR, self.multi_error as u32)
            .insert_int(TAG_RECORD_COUNTS, self.record_counts as u32)
            .insert_int(TAG_USER_BLOB_IDS, self.user_blob_ids as u32)
            .insert_int(
                TAG_DETAILED_ERRORS,
                u32::try_from(self.detailed_errors).unwrap_or(u32::MAX),
            )
            .insert_int(
                TAG_BUFFER_BYTES,
                u32::try_from(self.buffer_bytes).unwrap_or(u32::MAX),
            );
        if !self.default_bpb.is_empty() {
            builder = builder.insert_bytes(TAG_DEFAULT_BPB, &self.default_bpb);
        }
        builder.finish()
    }

    /// Apply the engine ceilings to client-supplied values
    pub fn clamped(mut self, limits: &BatchLimits) -> Self {
        if self.detailed_errors > limits.detailed_error_ceiling {
            tracing::debug!(
                requested = self.detailed_errors,
                ceiling = limits.detailed_error_ceiling,
                "clamping detailed error limit"
            );
            self.detailed_errors = limits.detailed_error_ceiling;
        }
        if self.buffer_bytes > limits.buffer_bytes_ceiling {
            tracing::debug!(
                requested = self.buffer_bytes,
                ceiling = limits.buffer_bytes_ceiling,
                "clamping buffer byte limit"
            );
            self.buffer_bytes = limits.buffer_bytes_ceiling;
        }
        self
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            multi_error: false,
            record_counts: false,
            user_blob_ids: false,
            detailed_errors: DEFAULT_DETAILED_ERRORS,
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            default_bpb: Vec::new(),
        }
    }
}

fn read_int(tag: u8, value: &[u8]) -> Result<u32> {
    if value.is_empty() || value.len() > 4 {
        return Err(BatchError::Configuration(format!(
            "batch parameter {} expects a 1 to 4 byte integer, got {} bytes",
            tag,
            value.len()
        )));
    }
    let mut bytes = [0u8; 4];
    bytes[..value.len()].copy_from_slice(value);
    Ok(u32::from_le_bytes(bytes))
}

/// Builder for batch parameter blocks
#[derive(Debug, Clone)]
pub struct BatchParamsBuilder {
    buf: Vec<u8>,
}

impl BatchParamsBuilder {
    pub fn new() -> Self {
        Self {
            buf: vec![PARAMS_VERSION],
        }
    }

    /// Append an integer item
    pub fn insert_int(self, tag: u8, value: u32) -> Self {
        self.insert_bytes(tag, &value.to_le_bytes())
    }

    /// Append a raw bytes item
    pub fn insert_bytes(mut self, tag: u8, value: &[u8]) -> Self {
        self.buf.push(tag);
        self.buf
            .extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(value);
        self
    }

    /// Finish the block
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for BatchParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
