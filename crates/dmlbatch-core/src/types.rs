//! Core types shared by the batch pipeline

use serde::{Deserialize, Serialize};

/// Size in bytes of a blob id, both in message slots and in blob streams
pub const BLOB_ID_SIZE: usize = 16;

/// A blob identifier.
///
/// The same representation is used for client-local ids (chosen by the
/// client or generated by the batch) and for engine ids returned when a blob
/// is materialized. Zero is reserved and never names a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BlobId(pub u128);

impl BlobId {
    /// The reserved null id
    pub const NULL: BlobId = BlobId(0);

    /// Create a blob id from its numeric value
    pub fn new(value: u128) -> Self {
        Self(value)
    }

    /// Check if this is the reserved null id
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Decode an id from its 16-byte little-endian wire form
    pub fn from_le_bytes(bytes: [u8; BLOB_ID_SIZE]) -> Self {
        Self(u128::from_le_bytes(bytes))
    }

    /// Encode the id in its 16-byte little-endian wire form
    pub fn to_le_bytes(self) -> [u8; BLOB_ID_SIZE] {
        self.0.to_le_bytes()
    }

    /// Read an id from the start of `buf`, if it is long enough
    pub fn read_from(buf: &[u8]) -> Option<Self> {
        let bytes: [u8; BLOB_ID_SIZE] = buf.get(..BLOB_ID_SIZE)?.try_into().ok()?;
        Some(Self::from_le_bytes(bytes))
    }
}

impl From<u128> for BlobId {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Detailed error information for a failed row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Error message
    pub message: String,
    /// Error code (if available from the engine)
    pub code: Option<String>,
}

impl ErrorDetail {
    /// Create a new error detail
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Create an error detail with a code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl From<crate::BatchError> for ErrorDetail {
    fn from(err: crate::BatchError) -> Self {
        Self::new(err.to_string())
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "[{}] {}", code, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Round `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two; zero and one leave the value unchanged.
pub fn align_up(value: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        return value;
    }
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
