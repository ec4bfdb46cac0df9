//! Error types for the batch pipeline

use thiserror::Error;

use crate::BlobId;

/// Core error type for batch operations
///
/// Setup and ingestion failures are returned synchronously from the call that
/// caused them. Failures of a single row during execution are not carried by
/// this type; they are recorded in the completion tracker instead.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unsupported statement: {0}")]
    UnsupportedStatement(String),

    #[error("Format mismatch: {0}")]
    FormatMismatch(String),

    #[error("Message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Buffer overflow: {requested} bytes requested, {limit} byte limit")]
    BufferOverflow { requested: u64, limit: u64 },

    #[error("Sequence error: {0}")]
    Sequence(String),

    #[error("Duplicate blob id {0}")]
    DuplicateBlobId(BlobId),

    #[error("Unknown blob id {0}")]
    UnknownBlobId(BlobId),

    #[error("Position {position} is out of range, batch has {size} rows")]
    OutOfRange { position: usize, size: usize },

    #[error("Row {0} did not fail")]
    NotFailed(usize),

    #[error("No detailed error retained for row {0}")]
    MissingDetail(usize),

    #[error("Blob id sequence exhausted")]
    SequenceExhausted,

    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cancelled")]
    Cancelled,
}

impl BatchError {
    /// Whether the error means the batch machinery itself is in trouble,
    /// as opposed to a problem with the caller's input.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InternalConsistency(_)
                | Self::Transaction(_)
                | Self::Engine(_)
                | Self::Io(_)
                | Self::Cancelled
        )
    }
}

/// Result type alias for batch operations
pub type Result<T> = std::result::Result<T, BatchError>;
