//! dmlbatch core - shared vocabulary of the batch DML pipeline
//!
//! This crate provides the types and traits the batch pipeline and the
//! engine agree on. It defines:
//!
//! - `BatchError` - Error taxonomy for batch setup, ingestion and execution
//! - `StatementExecutor` - Trait for the engine's prepared statement
//! - `Transaction` - Trait for the transaction a batch executes under
//! - `ScratchStore` - Trait for overflow storage, with file and memory stores
//! - Common types like `BlobId`, `MessageFormat`, `ErrorDetail`

mod error;
mod format;
mod scratch;
mod statement;
mod types;

pub use error::*;
pub use format::*;
pub use scratch::*;
pub use statement::*;
pub use types::*;
