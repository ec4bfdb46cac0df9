//! dmlbatch - batched execution of prepared DML statements
//!
//! This crate buffers many input messages for one prepared statement and
//! executes them in a single pass, reporting the outcome of every row.
//!
//! - `Batch` - Open/add/execute/cancel/close lifecycle for one statement
//! - `ByteArena` - Append-only buffer that spills to scratch storage
//! - `BlobIdTranslator` - Maps client-local blob ids to engine ids
//! - `CompletionTracker` - Per-row outcomes returned by `execute()`
//! - `BatchOptions` / `BatchLimits` - Per-batch options and engine limits

pub mod arena;
pub mod batch;
pub mod blob_ids;
pub mod blob_stream;
pub mod bpb;
mod completion;
mod config;
mod options;

pub use arena::ByteArena;
pub use batch::{Batch, BatchState};
pub use blob_ids::{BlobIdTranslator, BlobMeta};
pub use blob_stream::{BLOB_STREAM_ALIGNMENT, BlobRecord, BlobStreamReader, BlobStreamWriter};
pub use bpb::{BlobParams, is_bpb_segmented};
pub use completion::{CompletionSummary, CompletionTracker, RowState};
pub use config::BatchLimits;
pub use options::{
    BatchOptions, BatchParamsBuilder, DEFAULT_BUFFER_BYTES, DEFAULT_DETAILED_ERRORS,
    PARAMS_VERSION, TAG_BUFFER_BYTES, TAG_DEFAULT_BPB, TAG_DETAILED_ERRORS, TAG_MULTI_ERROR,
    TAG_RECORD_COUNTS, TAG_USER_BLOB_IDS,
};

// Re-export core vocabulary for convenient access
pub use dmlbatch_core::{
    BatchError, BlobContent, BlobId, ErrorDetail, FieldType, MemoryScratchProvider,
    MessageFormat, Result, ScratchProvider, ScratchStore, StatementExecutor, StatementKind,
    SubmitError, TempFileProvider, Transaction,
};
