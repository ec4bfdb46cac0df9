//! Batch controller
//!
//! A `Batch` buffers many input messages for one prepared DML statement,
//! together with the blobs they reference, and executes them in one pass.
//! Execution yields a `CompletionTracker` with the outcome of every row.

mod controller;
mod execute;

pub use controller::{Batch, BatchState};
