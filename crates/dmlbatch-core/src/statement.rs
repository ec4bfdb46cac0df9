//! Statement executor and transaction traits
//!
//! The batch pipeline does not compile or run SQL itself. It drives a
//! prepared statement owned by the engine through `StatementExecutor`, under
//! a caller-supplied `Transaction`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::{BatchError, BlobId, ErrorDetail, MessageFormat, Result};

/// Kind of a prepared statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    ExecProcedure,
    ExecBlock,
    Ddl,
    Other,
}

impl StatementKind {
    /// Check if statements of this kind may be executed as a batch
    pub fn supports_batch(&self) -> bool {
        matches!(
            self,
            Self::Insert | Self::Update | Self::Delete | Self::ExecProcedure | Self::ExecBlock
        )
    }

    /// Get a human-readable name for the statement kind
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::ExecProcedure => "EXECUTE PROCEDURE",
            Self::ExecBlock => "EXECUTE BLOCK",
            Self::Ddl => "DDL",
            Self::Other => "OTHER",
        }
    }

    /// Classify a SQL statement text.
    ///
    /// `EXECUTE PROCEDURE` and `EXECUTE BLOCK` are recognized by prefix since
    /// the generic SQL grammar does not cover them.
    pub fn classify(sql: &str) -> Self {
        let words: Vec<String> = sql
            .split_whitespace()
            .take(2)
            .map(|w| w.to_uppercase())
            .collect();
        if words.first().map(String::as_str) == Some("EXECUTE") {
            match words.get(1).map(String::as_str) {
                Some("PROCEDURE") => return Self::ExecProcedure,
                Some("BLOCK") => return Self::ExecBlock,
                _ => {}
            }
        }

        let dialect = GenericDialect {};
        let Ok(statements) = Parser::parse_sql(&dialect, sql) else {
            tracing::debug!("failed to parse SQL, statement kind unknown");
            return Self::Other;
        };

        match statements.first() {
            Some(Statement::Insert(_)) => Self::Insert,
            Some(Statement::Update { .. }) => Self::Update,
            Some(Statement::Delete(_)) => Self::Delete,
            Some(Statement::Query(_)) => Self::Select,
            Some(Statement::Call(_)) => Self::ExecProcedure,
            Some(
                Statement::CreateTable(_)
                | Statement::AlterTable { .. }
                | Statement::Drop { .. }
                | Statement::CreateIndex(_),
            ) => Self::Ddl,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Failure reported by the executor for one submitted row or blob
#[derive(Debug)]
pub enum SubmitError {
    /// Only this row failed; the batch may continue
    Row(ErrorDetail),
    /// The batch cannot continue (for example the transaction is gone)
    Fatal(BatchError),
}

impl From<BatchError> for SubmitError {
    fn from(err: BatchError) -> Self {
        Self::Fatal(err)
    }
}

/// Size of the length prefix of one segment in a segmented blob
pub const SEGMENT_HEADER_SIZE: usize = 2;

/// Content of a buffered blob handed to the executor for materialization
#[derive(Debug, Clone, Copy)]
pub struct BlobContent<'a> {
    /// Blob parameter block the blob is created with
    pub bpb: &'a [u8],
    /// Raw blob bytes as buffered by the batch
    pub data: &'a [u8],
    /// Whether `data` is a sequence of length-prefixed segments
    pub segmented: bool,
}

impl<'a> BlobContent<'a> {
    /// Iterate the segments of the blob.
    ///
    /// A stream blob yields its data as a single segment. A truncated
    /// trailing segment yields whatever bytes remain.
    pub fn segments(&self) -> Segments<'a> {
        Segments {
            rest: self.data,
            segmented: self.segmented,
        }
    }
}

/// Iterator over the segments of a `BlobContent`
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    rest: &'a [u8],
    segmented: bool,
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        if !self.segmented {
            return Some(std::mem::take(&mut self.rest));
        }
        if self.rest.len() < SEGMENT_HEADER_SIZE {
            return Some(std::mem::take(&mut self.rest));
        }
        let len = u16::from_le_bytes([self.rest[0], self.rest[1]]) as usize;
        let body = &self.rest[SEGMENT_HEADER_SIZE..];
        let take = len.min(body.len());
        let (segment, rest) = body.split_at(take);
        self.rest = rest;
        Some(segment)
    }
}

/// A transaction the batch executes under
pub trait Transaction: Send + Sync {
    /// Engine-assigned transaction number
    fn id(&self) -> u64;

    /// Check if the transaction can still run statements
    fn is_active(&self) -> bool;
}

/// A prepared statement owned by the engine
///
/// Implementations use interior mutability: a batch holds the statement
/// through a shared handle and drives it with `&self` calls.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Kind of the prepared statement
    fn kind(&self) -> StatementKind;

    /// Check if the statement has been prepared
    fn is_prepared(&self) -> bool;

    /// Input parameter layout the statement expects
    fn input_format(&self) -> &MessageFormat;

    /// Check if a cursor is open on the statement
    fn has_open_cursor(&self) -> bool;

    /// Mark a batch as attached to the statement.
    ///
    /// Returns `false` if another batch is already attached.
    fn try_attach_batch(&self) -> bool;

    /// Release the batch attachment taken by `try_attach_batch`
    fn detach_batch(&self);

    /// Rewind execution state so rows can be submitted under `tx`
    async fn restart(&self, tx: &dyn Transaction) -> Result<()>;

    /// Execute the statement for one input message.
    ///
    /// Returns the number of rows affected.
    async fn submit(
        &self,
        tx: &dyn Transaction,
        message: &[u8],
    ) -> std::result::Result<u64, SubmitError>;

    /// Create a real blob from buffered content and return its engine id
    async fn materialize_blob(
        &self,
        tx: &dyn Transaction,
        blob: BlobContent<'_>,
    ) -> std::result::Result<BlobId, SubmitError>;

    /// Check if the owning session asked for the running statement to stop
    fn cancel_requested(&self) -> bool {
        false
    }
}
