//! Per-row completion reporting
//!
//! A `CompletionTracker` is created fresh by every `execute()` and handed to
//! the caller. Row counts are kept densely only when requested; failures are
//! kept in a list sorted by position, which stays sorted for free because
//! rows are recorded in submission order.

use dmlbatch_core::{BatchError, ErrorDetail, Result};
use serde::{Deserialize, Serialize};

/// Outcome of a single row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowState {
    /// Row succeeded and affected this many records
    RowCount(u32),
    /// Row succeeded; no count was kept
    NoInfo,
    /// Row failed
    Failed,
}

/// A failed row and, within the detail limit, its error
#[derive(Debug, Clone)]
struct FailedRow {
    position: usize,
    detail: Option<ErrorDetail>,
}

/// Counts over a whole completion report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSummary {
    /// Number of rows processed
    pub total: usize,
    /// Rows that succeeded with a known count
    pub succeeded: usize,
    /// Rows that succeeded without count information
    pub no_info: usize,
    /// Rows that failed
    pub failed: usize,
}

/// Per-row outcomes of one batch execution
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    count: usize,
    row_counts: Option<Vec<u32>>,
    failures: Vec<FailedRow>,
    detail_limit: usize,
}

impl CompletionTracker {
    /// Create an empty tracker.
    ///
    /// `record_counts` keeps the affected count of every row; `detail_limit`
    /// bounds how many failures keep their error detail.
    pub fn new(record_counts: bool, detail_limit: usize) -> Self {
        Self {
            count: 0,
            row_counts: record_counts.then(Vec::new),
            failures: Vec::new(),
            detail_limit,
        }
    }

    /// Record a successful row
    pub fn reg_update(&mut self, affected: u64) {
        if let Some(counts) = self.row_counts.as_mut() {
            counts.push(u32::try_from(affected).unwrap_or(u32::MAX));
        }
        self.count += 1;
    }

    /// Record a failed row
    pub fn reg_error(&mut self, detail: ErrorDetail) {
        let detail = (self.failures.len() < self.detail_limit).then_some(detail);
        self.failures.push(FailedRow {
            position: self.count,
            detail,
        });
        // Placeholder keeps dense indices aligned with positions
        if let Some(counts) = self.row_counts.as_mut() {
            counts.push(0);
        }
        self.count += 1;
    }

    /// Number of rows processed
    pub fn size(&self) -> usize {
        self.count
    }

    /// Outcome of the row at `position`
    pub fn state(&self, position: usize) -> Result<RowState> {
        self.check_range(position)?;
        if self.search(position).is_ok() {
            return Ok(RowState::Failed);
        }
        Ok(match &self.row_counts {
            Some(counts) => RowState::RowCount(counts[position]),
            None => RowState::NoInfo,
        })
    }

    /// Smallest failed position at or after `from`, or `None` when no
    /// failures remain.
    pub fn find_error(&self, from: usize) -> Option<usize> {
        let index = self.failures.partition_point(|f| f.position < from);
        self.failures.get(index).map(|f| f.position)
    }

    /// Error detail of the failed row at `position`
    pub fn status(&self, position: usize) -> Result<&ErrorDetail> {
        self.check_range(position)?;
        let index = self
            .search(position)
            .map_err(|_| BatchError::NotFailed(position))?;
        self.failures[index]
            .detail
            .as_ref()
            .ok_or(BatchError::MissingDetail(position))
    }

    /// Iterate failed positions in ascending order
    pub fn errors(&self) -> impl Iterator<Item = usize> + '_ {
        self.failures.iter().map(|f| f.position)
    }

    /// Count outcomes over all rows
    pub fn summary(&self) -> CompletionSummary {
        let failed = self.failures.len();
        let ok = self.count - failed;
        let (succeeded, no_info) = if self.row_counts.is_some() {
            (ok, 0)
        } else {
            (0, ok)
        };
        CompletionSummary {
            total: self.count,
            succeeded,
            no_info,
            failed,
        }
    }

    /// Release the tracker and every error detail it retains
    pub fn dispose(self) {
        tracing::trace!(rows = self.count, failures = self.failures.len(), "completion state disposed");
    }

    fn check_range(&self, position: usize) -> Result<()> {
        if position >= self.count {
            return Err(BatchError::OutOfRange {
                position,
                size: self.count,
            });
        }
        Ok(())
    }

    fn search(&self, position: usize) -> std::result::Result<usize, usize> {
        self.failures.binary_search_by_key(&position, |f| f.position)
    }
}

#[cfg(test)]
mod tests;
