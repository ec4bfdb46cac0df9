//! Batch execution
//!
//! Execution runs in two passes over the buffered data. First every blob
//! record in the blob arena is materialized through the statement executor,
//! turning its pending local id into an engine mapping. Then the message
//! arena is drained in order; each message has its blob ids rewritten to
//! engine ids and is submitted as one row.

use std::collections::BTreeMap;

use dmlbatch_core::{
    BLOB_ID_SIZE, BatchError, BlobContent, BlobId, ErrorDetail, Result, SubmitError, Transaction,
    align_up, is_null_at,
};

use super::controller::{Batch, BatchState};
use crate::arena::ByteArena;
use crate::blob_stream::{BLOB_HEADER_SIZE, BLOB_STREAM_ALIGNMENT, decode_header};
use crate::completion::CompletionTracker;

/// Row-level failures of blob materialization, keyed by local id
type BlobFailures = BTreeMap<BlobId, ErrorDetail>;

impl Batch {
    /// Execute every buffered message under `tx`.
    ///
    /// Row failures are recorded in the returned tracker. Failures of the
    /// batch machinery itself, or of the transaction, are returned as
    /// errors instead. Either way the buffers are emptied and the batch stays
    /// open for reuse.
    #[tracing::instrument(skip_all, fields(batch = %self.id))]
    pub async fn execute(&mut self, tx: &dyn Transaction) -> Result<CompletionTracker> {
        match self.state {
            BatchState::Closed => {
                return Err(BatchError::Sequence("batch is closed".to_string()));
            }
            BatchState::Executing => {
                return Err(BatchError::Conflict(
                    "batch is already executing".to_string(),
                ));
            }
            BatchState::Open => {}
        }
        self.state = BatchState::Executing;

        let result = self.run(tx).await;
        let reset = self.reset_buffers();
        self.state = BatchState::Open;

        let tracker = match result {
            Ok(tracker) => tracker,
            Err(e) => {
                tracing::error!(error = %e, "batch execution failed");
                return Err(e);
            }
        };
        reset?;

        let summary = tracker.summary();
        tracing::info!(
            rows = summary.total,
            failed = summary.failed,
            "batch executed"
        );
        Ok(tracker)
    }

    async fn run(&mut self, tx: &dyn Transaction) -> Result<CompletionTracker> {
        self.messages.finalize()?;
        if let Some(blobs) = self.blobs.as_mut() {
            blobs.finalize()?;
        }
        self.open_blob = None;

        let mut tracker =
            CompletionTracker::new(self.options.record_counts, self.options.detailed_errors);

        if !tx.is_active() {
            return Err(BatchError::Transaction(format!(
                "transaction {} is not active",
                tx.id()
            )));
        }
        self.statement.restart(tx).await?;

        let failed_blobs = self.materialize_blobs(tx).await?;
        self.drain_messages(tx, &mut tracker, &failed_blobs).await?;
        Ok(tracker)
    }

    async fn materialize_blobs(&mut self, tx: &dyn Transaction) -> Result<BlobFailures> {
        let mut failures = BlobFailures::new();
        let Some(arena) = self.blobs.as_mut() else {
            return Ok(failures);
        };

        let mut reader = RecordReader::new(arena);
        let mut data = Vec::new();
        let mut materialized = 0usize;
        while let Some(local) = reader.next_blob(&mut data)? {
            if self.statement.cancel_requested() {
                return Err(BatchError::Cancelled);
            }
            let content = BlobContent {
                bpb: &self.options.default_bpb,
                data: &data,
                segmented: self.segmented,
            };
            match self.statement.materialize_blob(tx, content).await {
                Ok(engine) => {
                    self.translator.materialized(local, engine)?;
                    materialized += 1;
                }
                Err(SubmitError::Row(detail)) => {
                    tracing::debug!(blob = %local, error = %detail, "blob materialization failed");
                    failures.insert(local, detail);
                }
                Err(SubmitError::Fatal(e)) => return Err(e),
            }
        }

        tracing::debug!(materialized, failed = failures.len(), "blobs materialized");
        Ok(failures)
    }

    async fn drain_messages(
        &mut self,
        tx: &dyn Transaction,
        tracker: &mut CompletionTracker,
        failed_blobs: &BlobFailures,
    ) -> Result<()> {
        let record_size = self.format.aligned_length();
        let message_size = self.format.length();
        let mut pending = Vec::new();
        let mut message = vec![0u8; record_size];

        loop {
            let count = take_records(&mut self.messages, record_size, &mut pending)?;
            if count == 0 {
                return Ok(());
            }

            for record in pending.chunks_exact(record_size) {
                if self.statement.cancel_requested() {
                    tracing::warn!(rows = tracker.size(), "batch execution cancelled");
                    return Err(BatchError::Cancelled);
                }
                message.copy_from_slice(record);

                let outcome = match self.resolve_blobs(&mut message, failed_blobs) {
                    Ok(()) => self.statement.submit(tx, &message[..message_size]).await,
                    Err(detail) => Err(SubmitError::Row(detail)),
                };

                match outcome {
                    Ok(affected) => {
                        tracing::trace!(row = tracker.size(), affected, "row executed");
                        tracker.reg_update(affected);
                    }
                    Err(SubmitError::Row(detail)) => {
                        let row = tracker.size();
                        tracker.reg_error(detail);
                        if !self.options.multi_error {
                            tracing::warn!(row, "row failed, stopping batch");
                            return Ok(());
                        }
                        tracing::trace!(row, "row failed");
                    }
                    Err(SubmitError::Fatal(e)) => return Err(e),
                }
            }
        }
    }

    /// Rewrite the local blob ids in `message` to engine ids
    fn resolve_blobs(
        &self,
        message: &mut [u8],
        failed_blobs: &BlobFailures,
    ) -> std::result::Result<(), ErrorDetail> {
        for meta in &self.blob_meta {
            if is_null_at(message, meta.null_offset) {
                continue;
            }
            let slot = &mut message[meta.id_offset..meta.id_offset + BLOB_ID_SIZE];
            let local = BlobId::read_from(slot).unwrap_or(BlobId::NULL);
            match self.translator.resolve(local) {
                Ok(engine) => slot.copy_from_slice(&engine.to_le_bytes()),
                Err(e) => {
                    return Err(failed_blobs
                        .get(&local)
                        .cloned()
                        .unwrap_or_else(|| ErrorDetail::from(e)));
                }
            }
        }
        Ok(())
    }
}

/// Move the whole records of the next arena chunk into `out`.
///
/// Returns the number of records taken; zero once the arena is exhausted.
fn take_records(arena: &mut ByteArena, record_size: usize, out: &mut Vec<u8>) -> Result<usize> {
    out.clear();
    let chunk = arena.next()?;
    if chunk.is_empty() {
        return Ok(0);
    }
    let count = chunk.len() / record_size;
    if count == 0 {
        return Err(BatchError::InternalConsistency(format!(
            "message arena returned {} bytes, less than one {} byte message",
            chunk.len(),
            record_size
        )));
    }
    let whole = count * record_size;
    out.extend_from_slice(&chunk[..whole]);
    let rest = chunk.len() - whole;
    arena.give_back(rest)?;
    Ok(count)
}

/// Sequential reader of blob records from the blob arena
struct RecordReader<'a> {
    arena: &'a mut ByteArena,
    /// Logical offset of the next unread byte
    offset: usize,
}

impl<'a> RecordReader<'a> {
    fn new(arena: &'a mut ByteArena) -> Self {
        Self { arena, offset: 0 }
    }

    /// Read the next record's data into `data` and return its id
    fn next_blob(&mut self, data: &mut Vec<u8>) -> Result<Option<BlobId>> {
        let pad = align_up(self.offset, BLOB_STREAM_ALIGNMENT) - self.offset;
        self.skip(pad)?;

        let mut header = Vec::with_capacity(BLOB_HEADER_SIZE);
        if !self.read(BLOB_HEADER_SIZE, &mut header)? {
            return Ok(None);
        }
        let header: &[u8; BLOB_HEADER_SIZE] = header.as_slice().try_into().map_err(|_| {
            BatchError::InternalConsistency("short blob record header".to_string())
        })?;
        let (id, length) = decode_header(header);

        data.clear();
        if !self.read(length as usize, data)? && length > 0 {
            return Err(BatchError::InternalConsistency(format!(
                "blob {} truncated in the blob arena",
                id
            )));
        }
        Ok(Some(id))
    }

    /// Read exactly `n` bytes into `out`.
    ///
    /// Returns `false` if the arena was already exhausted; running out part
    /// way is a consistency error.
    fn read(&mut self, n: usize, out: &mut Vec<u8>) -> Result<bool> {
        let mut remaining = n;
        while remaining > 0 {
            let chunk = self.arena.next()?;
            if chunk.is_empty() {
                if remaining == n {
                    return Ok(false);
                }
                return Err(BatchError::InternalConsistency(format!(
                    "blob arena ended {} bytes into a {} byte read",
                    n - remaining,
                    n
                )));
            }
            let take = remaining.min(chunk.len());
            out.extend_from_slice(&chunk[..take]);
            let rest = chunk.len() - take;
            self.arena.give_back(rest)?;
            remaining -= take;
        }
        self.offset += n;
        Ok(true)
    }

    /// Skip up to `n` padding bytes, stopping early at the end of the arena
    fn skip(&mut self, n: usize) -> Result<()> {
        let mut remaining = n;
        while remaining > 0 {
            let chunk = self.arena.next()?;
            if chunk.is_empty() {
                break;
            }
            let take = remaining.min(chunk.len());
            let rest = chunk.len() - take;
            self.arena.give_back(rest)?;
            remaining -= take;
        }
        self.offset += n - remaining;
        Ok(())
    }
}
