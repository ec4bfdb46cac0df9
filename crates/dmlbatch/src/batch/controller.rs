//! Batch lifecycle and ingestion

use std::sync::Arc;

use dmlbatch_core::{
    BLOB_ID_SIZE, BatchError, BlobId, MessageFormat, Result, SEGMENT_HEADER_SIZE,
    ScratchProvider, StatementExecutor, TempFileProvider, align_up,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::arena::ByteArena;
use crate::blob_ids::{BlobIdTranslator, BlobMeta};
use crate::blob_stream::{BLOB_HEADER_SIZE, BLOB_STREAM_ALIGNMENT, BlobStreamReader, encode_header};
use crate::bpb::is_bpb_segmented;
use crate::config::BatchLimits;
use crate::options::BatchOptions;

/// Lifecycle state of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    /// Detached from its statement; no further use
    Closed,
    /// Accepting messages and blobs
    Open,
    /// An `execute()` is in progress or was abandoned mid-way
    Executing,
}

/// The blob currently accepting `append_blob_data`
#[derive(Debug, Clone, Copy)]
pub(super) struct OpenBlob {
    /// Arena offset of the record header
    pub header: u64,
    /// Bytes stored after the header so far
    pub length: u64,
}

/// A batch of input messages for one prepared statement
pub struct Batch {
    pub(super) id: Uuid,
    pub(super) statement: Arc<dyn StatementExecutor>,
    pub(super) format: MessageFormat,
    pub(super) blob_meta: Vec<BlobMeta>,
    pub(super) options: BatchOptions,
    pub(super) segmented: bool,
    pub(super) state: BatchState,
    pub(super) messages: ByteArena,
    pub(super) blobs: Option<ByteArena>,
    pub(super) translator: BlobIdTranslator,
    pub(super) open_blob: Option<OpenBlob>,
}

impl Batch {
    /// Open a batch on `statement`, using temporary files for overflow.
    ///
    /// `params` is a batch parameter block; an empty block selects the
    /// defaults.
    pub fn open(
        statement: Arc<dyn StatementExecutor>,
        format: MessageFormat,
        params: &[u8],
        limits: &BatchLimits,
    ) -> Result<Self> {
        let provider = Arc::new(TempFileProvider::with_dir(limits.scratch_dir.clone()));
        Self::open_with_scratch(statement, format, params, limits, provider)
    }

    /// Open a batch on `statement` with a custom overflow store provider
    pub fn open_with_scratch(
        statement: Arc<dyn StatementExecutor>,
        format: MessageFormat,
        params: &[u8],
        limits: &BatchLimits,
        provider: Arc<dyn ScratchProvider>,
    ) -> Result<Self> {
        limits.validate()?;

        let kind = statement.kind();
        if !kind.supports_batch() {
            return Err(BatchError::UnsupportedStatement(kind.to_string()));
        }
        if statement.has_open_cursor() {
            return Err(BatchError::Conflict(
                "statement has an open cursor".to_string(),
            ));
        }
        if !statement.try_attach_batch() {
            return Err(BatchError::Conflict(
                "statement already has a batch attached".to_string(),
            ));
        }

        match Self::configure(&statement, &format, params, limits) {
            Ok((options, segmented)) => {
                let messages = ByteArena::new(
                    options.buffer_bytes,
                    limits.ram_buffer_size,
                    provider.clone(),
                );
                let blobs = format.has_blobs().then(|| {
                    ByteArena::new(options.buffer_bytes, limits.ram_buffer_size, provider)
                });
                let batch = Self {
                    id: Uuid::new_v4(),
                    blob_meta: BlobMeta::from_format(&format),
                    statement,
                    format,
                    options,
                    segmented,
                    state: BatchState::Open,
                    messages,
                    blobs,
                    translator: BlobIdTranslator::new(),
                    open_blob: None,
                };
                tracing::info!(
                    batch = %batch.id,
                    kind = %kind,
                    message_size = batch.format.aligned_length(),
                    blob_fields = batch.blob_meta.len(),
                    "batch opened"
                );
                Ok(batch)
            }
            Err(e) => {
                statement.detach_batch();
                Err(e)
            }
        }
    }

    fn configure(
        statement: &Arc<dyn StatementExecutor>,
        format: &MessageFormat,
        params: &[u8],
        limits: &BatchLimits,
    ) -> Result<(BatchOptions, bool)> {
        if !statement.is_prepared() {
            return Err(BatchError::FormatMismatch(
                "statement is not prepared".to_string(),
            ));
        }
        if statement.input_format() != format {
            return Err(BatchError::FormatMismatch(
                "input format does not match the statement parameters".to_string(),
            ));
        }

        if format.aligned_length() == 0 {
            return Err(BatchError::FormatMismatch(
                "statement has no input parameters to batch".to_string(),
            ));
        }

        let options = BatchOptions::decode(params, limits)?;
        let segmented = is_bpb_segmented(&options.default_bpb)?;

        let size = format.aligned_length();
        if size > limits.max_message_size {
            return Err(BatchError::MessageTooLarge {
                size,
                limit: limits.max_message_size,
            });
        }
        Ok((options, segmented))
    }

    /// Unique id of this batch, used in log events
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Options decoded when the batch was opened
    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Layout of the input messages
    pub fn metadata(&self) -> &MessageFormat {
        &self.format
    }

    /// Alignment of records in a blob stream passed to `add_blob_stream`
    pub fn blob_alignment(&self) -> usize {
        BLOB_STREAM_ALIGNMENT
    }

    /// Number of buffered messages
    pub fn message_count(&self) -> u64 {
        self.messages.len() / self.format.aligned_length().max(1) as u64
    }

    /// Append `count` messages.
    ///
    /// `buffer` holds the messages back to back, each padded to the aligned
    /// message length.
    pub fn add(&mut self, count: usize, buffer: &[u8]) -> Result<()> {
        self.ensure_usable()?;
        let expected = count.checked_mul(self.format.aligned_length());
        if expected != Some(buffer.len()) {
            return Err(BatchError::FormatMismatch(format!(
                "{} messages of {} bytes do not fit a {} byte buffer",
                count,
                self.format.aligned_length(),
                buffer.len()
            )));
        }
        self.messages.put(buffer)?;
        tracing::trace!(batch = %self.id, count, "messages added");
        Ok(())
    }

    /// Buffer a new blob holding `data`.
    ///
    /// With client-supplied ids, `id` names the blob; otherwise it must be
    /// `None` and a new id is generated. Returns the blob's local id, which
    /// messages use to reference it.
    pub fn add_blob(&mut self, data: &[u8], id: Option<BlobId>) -> Result<BlobId> {
        self.ensure_usable()?;
        let encoded = self.encoded_len(data.len());
        let arena = blob_arena(&mut self.blobs)?;

        let local = match (self.options.user_blob_ids, id) {
            (true, Some(id)) if id.is_null() => {
                return Err(BatchError::Sequence("blob id 0 is reserved".to_string()));
            }
            (true, Some(id)) if self.translator.contains(id) => {
                return Err(BatchError::DuplicateBlobId(id));
            }
            (true, Some(id)) => Some(id),
            (true, None) => {
                return Err(BatchError::Sequence(
                    "batch expects client-supplied blob ids".to_string(),
                ));
            }
            (false, Some(_)) => {
                return Err(BatchError::Sequence(
                    "batch generates blob ids; none may be supplied".to_string(),
                ));
            }
            (false, None) => None,
        };

        let start = align_up(arena.len() as usize, BLOB_STREAM_ALIGNMENT) as u64;
        let length = record_length(encoded as u64)?;
        ensure_room(arena, start + (BLOB_HEADER_SIZE + encoded) as u64)?;

        let local = match local {
            Some(id) => id,
            None => self.translator.generate_id()?,
        };
        arena.align(BLOB_STREAM_ALIGNMENT)?;
        arena.put(&encode_header(local, length))?;
        put_blob_data(arena, data, self.segmented)?;
        self.translator.reserve(local)?;
        self.open_blob = Some(OpenBlob {
            header: start,
            length: encoded as u64,
        });

        tracing::trace!(batch = %self.id, blob = %local, bytes = data.len(), "blob added");
        Ok(local)
    }

    /// Append `data` to the blob opened by the last `add_blob`
    pub fn append_blob_data(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_usable()?;
        let Some(open) = self.open_blob else {
            return Err(BatchError::Sequence(
                "no blob is open for appending".to_string(),
            ));
        };
        let encoded = self.encoded_len(data.len()) as u64;
        let arena = blob_arena(&mut self.blobs)?;

        let length = record_length(open.length + encoded)?;
        ensure_room(arena, arena.len() + encoded)?;

        put_blob_data(arena, data, self.segmented)?;
        arena.patch(open.header + BLOB_ID_SIZE as u64, &length.to_le_bytes())?;
        self.open_blob = Some(OpenBlob {
            length: length as u64,
            ..open
        });
        Ok(())
    }

    /// Buffer a pre-formatted blob stream.
    ///
    /// The stream must consist of whole records and is only accepted when
    /// the client supplies blob ids. Blob data is taken as-is, already
    /// segmented if the batch's blob parameter block asks for segments.
    pub fn add_blob_stream(&mut self, stream: &[u8]) -> Result<()> {
        self.ensure_usable()?;
        if !self.options.user_blob_ids {
            return Err(BatchError::Sequence(
                "blob streams require client-supplied blob ids".to_string(),
            ));
        }
        let arena = blob_arena(&mut self.blobs)?;

        let mut ids = BlobStreamReader::validate(stream)?;
        if let Some(id) = ids.iter().find(|id| self.translator.contains(**id)) {
            return Err(BatchError::DuplicateBlobId(*id));
        }
        let count = ids.len();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(BatchError::DuplicateBlobId(pair[0]));
        }

        let start = align_up(arena.len() as usize, BLOB_STREAM_ALIGNMENT) as u64;
        ensure_room(arena, start + stream.len() as u64)?;
        arena.align(BLOB_STREAM_ALIGNMENT)?;
        arena.put(stream)?;
        for id in ids {
            self.translator.reserve(id)?;
        }
        self.open_blob = None;

        tracing::trace!(batch = %self.id, blobs = count, bytes = stream.len(), "blob stream added");
        Ok(())
    }

    /// Make an existing engine blob referable from messages.
    ///
    /// With client-supplied ids `local` names the mapping; otherwise it must
    /// be `None` and a new id is generated. Returns the local id.
    pub fn register_blob(&mut self, existing: BlobId, local: Option<BlobId>) -> Result<BlobId> {
        self.ensure_usable()?;
        if existing.is_null() {
            return Err(BatchError::Sequence(
                "cannot register the null blob".to_string(),
            ));
        }
        let local = match (self.options.user_blob_ids, local) {
            (true, Some(id)) => id,
            (false, None) => self.translator.generate_id()?,
            (true, None) => {
                return Err(BatchError::Sequence(
                    "batch expects client-supplied blob ids".to_string(),
                ));
            }
            (false, Some(_)) => {
                return Err(BatchError::Sequence(
                    "batch generates blob ids; none may be supplied".to_string(),
                ));
            }
        };
        self.translator.register(local, existing)?;
        tracing::trace!(batch = %self.id, blob = %local, engine = %existing, "blob registered");
        Ok(local)
    }

    /// Discard all buffered messages and blobs
    pub fn cancel(&mut self) -> Result<()> {
        if self.state == BatchState::Closed {
            return Ok(());
        }
        self.reset_buffers()?;
        self.state = BatchState::Open;
        tracing::info!(batch = %self.id, "batch cancelled");
        Ok(())
    }

    /// Detach from the statement and free all buffers. Idempotent.
    pub fn close(&mut self) {
        if self.state == BatchState::Closed {
            return;
        }
        self.messages.release();
        if let Some(blobs) = self.blobs.as_mut() {
            blobs.release();
        }
        self.translator.clear();
        self.open_blob = None;
        self.statement.detach_batch();
        self.state = BatchState::Closed;
        tracing::info!(batch = %self.id, "batch closed");
    }

    pub(super) fn ensure_usable(&self) -> Result<()> {
        if self.state == BatchState::Closed {
            return Err(BatchError::Sequence("batch is closed".to_string()));
        }
        Ok(())
    }

    pub(super) fn reset_buffers(&mut self) -> Result<()> {
        self.open_blob = None;
        self.translator.clear();
        let messages = self.messages.reset();
        let blobs = self.blobs.as_mut().map_or(Ok(()), ByteArena::reset);
        messages.and(blobs)
    }

    fn encoded_len(&self, len: usize) -> usize {
        if self.segmented {
            len + SEGMENT_HEADER_SIZE * len.div_ceil(u16::MAX as usize)
        } else {
            len
        }
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        if self.state != BatchState::Closed {
            self.statement.detach_batch();
        }
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("options", &self.options)
            .field("messages", &self.messages)
            .field("blobs", &self.blobs)
            .field("translator", &self.translator)
            .finish()
    }
}

fn blob_arena(blobs: &mut Option<ByteArena>) -> Result<&mut ByteArena> {
    blobs.as_mut().ok_or_else(|| {
        BatchError::Sequence("batch input has no blob fields".to_string())
    })
}

fn ensure_room(arena: &ByteArena, requested: u64) -> Result<()> {
    if requested > arena.limit() {
        return Err(BatchError::BufferOverflow {
            requested,
            limit: arena.limit(),
        });
    }
    Ok(())
}

fn record_length(length: u64) -> Result<u32> {
    u32::try_from(length).map_err(|_| BatchError::BufferOverflow {
        requested: length,
        limit: u32::MAX as u64,
    })
}

fn put_blob_data(arena: &mut ByteArena, data: &[u8], segmented: bool) -> Result<()> {
    if !segmented {
        return arena.put(data);
    }
    for segment in data.chunks(u16::MAX as usize) {
        arena.put(&(segment.len() as u16).to_le_bytes())?;
        arena.put(segment)?;
    }
    Ok(())
}
