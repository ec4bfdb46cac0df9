//! Common test utilities and mocks

#![allow(dead_code)]

use async_trait::async_trait;
use dmlbatch::{
    BatchError, BlobContent, BlobId, ErrorDetail, FieldType, MessageFormat, Result,
    StatementExecutor, StatementKind, SubmitError, Transaction,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Engine ids handed out by the mock start here
pub const FIRST_ENGINE_BLOB: u128 = 1000;

/// A blob as the mock engine received it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedBlob {
    pub engine_id: BlobId,
    pub bpb: Vec<u8>,
    pub segmented: bool,
    /// Segments concatenated
    pub data: Vec<u8>,
    pub segments: usize,
}

/// Mock prepared statement for testing batch logic without an engine.
///
/// Each submitted message is treated as an insert keyed by the `Integer`
/// stored at offset 0; a repeated key fails the row like a primary key
/// violation would.
pub struct MockStatement {
    pub kind: StatementKind,
    pub prepared: bool,
    pub format: MessageFormat,
    pub cursor_open: bool,
    attached: AtomicBool,
    cancel: AtomicBool,
    /// Raise the cancel flag once this many rows were submitted
    pub cancel_after: Option<usize>,
    /// Fail fatally when this row is submitted
    pub fatal_at: Option<usize>,
    /// Blob content that fails materialization
    pub failing_blob: Option<Vec<u8>>,
    restarts: AtomicUsize,
    keys: Mutex<HashSet<i32>>,
    /// Log of all submitted messages, in order
    submitted: Mutex<Vec<Vec<u8>>>,
    blobs: Mutex<Vec<MaterializedBlob>>,
}

/// Initialize logging for tests if not already initialized
pub fn initialize_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("dmlbatch=debug".parse().unwrap()),
            )
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

impl MockStatement {
    pub fn new(format: MessageFormat) -> Self {
        initialize_logging();
        Self {
            kind: StatementKind::Insert,
            prepared: true,
            format,
            cursor_open: false,
            attached: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            cancel_after: None,
            fatal_at: None,
            failing_blob: None,
            restarts: AtomicUsize::new(0),
            keys: Mutex::new(HashSet::new()),
            submitted: Mutex::new(Vec::new()),
            blobs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_kind(mut self, kind: StatementKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn unprepared(mut self) -> Self {
        self.prepared = false;
        self
    }

    pub fn with_open_cursor(mut self) -> Self {
        self.cursor_open = true;
        self
    }

    pub fn with_cancel_after(mut self, rows: usize) -> Self {
        self.cancel_after = Some(rows);
        self
    }

    pub fn with_fatal_at(mut self, row: usize) -> Self {
        self.fatal_at = Some(row);
        self
    }

    pub fn with_failing_blob(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.failing_blob = Some(data.into());
        self
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::Acquire)
    }

    pub fn submitted(&self) -> Vec<Vec<u8>> {
        self.submitted.lock().clone()
    }

    /// Keys of all submitted messages, in order
    pub fn submitted_keys(&self) -> Vec<i32> {
        self.submitted.lock().iter().map(|m| read_i32(m, 0)).collect()
    }

    pub fn blobs(&self) -> Vec<MaterializedBlob> {
        self.blobs.lock().clone()
    }

    /// Reset the cancellation flag raised by `cancel_after`
    pub fn clear_cancel(&self) {
        self.cancel.store(false, Ordering::Release);
    }
}

#[async_trait]
impl StatementExecutor for MockStatement {
    fn kind(&self) -> StatementKind {
        self.kind
    }

    fn is_prepared(&self) -> bool {
        self.prepared
    }

    fn input_format(&self) -> &MessageFormat {
        &self.format
    }

    fn has_open_cursor(&self) -> bool {
        self.cursor_open
    }

    fn try_attach_batch(&self) -> bool {
        self.attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn detach_batch(&self) {
        self.attached.store(false, Ordering::Release);
    }

    async fn restart(&self, _tx: &dyn Transaction) -> Result<()> {
        self.restarts.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn submit(
        &self,
        _tx: &dyn Transaction,
        message: &[u8],
    ) -> std::result::Result<u64, SubmitError> {
        let row = {
            let mut submitted = self.submitted.lock();
            submitted.push(message.to_vec());
            submitted.len()
        };
        if self.cancel_after == Some(row) {
            self.cancel.store(true, Ordering::Release);
        }
        if self.fatal_at == Some(row - 1) {
            return Err(SubmitError::Fatal(BatchError::Transaction(
                "connection lost".to_string(),
            )));
        }

        let key = read_i32(message, 0);
        if !self.keys.lock().insert(key) {
            return Err(SubmitError::Row(
                ErrorDetail::new(format!("violation of PRIMARY KEY, duplicate value {}", key))
                    .with_code("23000"),
            ));
        }
        Ok(1)
    }

    async fn materialize_blob(
        &self,
        _tx: &dyn Transaction,
        blob: BlobContent<'_>,
    ) -> std::result::Result<BlobId, SubmitError> {
        let data: Vec<u8> = blob.segments().flatten().copied().collect();
        if self.failing_blob.as_deref() == Some(data.as_slice()) {
            return Err(SubmitError::Row(ErrorDetail::new("blob storage refused")));
        }

        let mut blobs = self.blobs.lock();
        let engine_id = BlobId::new(FIRST_ENGINE_BLOB + blobs.len() as u128);
        blobs.push(MaterializedBlob {
            engine_id,
            bpb: blob.bpb.to_vec(),
            segmented: blob.segmented,
            segments: blob.segments().count(),
            data,
        });
        Ok(engine_id)
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

/// Mock transaction
pub struct MockTransaction {
    pub id: u64,
    active: AtomicBool,
}

impl MockTransaction {
    pub fn new() -> Self {
        Self {
            id: 1,
            active: AtomicBool::new(true),
        }
    }

    pub fn rollback(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl Transaction for MockTransaction {
    fn id(&self) -> u64 {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// `{id INTEGER, name CHAR(10)}`: 20 bytes per message
pub fn country_format() -> MessageFormat {
    MessageFormat::new([FieldType::Integer, FieldType::Char(10)])
}

/// `{id INTEGER, doc BLOB}`: 32 bytes per message
pub fn document_format() -> MessageFormat {
    MessageFormat::new([FieldType::Integer, FieldType::Blob])
}

/// `{id INTEGER, a BLOB, b BLOB}`
pub fn two_blob_format() -> MessageFormat {
    MessageFormat::new([FieldType::Integer, FieldType::Blob, FieldType::Blob])
}

/// Build one message of `format`, every field non-null and zeroed
pub fn message(format: &MessageFormat) -> Vec<u8> {
    vec![0u8; format.aligned_length()]
}

/// Build a `country_format` message
pub fn country(key: i32, name: &str) -> Vec<u8> {
    let format = country_format();
    let mut buf = message(&format);
    write_i32(&mut buf, 0, key);
    let name_field = format.fields()[1];
    let bytes = name.as_bytes();
    let len = bytes.len().min(10);
    buf[name_field.offset..name_field.offset + len].copy_from_slice(&bytes[..len]);
    buf
}

/// Build a message for a format whose first field is the `Integer` key and
/// whose remaining fields are blobs
pub fn with_blobs(format: &MessageFormat, key: i32, blobs: &[Option<BlobId>]) -> Vec<u8> {
    let mut buf = message(format);
    write_i32(&mut buf, 0, key);
    for (field, blob) in format.blob_fields().zip(blobs) {
        match blob {
            Some(id) => {
                buf[field.offset..field.offset + 16].copy_from_slice(&id.to_le_bytes())
            }
            None => buf[field.null_offset..field.null_offset + 2]
                .copy_from_slice(&(-1i16).to_le_bytes()),
        }
    }
    buf
}

/// Blob id stored in the `index`-th blob field of `message`
pub fn blob_at(format: &MessageFormat, message: &[u8], index: usize) -> BlobId {
    let field = format.blob_fields().nth(index).map(|f| f.offset).unwrap_or(0);
    BlobId::read_from(&message[field..]).unwrap_or(BlobId::NULL)
}

pub fn write_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// Concatenate messages for `Batch::add`
pub fn concat(messages: &[Vec<u8>]) -> Vec<u8> {
    messages.concat()
}
