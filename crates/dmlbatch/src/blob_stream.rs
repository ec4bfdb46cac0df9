//! Blob stream records
//!
//! A blob stream is a sequence of records
//! `{id: 16 bytes LE, length: u32 LE, data: length bytes}`, each record
//! starting at a multiple of `BLOB_STREAM_ALIGNMENT` from the stream start.
//! The blob arena holds its buffered blobs in the same format, so a stream
//! supplied by the client is copied in as-is after validation.

use dmlbatch_core::{BLOB_ID_SIZE, BatchError, BlobId, Result, align_up};

/// Alignment of every record header within a blob stream
pub const BLOB_STREAM_ALIGNMENT: usize = 8;

/// Size of a record header: the blob id followed by the data length
pub const BLOB_HEADER_SIZE: usize = BLOB_ID_SIZE + 4;

/// Encode a record header
pub fn encode_header(id: BlobId, length: u32) -> [u8; BLOB_HEADER_SIZE] {
    let mut header = [0u8; BLOB_HEADER_SIZE];
    header[..BLOB_ID_SIZE].copy_from_slice(&id.to_le_bytes());
    header[BLOB_ID_SIZE..].copy_from_slice(&length.to_le_bytes());
    header
}

/// Decode a record header into its id and data length
pub fn decode_header(header: &[u8; BLOB_HEADER_SIZE]) -> (BlobId, u32) {
    let mut id = [0u8; BLOB_ID_SIZE];
    id.copy_from_slice(&header[..BLOB_ID_SIZE]);
    let length = u32::from_le_bytes([
        header[BLOB_ID_SIZE],
        header[BLOB_ID_SIZE + 1],
        header[BLOB_ID_SIZE + 2],
        header[BLOB_ID_SIZE + 3],
    ]);
    (BlobId::from_le_bytes(id), length)
}

/// One record of a blob stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobRecord<'a> {
    pub id: BlobId,
    pub data: &'a [u8],
}

/// Builder for blob streams
#[derive(Debug, Clone, Default)]
pub struct BlobStreamWriter {
    buf: Vec<u8>,
    /// Offset of the header of the last record, if any
    last_header: Option<usize>,
}

impl BlobStreamWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new record holding `data`
    pub fn add(&mut self, id: BlobId, data: &[u8]) -> Result<&mut Self> {
        if id.is_null() {
            return Err(BatchError::Sequence("blob id 0 is reserved".to_string()));
        }
        let length = record_length(data.len())?;
        self.buf.resize(align_up(self.buf.len(), BLOB_STREAM_ALIGNMENT), 0);
        self.last_header = Some(self.buf.len());
        self.buf.extend_from_slice(&encode_header(id, length));
        self.buf.extend_from_slice(data);
        Ok(self)
    }

    /// Append `data` to the last record
    pub fn append(&mut self, data: &[u8]) -> Result<&mut Self> {
        let header = self
            .last_header
            .ok_or_else(|| BatchError::Sequence("no blob record to append to".to_string()))?;
        let length = record_length(self.buf.len() - header - BLOB_HEADER_SIZE + data.len())?;
        self.buf[header + BLOB_ID_SIZE..header + BLOB_HEADER_SIZE]
            .copy_from_slice(&length.to_le_bytes());
        self.buf.extend_from_slice(data);
        Ok(self)
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish the stream, padding the last record
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.resize(align_up(self.buf.len(), BLOB_STREAM_ALIGNMENT), 0);
        self.buf
    }
}

/// Iterator over the records of a blob stream.
///
/// Every item is checked: a record must have a non-null id and must lie
/// entirely within the buffer. Padding after the final record is optional.
#[derive(Debug, Clone)]
pub struct BlobStreamReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BlobStreamReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Check a whole stream and collect its record ids in order
    pub fn validate(buf: &'a [u8]) -> Result<Vec<BlobId>> {
        Self::new(buf)
            .map(|record| record.map(|r| r.id))
            .collect()
    }
}

impl<'a> Iterator for BlobStreamReader<'a> {
    type Item = Result<BlobRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = align_up(self.pos, BLOB_STREAM_ALIGNMENT);
        if start >= self.buf.len() {
            if self.buf[self.pos.min(self.buf.len())..].iter().any(|b| *b != 0) {
                self.pos = self.buf.len();
                return Some(Err(BatchError::Sequence(
                    "non-zero padding at end of blob stream".to_string(),
                )));
            }
            self.pos = self.buf.len();
            return None;
        }

        let Some(header) = self
            .buf
            .get(start..start + BLOB_HEADER_SIZE)
            .and_then(|h| <&[u8; BLOB_HEADER_SIZE]>::try_from(h).ok())
        else {
            self.pos = self.buf.len();
            return Some(Err(BatchError::Sequence(format!(
                "truncated blob stream header at offset {}",
                start
            ))));
        };
        let (id, length) = decode_header(header);
        let data_start = start + BLOB_HEADER_SIZE;
        let data_end = data_start + length as usize;

        if id.is_null() {
            self.pos = self.buf.len();
            return Some(Err(BatchError::Sequence(format!(
                "blob stream record at offset {} has the null id",
                start
            ))));
        }
        let Some(data) = self.buf.get(data_start..data_end) else {
            self.pos = self.buf.len();
            return Some(Err(BatchError::Sequence(format!(
                "blob {} declares {} bytes past the end of the stream",
                id, length
            ))));
        };

        self.pos = data_end;
        Some(Ok(BlobRecord { id, data }))
    }
}

fn record_length(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| BatchError::BufferOverflow {
        requested: len as u64,
        limit: u32::MAX as u64,
    })
}
