//! Spill-capable byte arena
//!
//! A `ByteArena` is an append-only byte sequence with a write cursor and a
//! sequential read cursor. The newest bytes live in a fixed-capacity
//! in-memory segment; older bytes live in a scratch store, addressed by the
//! same logical offsets. Bytes `0..spilled` are always in the scratch store
//! and bytes `spilled..len` in memory, so a logical offset never moves.

use std::sync::Arc;

use dmlbatch_core::{BatchError, Result, ScratchProvider, ScratchStore};

/// Chunks larger than `capacity / DIRECT_WRITE_FRACTION` bypass the
/// in-memory segment once it has overflowed.
pub const DIRECT_WRITE_FRACTION: usize = 4;

const PADDING: [u8; 64] = [0; 64];

/// Append-only byte buffer with automatic spill to scratch storage
pub struct ByteArena {
    /// Maximum number of bytes the arena accepts
    limit: u64,
    /// Capacity of the in-memory segment
    capacity: usize,
    /// In-memory tail, logical offsets `spilled..spilled + ram.len()`
    ram: Vec<u8>,
    /// Number of leading bytes held by the scratch store
    spilled: u64,
    scratch: Option<Box<dyn ScratchStore>>,
    provider: Arc<dyn ScratchProvider>,
    /// Logical offset of the next unread byte
    read_pos: u64,
    /// Length of the chunk returned by the last `next()`
    last_chunk: usize,
    /// Staging buffer for chunks read back from the scratch store
    read_buf: Vec<u8>,
}

impl ByteArena {
    /// Create an arena accepting at most `limit` bytes, with an in-memory
    /// segment of `capacity` bytes.
    pub fn new(limit: u64, capacity: usize, provider: Arc<dyn ScratchProvider>) -> Self {
        Self {
            limit,
            capacity: capacity.max(1),
            ram: Vec::new(),
            spilled: 0,
            scratch: None,
            provider,
            read_pos: 0,
            last_chunk: 0,
            read_buf: Vec::new(),
        }
    }

    /// Total number of bytes written
    pub fn len(&self) -> u64 {
        self.spilled + self.ram.len() as u64
    }

    /// Check if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of bytes the arena accepts
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Number of bytes held by the scratch store
    pub fn spilled(&self) -> u64 {
        self.spilled
    }

    /// Number of bytes not yet returned by `next()`
    pub fn unread(&self) -> u64 {
        self.len() - self.read_pos
    }

    /// Append `data`.
    ///
    /// Fails with `BufferOverflow` if the arena would exceed its limit, in
    /// which case nothing is written.
    pub fn put(&mut self, data: &[u8]) -> Result<()> {
        let requested = self.len() + data.len() as u64;
        if requested > self.limit {
            return Err(BatchError::BufferOverflow {
                requested,
                limit: self.limit,
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        if self.ram.len() + data.len() <= self.capacity {
            self.reserve_ram();
            self.ram.extend_from_slice(data);
            return Ok(());
        }

        self.spill_ram()?;
        if data.len() > self.capacity / DIRECT_WRITE_FRACTION {
            let offset = self.spilled;
            self.scratch_mut()?.write(offset, data)?;
            self.spilled += data.len() as u64;
            tracing::debug!(bytes = data.len(), spilled = self.spilled, "wrote chunk directly to scratch");
        } else {
            self.ram.extend_from_slice(data);
        }
        Ok(())
    }

    /// Pad the write cursor to the next multiple of `alignment`.
    ///
    /// `alignment` must be zero, one or a power of two.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        if alignment > 1 && !alignment.is_power_of_two() {
            return Err(BatchError::InternalConsistency(format!(
                "alignment {} is not a power of two",
                alignment
            )));
        }
        let len = self.len() as usize;
        let mut pad = dmlbatch_core::align_up(len, alignment) - len;
        if pad > 0 && self.len() + pad as u64 > self.limit {
            return Err(BatchError::BufferOverflow {
                requested: self.len() + pad as u64,
                limit: self.limit,
            });
        }
        while pad > 0 {
            let step = pad.min(PADDING.len());
            self.put(&PADDING[..step])?;
            pad -= step;
        }
        Ok(())
    }

    /// Overwrite previously written bytes at logical `offset`
    pub fn patch(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset + data.len() as u64;
        if end > self.len() {
            return Err(BatchError::InternalConsistency(format!(
                "patch of {} bytes at {} past arena end {}",
                data.len(),
                offset,
                self.len()
            )));
        }

        let split = end.min(self.spilled).saturating_sub(offset) as usize;
        let (in_scratch, in_ram) = data.split_at(split);
        if !in_scratch.is_empty() {
            self.scratch_mut()?.write(offset, in_scratch)?;
        }
        if !in_ram.is_empty() {
            let start = (offset + split as u64 - self.spilled) as usize;
            self.ram[start..start + in_ram.len()].copy_from_slice(in_ram);
        }
        Ok(())
    }

    /// Seal the written content for reading.
    ///
    /// Fails with `InternalConsistency` if the arena's cursors disagree with
    /// its storage, which would indicate a defect rather than bad input.
    pub fn finalize(&mut self) -> Result<()> {
        if self.read_pos != 0 || self.last_chunk != 0 {
            return Err(BatchError::InternalConsistency(format!(
                "arena finalized after reading {} bytes",
                self.read_pos
            )));
        }
        if self.ram.len() > self.capacity {
            return Err(BatchError::InternalConsistency(format!(
                "in-memory segment holds {} bytes, capacity {}",
                self.ram.len(),
                self.capacity
            )));
        }
        match &mut self.scratch {
            Some(scratch) => {
                if scratch.len() < self.spilled {
                    return Err(BatchError::InternalConsistency(format!(
                        "scratch holds {} bytes, {} spilled",
                        scratch.len(),
                        self.spilled
                    )));
                }
                scratch.flush()?;
            }
            None if self.spilled > 0 => {
                return Err(BatchError::InternalConsistency(format!(
                    "{} bytes spilled without a scratch store",
                    self.spilled
                )));
            }
            None => {}
        }
        Ok(())
    }

    /// Return the next readable chunk, or an empty slice when exhausted.
    ///
    /// Scratch bytes are returned first, at most one segment capacity at a
    /// time; the in-memory tail is returned as a single chunk. A chunk never
    /// straddles the scratch and memory regions.
    pub fn next(&mut self) -> Result<&[u8]> {
        if self.read_pos < self.spilled {
            let n = (self.spilled - self.read_pos).min(self.capacity as u64) as usize;
            let offset = self.read_pos;
            self.read_buf.resize(n, 0);
            match self.scratch.as_mut() {
                Some(scratch) => scratch.read(offset, &mut self.read_buf)?,
                None => {
                    return Err(BatchError::InternalConsistency(
                        "spilled bytes without a scratch store".to_string(),
                    ));
                }
            }
            self.read_pos += n as u64;
            self.last_chunk = n;
            return Ok(self.read_buf.as_slice());
        }

        let start = (self.read_pos - self.spilled) as usize;
        let chunk = &self.ram[start.min(self.ram.len())..];
        self.read_pos += chunk.len() as u64;
        self.last_chunk = chunk.len();
        Ok(chunk)
    }

    /// Return the trailing `size` bytes of the last chunk to the unread
    /// stream.
    pub fn give_back(&mut self, size: usize) -> Result<()> {
        if size > self.last_chunk {
            return Err(BatchError::InternalConsistency(format!(
                "giving back {} bytes of a {} byte chunk",
                size, self.last_chunk
            )));
        }
        self.read_pos -= size as u64;
        self.last_chunk -= size;
        Ok(())
    }

    /// Discard all content; the limit and scratch store are kept for reuse
    pub fn reset(&mut self) -> Result<()> {
        if let Some(scratch) = self.scratch.as_mut() {
            scratch.release(0, self.spilled)?;
        }
        tracing::debug!(bytes = self.len(), spilled = self.spilled, "arena reset");
        self.ram.clear();
        self.spilled = 0;
        self.read_pos = 0;
        self.last_chunk = 0;
        Ok(())
    }

    /// Discard all content and free the scratch store and buffers
    pub fn release(&mut self) {
        self.scratch = None;
        self.ram = Vec::new();
        self.read_buf = Vec::new();
        self.spilled = 0;
        self.read_pos = 0;
        self.last_chunk = 0;
    }

    fn reserve_ram(&mut self) {
        if self.ram.capacity() == 0 {
            self.ram.reserve_exact(self.capacity);
        }
    }

    fn spill_ram(&mut self) -> Result<()> {
        if self.ram.is_empty() {
            return Ok(());
        }
        let offset = self.spilled;
        let ram = std::mem::take(&mut self.ram);
        let written = self.scratch_mut().and_then(|s| s.write(offset, &ram));
        self.ram = ram;
        written?;
        self.spilled += self.ram.len() as u64;
        tracing::debug!(bytes = self.ram.len(), spilled = self.spilled, "spilled in-memory segment");
        self.ram.clear();
        Ok(())
    }

    fn scratch_mut(&mut self) -> Result<&mut Box<dyn ScratchStore>> {
        if self.scratch.is_none() {
            self.scratch = Some(self.provider.create()?);
        }
        self.scratch.as_mut().ok_or_else(|| {
            BatchError::InternalConsistency("scratch store unavailable".to_string())
        })
    }
}

impl std::fmt::Debug for ByteArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteArena")
            .field("limit", &self.limit)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("spilled", &self.spilled)
            .field("read_pos", &self.read_pos)
            .finish()
    }
}
