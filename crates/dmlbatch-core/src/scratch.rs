//! Scratch storage for arena overflow
//!
//! A scratch store is an offset-addressable byte store scoped to one batch.
//! Arenas spill into it once their in-memory segment is full and truncate it
//! when the batch is reset.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::{BatchError, Result};

/// Offset-addressable secondary byte storage
pub trait ScratchStore: Send {
    /// Write `data` at `offset`, growing the store if needed
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Fill `buf` with the bytes stored at `offset`
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Release the bytes in `offset..offset + len`.
    ///
    /// Released space is only reclaimed when the range reaches the end of the
    /// store; released bytes must not be read again.
    fn release(&mut self, offset: u64, len: u64) -> Result<()>;

    /// Make all writes visible to subsequent reads
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Number of bytes currently held
    fn len(&self) -> u64;

    /// Check if the store holds no bytes
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Factory for scratch stores, invoked lazily on the first spill
pub trait ScratchProvider: Send + Sync {
    fn create(&self) -> Result<Box<dyn ScratchStore>>;
}

/// Scratch store backed by an anonymous temporary file
#[derive(Debug)]
pub struct TempFileScratch {
    file: File,
    len: u64,
}

impl TempFileScratch {
    /// Create a store in the system temporary directory
    pub fn new() -> Result<Self> {
        Ok(Self {
            file: tempfile::tempfile()?,
            len: 0,
        })
    }

    /// Create a store in `dir`
    pub fn new_in(dir: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self {
            file: tempfile::tempfile_in(dir)?,
            len: 0,
        })
    }
}

impl ScratchStore for TempFileScratch {
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.len = self.len.max(offset + data.len() as u64);
        Ok(())
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if offset + buf.len() as u64 > self.len {
            return Err(BatchError::InternalConsistency(format!(
                "scratch read of {} bytes at {} past end {}",
                buf.len(),
                offset,
                self.len
            )));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn release(&mut self, offset: u64, len: u64) -> Result<()> {
        if offset + len >= self.len && offset < self.len {
            self.file.set_len(offset)?;
            self.len = offset;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.len
    }
}

/// Scratch store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryScratch {
    data: Vec<u8>,
}

impl MemoryScratch {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScratchStore for MemoryScratch {
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + data.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let src = self.data.get(start..start + buf.len()).ok_or_else(|| {
            BatchError::InternalConsistency(format!(
                "scratch read of {} bytes at {} past end {}",
                buf.len(),
                offset,
                self.data.len()
            ))
        })?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn release(&mut self, offset: u64, len: u64) -> Result<()> {
        let start = offset as usize;
        if start + len as usize >= self.data.len() && start < self.data.len() {
            self.data.truncate(start);
        }
        Ok(())
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Provider of temporary-file scratch stores
#[derive(Debug, Clone, Default)]
pub struct TempFileProvider {
    dir: Option<PathBuf>,
}

impl TempFileProvider {
    /// Use the system temporary directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `dir` for scratch files, or the system directory when `None`
    pub fn with_dir(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }
}

impl ScratchProvider for TempFileProvider {
    fn create(&self) -> Result<Box<dyn ScratchStore>> {
        let store = match &self.dir {
            Some(dir) => TempFileScratch::new_in(dir)?,
            None => TempFileScratch::new()?,
        };
        tracing::debug!(dir = ?self.dir, "created scratch file");
        Ok(Box::new(store))
    }
}

/// Provider of in-memory scratch stores
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryScratchProvider;

impl ScratchProvider for MemoryScratchProvider {
    fn create(&self) -> Result<Box<dyn ScratchStore>> {
        Ok(Box::new(MemoryScratch::new()))
    }
}

#[cfg(test)]
mod tests;
