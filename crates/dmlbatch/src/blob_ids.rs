//! Blob id translation
//!
//! Messages reference blobs by client-local ids. Before a message is
//! submitted, every local id in it is replaced by the engine id of the blob
//! it names. `BlobIdTranslator` keeps that association sorted by local id so
//! lookups are binary searches; ids generated by the batch are increasing, so
//! the common insertion is an append.

use dmlbatch_core::{BatchError, BlobId, MessageFormat, Result};

/// Location of one blob field inside a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobMeta {
    /// Byte offset of the field's null indicator
    pub null_offset: usize,
    /// Byte offset of the field's blob id slot
    pub id_offset: usize,
}

impl BlobMeta {
    /// Collect the blob fields of a message format
    pub fn from_format(format: &MessageFormat) -> Vec<BlobMeta> {
        format
            .blob_fields()
            .map(|field| BlobMeta {
                null_offset: field.null_offset,
                id_offset: field.offset,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlobTarget {
    /// Buffered in the blob arena, not yet created in the engine
    Pending,
    /// Created in the engine under this id
    Engine(BlobId),
}

/// Mapping from client-local blob ids to engine blob ids
#[derive(Debug, Clone)]
pub struct BlobIdTranslator {
    map: Vec<(BlobId, BlobTarget)>,
    next_id: u128,
}

impl BlobIdTranslator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub(crate) fn starting_at(first: u128) -> Self {
        Self {
            map: Vec::new(),
            next_id: first.max(1),
        }
    }

    /// Return the next unused local id
    pub fn generate_id(&mut self) -> Result<BlobId> {
        if self.next_id == u128::MAX {
            return Err(BatchError::SequenceExhausted);
        }
        let id = BlobId::new(self.next_id);
        self.next_id += 1;
        Ok(id)
    }

    /// Map `local` to an existing engine blob
    pub fn register(&mut self, local: BlobId, engine: BlobId) -> Result<()> {
        self.insert(local, BlobTarget::Engine(engine))
    }

    /// Claim `local` for a blob buffered in the blob arena
    pub fn reserve(&mut self, local: BlobId) -> Result<()> {
        self.insert(local, BlobTarget::Pending)
    }

    /// Record the engine id of a buffered blob claimed with `reserve`
    pub fn materialized(&mut self, local: BlobId, engine: BlobId) -> Result<()> {
        match self.search(local) {
            Ok(pos) if self.map[pos].1 == BlobTarget::Pending => {
                self.map[pos].1 = BlobTarget::Engine(engine);
                Ok(())
            }
            _ => Err(BatchError::InternalConsistency(format!(
                "blob {} materialized without a pending reservation",
                local
            ))),
        }
    }

    /// Look up the engine id for `local`
    pub fn resolve(&self, local: BlobId) -> Result<BlobId> {
        match self.search(local) {
            Ok(pos) => match self.map[pos].1 {
                BlobTarget::Engine(engine) => Ok(engine),
                BlobTarget::Pending => Err(BatchError::UnknownBlobId(local)),
            },
            Err(_) => Err(BatchError::UnknownBlobId(local)),
        }
    }

    /// Check if `local` is mapped or reserved
    pub fn contains(&self, local: BlobId) -> bool {
        self.search(local).is_ok()
    }

    /// Number of mapped or reserved ids
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if no id is mapped or reserved
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop all mappings and restart the id sequence
    pub fn clear(&mut self) {
        self.map.clear();
        self.next_id = 1;
    }

    fn search(&self, local: BlobId) -> std::result::Result<usize, usize> {
        self.map.binary_search_by_key(&local, |(id, _)| *id)
    }

    fn insert(&mut self, local: BlobId, target: BlobTarget) -> Result<()> {
        if local.is_null() {
            return Err(BatchError::Sequence("blob id 0 is reserved".to_string()));
        }
        if self.map.last().is_none_or(|(last, _)| *last < local) {
            self.map.push((local, target));
            return Ok(());
        }
        match self.search(local) {
            Ok(_) => Err(BatchError::DuplicateBlobId(local)),
            Err(pos) => {
                self.map.insert(pos, (local, target));
                Ok(())
            }
        }
    }
}

impl Default for BlobIdTranslator {
    fn default() -> Self {
        Self::new()
    }
}
