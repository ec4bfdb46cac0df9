//! Blob parameter blocks
//!
//! A blob parameter block starts with a version byte followed by
//! `{tag: u8, length: u8, value}` clumplets. The batch only interprets the
//! blob type: segmented blobs are buffered as length-prefixed segments,
//! stream blobs as raw bytes.

use dmlbatch_core::{BatchError, Result};

/// Version byte that starts every blob parameter block
pub const BPB_VERSION: u8 = 1;

/// Tag of the blob type clumplet
pub const BPB_TYPE: u8 = 3;

/// Blob type bit selecting stream storage
pub const BPB_TYPE_STREAM: u8 = 1;

/// Builder for blob parameter blocks
#[derive(Debug, Clone)]
pub struct BlobParams {
    buf: Vec<u8>,
}

impl BlobParams {
    pub fn new() -> Self {
        Self {
            buf: vec![BPB_VERSION],
        }
    }

    /// Request stream storage
    pub fn stream(self) -> Self {
        self.insert(BPB_TYPE, &[BPB_TYPE_STREAM])
    }

    /// Request segmented storage
    pub fn segmented(self) -> Self {
        self.insert(BPB_TYPE, &[0])
    }

    /// Append a clumplet
    pub fn insert(mut self, tag: u8, value: &[u8]) -> Self {
        let len = u8::try_from(value.len()).unwrap_or(u8::MAX);
        self.buf.push(tag);
        self.buf.push(len);
        self.buf.extend_from_slice(&value[..len as usize]);
        self
    }

    /// Finish the block
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for BlobParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Check whether blobs created with `bpb` are segmented.
///
/// An empty block, or one without a type clumplet, means segmented.
pub fn is_bpb_segmented(bpb: &[u8]) -> Result<bool> {
    let Some((&version, mut rest)) = bpb.split_first() else {
        return Ok(true);
    };
    if version != BPB_VERSION {
        return Err(BatchError::Configuration("Malformed BPB".to_string()));
    }

    while let [tag, len, tail @ ..] = rest {
        let len = *len as usize;
        let value = tail
            .get(..len)
            .ok_or_else(|| BatchError::Configuration("Malformed BPB".to_string()))?;
        if *tag == BPB_TYPE {
            let kind = value.iter().rev().fold(0u32, |acc, b| (acc << 8) | *b as u32);
            return Ok(kind & BPB_TYPE_STREAM as u32 == 0);
        }
        rest = &tail[len..];
    }

    if !rest.is_empty() {
        return Err(BatchError::Configuration("Malformed BPB".to_string()));
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bpb_is_segmented() {
        assert!(is_bpb_segmented(&[]).unwrap());
        assert!(is_bpb_segmented(&BlobParams::new().finish()).unwrap());
    }

    #[test]
    fn test_stream_bpb() {
        let bpb = BlobParams::new().stream().finish();

        assert_eq!(bpb, vec![BPB_VERSION, BPB_TYPE, 1, BPB_TYPE_STREAM]);
        assert!(!is_bpb_segmented(&bpb).unwrap());
    }

    #[test]
    fn test_explicit_segmented_bpb() {
        let bpb = BlobParams::new().segmented().finish();

        assert!(is_bpb_segmented(&bpb).unwrap());
    }

    #[test]
    fn test_type_found_after_other_clumplets() {
        let bpb = BlobParams::new().insert(1, &[2, 0]).stream().finish();

        assert!(!is_bpb_segmented(&bpb).unwrap());
    }

    #[test]
    fn test_wrong_version_is_malformed() {
        assert!(matches!(
            is_bpb_segmented(&[2, BPB_TYPE, 1, 1]),
            Err(BatchError::Configuration(_))
        ));
    }

    #[test]
    fn test_truncated_clumplet_is_malformed() {
        assert!(matches!(
            is_bpb_segmented(&[BPB_VERSION, BPB_TYPE, 2, 1]),
            Err(BatchError::Configuration(_))
        ));
        assert!(matches!(
            is_bpb_segmented(&[BPB_VERSION, 5]),
            Err(BatchError::Configuration(_))
        ));
    }
}
