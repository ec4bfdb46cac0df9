//! Input message layouts
//!
//! A `MessageFormat` describes the fixed binary record a prepared statement
//! expects for its input parameters. Every field is placed at its natural
//! alignment and is followed by a 2-byte null indicator; the record as a
//! whole is padded to the widest field alignment.

use serde::{Deserialize, Serialize};

use crate::{BLOB_ID_SIZE, align_up};

/// Size in bytes of the null indicator that follows every field
pub const NULL_INDICATOR_SIZE: usize = 2;

/// Type of a single input parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// 16-bit signed integer
    SmallInt,
    /// 32-bit signed integer
    Integer,
    /// 64-bit signed integer
    BigInt,
    /// 64-bit floating point
    Double,
    /// Fixed-length character data
    Char(u16),
    /// Variable-length character data with a 2-byte length prefix
    Varchar(u16),
    /// Blob id slot
    Blob,
}

impl FieldType {
    /// Number of bytes the field occupies in a message
    pub fn size(&self) -> usize {
        match self {
            Self::SmallInt => 2,
            Self::Integer => 4,
            Self::BigInt | Self::Double => 8,
            Self::Char(len) => *len as usize,
            Self::Varchar(len) => 2 + *len as usize,
            Self::Blob => BLOB_ID_SIZE,
        }
    }

    /// Required alignment of the field within a message
    pub fn alignment(&self) -> usize {
        match self {
            Self::SmallInt | Self::Varchar(_) => 2,
            Self::Integer => 4,
            Self::BigInt | Self::Double | Self::Blob => 8,
            Self::Char(_) => 1,
        }
    }

    /// Check if the field holds a blob id
    pub fn is_blob(&self) -> bool {
        matches!(self, Self::Blob)
    }
}

/// A field placed within a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDesc {
    /// Type of the field
    pub field_type: FieldType,
    /// Byte offset of the value
    pub offset: usize,
    /// Byte offset of the 2-byte null indicator
    pub null_offset: usize,
}

/// Binary layout of one input message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFormat {
    fields: Vec<FieldDesc>,
    length: usize,
    alignment: usize,
}

impl MessageFormat {
    /// Lay out a message for the given field types, in order
    pub fn new(types: impl IntoIterator<Item = FieldType>) -> Self {
        let mut fields = Vec::new();
        let mut offset = 0;
        let mut alignment = NULL_INDICATOR_SIZE;

        for field_type in types {
            let value_offset = align_up(offset, field_type.alignment());
            let null_offset = align_up(value_offset + field_type.size(), NULL_INDICATOR_SIZE);
            offset = null_offset + NULL_INDICATOR_SIZE;
            alignment = alignment.max(field_type.alignment());

            fields.push(FieldDesc {
                field_type,
                offset: value_offset,
                null_offset,
            });
        }

        Self {
            fields,
            length: offset,
            alignment,
        }
    }

    /// Fields of the message, in declaration order
    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    /// Unpadded message length in bytes
    pub fn length(&self) -> usize {
        self.length
    }

    /// Alignment of the message
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Length of one message as stored in a batch, padded to the alignment
    pub fn aligned_length(&self) -> usize {
        align_up(self.length, self.alignment)
    }

    /// Blob fields of the message
    pub fn blob_fields(&self) -> impl Iterator<Item = &FieldDesc> {
        self.fields.iter().filter(|f| f.field_type.is_blob())
    }

    /// Check if any field holds a blob id
    pub fn has_blobs(&self) -> bool {
        self.blob_fields().next().is_some()
    }
}

/// Check whether the null indicator at `null_offset` marks the field as NULL.
pub fn is_null_at(message: &[u8], null_offset: usize) -> bool {
    match message.get(null_offset..null_offset + NULL_INDICATOR_SIZE) {
        Some(bytes) => i16::from_le_bytes([bytes[0], bytes[1]]) != 0,
        None => true,
    }
}
