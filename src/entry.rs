//! Entry definitions
//!
//! The unit of data moved between memtables, the WAL and SSTables, plus the
//! length-prefixed encoding shared by the WAL payload and SSTable data files:
//!
//! ```text
//! ┌─────────────┬───────────┬───────────────────────┬─────────────┐
//! │ KeyLen (4)  │ Key       │ ValLen (4)            │ Value       │
//! │ u32 LE      │ KeyLen B  │ u32 LE, MAX=tombstone │ ValLen B    │
//! └─────────────┴───────────┴───────────────────────┴─────────────┘
//! ```

use bytes::{Buf, BufMut, Bytes};

use crate::error::{Result, TierError};

/// Sentinel value length marking a tombstone (the `-1` of the on-disk format)
pub const TOMBSTONE_MARKER: u32 = u32::MAX;

/// Fixed per-entry size of the two length prefixes
pub const ENTRY_HEADER_SIZE: usize = 8;

/// A key and its optional value. `value == None` is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Bytes,
    pub value: Option<Bytes>,
}

impl Entry {
    /// A live key/value pair
    pub fn put(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// A delete marker for `key`
    pub fn tombstone(key: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Copy borrowed slices into an owned entry
    pub fn from_slices(key: &[u8], value: Option<&[u8]>) -> Self {
        Self {
            key: Bytes::copy_from_slice(key),
            value: value.map(Bytes::copy_from_slice),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Size of this entry in the on-disk encoding
    pub fn encoded_len(&self) -> usize {
        ENTRY_HEADER_SIZE + self.key.len() + self.value.as_ref().map_or(0, |v| v.len())
    }

    /// Append the encoded entry to `buf`
    pub fn encode_into(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.key.len() as u32);
        buf.put_slice(&self.key);
        match &self.value {
            Some(value) => {
                buf.put_u32_le(value.len() as u32);
                buf.put_slice(value);
            }
            None => buf.put_u32_le(TOMBSTONE_MARKER),
        }
    }

    /// Encode into a fresh buffer
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decode one entry from the front of `buf`, advancing past it.
    ///
    /// Key and value share `buf`'s allocation.
    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        let key_len = read_len(buf, "key length")?;
        if buf.remaining() < key_len as usize {
            return Err(TierError::Corruption(format!(
                "entry key truncated: need {} bytes, have {}",
                key_len,
                buf.remaining()
            )));
        }
        let key = buf.split_to(key_len as usize);

        let val_len = read_len(buf, "value length")?;
        let value = if val_len == TOMBSTONE_MARKER {
            None
        } else {
            if buf.remaining() < val_len as usize {
                return Err(TierError::Corruption(format!(
                    "entry value truncated: need {} bytes, have {}",
                    val_len,
                    buf.remaining()
                )));
            }
            Some(buf.split_to(val_len as usize))
        };

        Ok(Self { key, value })
    }
}

fn read_len(buf: &mut Bytes, what: &str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(TierError::Corruption(format!(
            "entry {} truncated: {} byte(s) left",
            what,
            buf.remaining()
        )));
    }
    Ok(buf.get_u32_le())
}
