//! WAL Entry definitions
//!
//! Defines the structure of individual WAL records and their codec.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes};

use crate::entry::Entry;
use crate::error::{Result, TierError};

/// Record header: LSN (8) + CRC (4) + payload length (4)
pub const HEADER_SIZE: usize = 16;

/// Timestamp prefix inside the payload
const TIMESTAMP_SIZE: usize = 8;

/// Smallest payload a record can carry: timestamp plus an empty key and value
pub(crate) const MIN_PAYLOAD_SIZE: usize = TIMESTAMP_SIZE + crate::entry::ENTRY_HEADER_SIZE;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing within a segment
    pub lsn: u64,

    /// The logged upsert (tombstone for deletes)
    pub entry: Entry,

    /// Timestamp (unix millis) when the record was created
    pub timestamp: u64,
}

/// Fields of a record header, before the payload is checked
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordHeader {
    pub lsn: u64,
    pub crc: u32,
    pub len: u32,
}

impl RecordHeader {
    pub(crate) fn parse(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut buf = &bytes[..];
        Self {
            lsn: buf.get_u64_le(),
            crc: buf.get_u32_le(),
            len: buf.get_u32_le(),
        }
    }

    /// True if `payload` is what this header's checksum was computed over
    pub(crate) fn matches(&self, payload: &[u8]) -> bool {
        payload.len() == self.len as usize && checksum(self.lsn, self.len, payload) == self.crc
    }
}

impl WalEntry {
    pub fn new(lsn: u64, entry: Entry) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            lsn,
            entry,
            timestamp,
        }
    }

    fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(TIMESTAMP_SIZE + self.entry.encoded_len());
        payload.put_u64_le(self.timestamp);
        self.entry.encode_into(&mut payload);
        payload
    }

    /// Total bytes this record occupies on disk
    pub fn serialized_size(&self) -> usize {
        HEADER_SIZE + TIMESTAMP_SIZE + self.entry.encoded_len()
    }

    /// CRC over LSN, payload length and payload
    pub fn compute_crc(&self) -> u32 {
        let payload = self.payload();
        checksum(self.lsn, payload.len() as u32, &payload)
    }

    /// Encode as `[LSN][CRC][Len][Payload]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = self.payload();
        let len = u32::try_from(payload.len()).map_err(|_| {
            TierError::WalCorruption(format!("record payload too large: {} bytes", payload.len()))
        })?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.put_u64_le(self.lsn);
        buf.put_u32_le(checksum(self.lsn, len, &payload));
        buf.put_u32_le(len);
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode exactly one record from `bytes`
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(TierError::WalCorruption(format!(
                "record header truncated: {} of {} bytes",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&bytes[..HEADER_SIZE]);
        let header = RecordHeader::parse(&header);

        let payload = &bytes[HEADER_SIZE..];
        if payload.len() != header.len as usize {
            return Err(TierError::WalCorruption(format!(
                "record payload length mismatch: header says {}, got {}",
                header.len,
                payload.len()
            )));
        }
        Self::from_parts(header, Bytes::copy_from_slice(payload))
    }

    /// Verify the checksum and decode the payload of a fully read record
    pub(crate) fn from_parts(header: RecordHeader, payload: Bytes) -> Result<Self> {
        let actual = checksum(header.lsn, header.len, &payload);
        if actual != header.crc {
            return Err(TierError::WalCorruption(format!(
                "CRC mismatch at LSN {}: expected {:#010x}, got {:#010x}",
                header.lsn, header.crc, actual
            )));
        }

        let mut payload = payload;
        if payload.remaining() < TIMESTAMP_SIZE {
            return Err(TierError::WalCorruption(format!(
                "record {} payload too short for timestamp",
                header.lsn
            )));
        }
        let timestamp = payload.get_u64_le();
        let entry = Entry::decode(&mut payload)
            .map_err(|e| TierError::WalCorruption(format!("record {}: {}", header.lsn, e)))?;
        if payload.has_remaining() {
            return Err(TierError::WalCorruption(format!(
                "record {} has {} trailing payload bytes",
                header.lsn,
                payload.remaining()
            )));
        }

        Ok(Self {
            lsn: header.lsn,
            entry,
            timestamp,
        })
    }
}

fn checksum(lsn: u64, len: u32, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lsn.to_le_bytes());
    hasher.update(&len.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}
