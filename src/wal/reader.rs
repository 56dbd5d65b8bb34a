//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;

use super::entry::{RecordHeader, MIN_PAYLOAD_SIZE};
use super::{WalEntry, HEADER_SIZE};
use crate::error::{Result, TierError};

/// Outcome of reading one record slot
pub(crate) enum RecordRead {
    /// Checksum and payload verified
    Valid(WalEntry),

    /// A damaged record. The reader has already moved to the next valid
    /// record, or to the end of the file if none follows.
    Corrupted { lsn: u64, error: TierError },

    /// The file ends inside a header or payload (partial write) and no
    /// valid record follows
    Torn,
}

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset of the next unread record
    position: u64,
    /// Readable limit, pulled back to `position` once a torn record is seen
    end: u64,
    /// LSN of the last valid record; later records always carry a higher one
    last_lsn: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let end = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            end,
            last_lsn: 0,
        })
    }

    /// Byte offset just past the last record read
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next record slot without interpreting failures.
    ///
    /// A record whose length runs past the end of the file is only torn if
    /// no valid record follows it; otherwise its length field was damaged
    /// and the records after it are still there.
    pub(crate) fn read_record(&mut self) -> Result<Option<RecordRead>> {
        let remaining = self.end - self.position;
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            self.end = self.position;
            return Ok(Some(RecordRead::Torn));
        }

        let mut header_buf = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header_buf)?;
        let header = RecordHeader::parse(&header_buf);
        let available = remaining - HEADER_SIZE as u64;

        if header.len as u64 > available {
            let error = TierError::WalCorruption(format!(
                "record at offset {} claims {} payload bytes, {} left",
                self.position, header.len, available
            ));
            return self.skip_damaged(header.lsn, error, false);
        }

        let mut payload = vec![0u8; header.len as usize];
        self.reader.read_exact(&mut payload)?;

        match WalEntry::from_parts(header, Bytes::from(payload)) {
            Ok(entry) => {
                self.position += HEADER_SIZE as u64 + header.len as u64;
                self.last_lsn = entry.lsn;
                Ok(Some(RecordRead::Valid(entry)))
            }
            Err(error) => self.skip_damaged(header.lsn, error, true),
        }
    }

    /// Move past the damaged record at `position`.
    ///
    /// Its length field cannot be trusted, so the next record is searched
    /// for byte by byte from one past the damaged record's start.
    fn skip_damaged(
        &mut self,
        lsn: u64,
        error: TierError,
        complete: bool,
    ) -> Result<Option<RecordRead>> {
        match self.find_next_record(self.position + 1)? {
            Some(next) => {
                self.seek_to(next)?;
                Ok(Some(RecordRead::Corrupted { lsn, error }))
            }
            None if complete => {
                self.seek_to(self.end)?;
                Ok(Some(RecordRead::Corrupted { lsn, error }))
            }
            None => {
                self.end = self.position;
                Ok(Some(RecordRead::Torn))
            }
        }
    }

    /// Offset of the first valid record at or after `from`
    fn find_next_record(&mut self, from: u64) -> Result<Option<u64>> {
        if from >= self.end {
            return Ok(None);
        }
        self.reader.seek(SeekFrom::Start(from))?;
        let mut rest = Vec::with_capacity((self.end - from) as usize);
        (&mut self.reader).take(self.end - from).read_to_end(&mut rest)?;

        let found = (0..rest.len()).find(|&at| self.is_record_start(&rest[at..]));
        Ok(found.map(|at| from + at as u64))
    }

    fn is_record_start(&self, bytes: &[u8]) -> bool {
        let Some(Ok(header)) = bytes
            .get(..HEADER_SIZE)
            .map(<&[u8; HEADER_SIZE]>::try_from)
        else {
            return false;
        };
        let header = RecordHeader::parse(header);
        let len = header.len as usize;

        header.lsn > self.last_lsn
            && len >= MIN_PAYLOAD_SIZE
            && len <= bytes.len() - HEADER_SIZE
            && header.matches(&bytes[HEADER_SIZE..HEADER_SIZE + len])
    }

    fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    /// Read the next entry from the WAL.
    ///
    /// A partial record at the end of the file reads as end of log. A
    /// complete record that fails its checksum is an error.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        match self.read_record()? {
            None | Some(RecordRead::Torn) => Ok(None),
            Some(RecordRead::Valid(entry)) => Ok(Some(entry)),
            Some(RecordRead::Corrupted { error, .. }) => Err(error),
        }
    }

    /// Iterate over entries until the end of the log or the first error
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
