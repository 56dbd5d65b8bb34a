//! Byte sources
//!
//! Positional read access to an immutable file, with a buffered file-handle
//! backend and a memory-mapped one.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use memmap2::Mmap;
use parking_lot::Mutex;

use crate::config::ReadBackend;
use crate::error::{Result, TierError};

/// Read-only random access to the bytes of a file
pub trait ByteSource: Send + Sync {
    /// Total length in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `len` bytes starting at `offset`
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes>;
}

fn check_bounds(offset: u64, len: usize, total: u64) -> Result<()> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= total => Ok(()),
        _ => Err(TierError::Corruption(format!(
            "read of {} bytes at offset {} past end of file ({} bytes)",
            len, offset, total
        ))),
    }
}

/// Seek-and-read through a shared file handle
pub struct FileSource {
    file: Mutex<File>,
    len: u64,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        check_bounds(offset, len, self.len)?;
        let mut buf = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

/// Whole-file read-only memory map
pub struct MmapSource {
    // Zero-length files cannot be mapped on every platform
    map: Option<Mmap>,
}

impl MmapSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Self { map: None });
        }
        // SAFETY: SSTable files are never modified after they are renamed
        // into place, only unlinked.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map: Some(map) })
    }

    fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}

impl ByteSource for MmapSource {
    fn len(&self) -> u64 {
        self.bytes().len() as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        check_bounds(offset, len, self.len())?;
        let start = offset as usize;
        Ok(Bytes::copy_from_slice(&self.bytes()[start..start + len]))
    }
}

/// Open `path` with the configured backend
pub fn open_source(path: &Path, backend: ReadBackend) -> Result<Arc<dyn ByteSource>> {
    Ok(match backend {
        ReadBackend::Buffered => Arc::new(FileSource::open(path)?),
        ReadBackend::Mmap => Arc::new(MmapSource::open(path)?),
    })
}
