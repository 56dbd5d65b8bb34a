//! Range scan results

use bytes::Bytes;

use crate::error::Result;
use crate::merge::MergeIterator;

/// Live key/value pairs of a range scan, ascending by key.
///
/// Reads from the snapshot taken when the scan started; later writes are
/// not visible.
pub struct EngineIterator {
    inner: MergeIterator,
}

impl EngineIterator {
    pub(crate) fn new(inner: MergeIterator) -> Self {
        Self { inner }
    }

    pub(crate) fn empty() -> Self {
        Self {
            inner: MergeIterator::empty(),
        }
    }
}

impl Iterator for EngineIterator {
    type Item = Result<(Bytes, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(crate::entry::Entry {
                    key,
                    value: Some(value),
                }) => return Some(Ok((key, value))),
                Ok(_) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
