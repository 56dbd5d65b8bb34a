//! Engine state snapshot
//!
//! The set of readable tiers, swapped as a whole. Readers clone the `Arc`
//! under a short read lock and then work without holding any lock.

use std::sync::Arc;

use crate::error::Result;
use crate::memtable::MemTable;
use crate::merge::MergeSource;
use crate::storage::{newest_first, SSTable};

/// Immutable view of every tier at one point in time
#[derive(Clone)]
pub(crate) struct EngineState {
    /// Accepts writes
    pub active: Arc<MemTable>,
    /// Frozen, being written to an SSTable
    pub flushing: Option<Arc<MemTable>>,
    /// Published tables, newest generation first
    pub sstables: Vec<Arc<SSTable>>,
}

impl EngineState {
    pub fn new(active: Arc<MemTable>, mut sstables: Vec<Arc<SSTable>>) -> Self {
        sort_tables(&mut sstables);
        Self {
            active,
            flushing: None,
            sstables,
        }
    }

    /// Merge sources over `[from, to)`, highest priority first
    pub fn sources(&self, from: Option<&[u8]>, to: Option<&[u8]>) -> Result<Vec<MergeSource>> {
        let mut sources: Vec<MergeSource> = Vec::with_capacity(self.sstables.len() + 2);
        sources.push(Box::new(self.active.range(from, to).map(Ok)));
        if let Some(flushing) = &self.flushing {
            sources.push(Box::new(flushing.range(from, to).map(Ok)));
        }
        for table in &self.sstables {
            sources.push(Box::new(table.range(from, to)?));
        }
        Ok(sources)
    }
}

pub(crate) fn sort_tables(tables: &mut [Arc<SSTable>]) {
    tables.sort_by(|a, b| newest_first(&a.id(), &b.id()));
}

/// Point-in-time counters reported by `Engine::stats`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Approximate bytes in the active memtable
    pub memtable_size: usize,
    pub memtable_entries: usize,
    /// Whether a frozen memtable is waiting for its SSTable
    pub flushing: bool,
    pub sstable_count: usize,
    /// Entries across all SSTables, shadowed versions included
    pub sstable_entries: usize,
    /// Bytes across all SSTable data files
    pub sstable_bytes: u64,
    /// Generation of the active memtable
    pub active_generation: u64,
    pub compaction_running: bool,
}
