//! Flush coordinator
//!
//! `Active -> Flushing -> Active`. The writer freezes the active memtable
//! under the writer lock; the flush worker turns it into an SSTable with no
//! lock held and publishes it with one state swap.

use std::sync::Arc;

use super::state::{sort_tables, EngineState};
use super::{EngineInner, WriterState};
use crate::error::{Result, TierError};
use crate::memtable::MemTable;
use crate::storage::TableId;

impl EngineInner {
    /// Swap the active memtable into the flushing slot and start a new
    /// generation with its own WAL segment.
    ///
    /// Caller holds the writer lock and has checked the flushing slot is free.
    pub(super) fn freeze(&self, writer: &mut WriterState) -> Result<Arc<MemTable>> {
        let generation = writer.next_generation;

        // Every record of the old segment must be durable before its
        // memtable can be flushed and the segment checkpointed.
        writer.wal.sync()?;
        let wal = self
            .wal_dir
            .create_segment(generation, self.config.wal_sync_strategy)?;
        writer.wal = wal;
        writer.next_generation += 1;

        let fresh = Arc::new(MemTable::new(generation, self.config.memtable_size_limit));
        let mut state = self.state.write();
        let frozen = Arc::clone(&state.active);
        debug_assert!(state.flushing.is_none());
        *state = Arc::new(EngineState {
            active: fresh,
            flushing: Some(Arc::clone(&frozen)),
            sstables: state.sstables.clone(),
        });

        tracing::debug!(
            frozen = frozen.generation(),
            entries = frozen.entry_count(),
            size = frozen.size(),
            "memtable frozen"
        );
        Ok(frozen)
    }

    /// Write `memtable` as an SSTable and publish it. Runs on the flush worker.
    pub(super) fn flush_memtable(&self, memtable: &Arc<MemTable>) -> Result<()> {
        let generation = memtable.generation();
        tracing::info!(generation, entries = memtable.entry_count(), "flush started");

        let written = self
            .storage
            .write_table(TableId::flushed(generation), memtable.iter().map(Ok));
        let table = match written {
            Ok(table) => table,
            Err(e) => {
                let message = e.to_string();
                tracing::error!(generation, error = %message, "flush failed");
                {
                    let mut writer = self.writer.lock();
                    writer.flush_in_flight = false;
                    writer.flush_failure = Some(message.clone());
                }
                self.flush_done.notify_all();
                return Err(TierError::FlushFailed(message));
            }
        };

        {
            let mut writer = self.writer.lock();
            let mut state = self.state.write();
            let mut next = EngineState::clone(&state);
            if next
                .flushing
                .as_ref()
                .is_some_and(|flushing| Arc::ptr_eq(flushing, memtable))
            {
                next.flushing = None;
            }
            next.sstables.push(table);
            sort_tables(&mut next.sstables);
            *state = Arc::new(next);

            writer.flush_in_flight = false;
            writer.flush_failure = None;
        }
        self.flush_done.notify_all();

        // The table is durable; a segment left behind here is removed on the
        // next open because its generation is not above any table's.
        if let Err(e) = self.wal_dir.checkpoint(generation) {
            tracing::warn!(generation, error = %e, "WAL checkpoint failed");
        }

        tracing::info!(generation, "flush finished");
        Ok(())
    }

    /// True once enough tables exist to trigger a background compaction
    pub(super) fn wants_auto_compaction(&self) -> bool {
        match self.config.auto_compact_threshold {
            Some(threshold) => {
                !self.is_compacting() && self.state.read().sstables.len() >= threshold
            }
            None => false,
        }
    }
}
