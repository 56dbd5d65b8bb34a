//! Compactor
//!
//! Full compaction: every SSTable in a snapshot is merged into one table
//! with tombstones dropped. Tables flushed while the merge runs are not in
//! the snapshot and stay in the live set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::state::{sort_tables, EngineState};
use super::EngineInner;
use crate::error::Result;
use crate::merge::{MergeIterator, MergeSource};
use crate::storage::TableId;

/// Clears the running flag however the compaction ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EngineInner {
    pub(super) fn is_compacting(&self) -> bool {
        self.compaction_running.load(Ordering::Acquire)
    }

    /// Merge the current SSTables into one. Runs on the compaction worker.
    pub(super) fn compact_tables(&self) -> Result<()> {
        if self
            .compaction_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        let _running = RunningGuard(&self.compaction_running);

        let inputs = self.state.read().sstables.clone();
        match inputs.as_slice() {
            [] => return Ok(()),
            [only] if only.id().is_compacted() => return Ok(()),
            _ => {}
        }

        let base = inputs.iter().map(|t| t.id().base).min().unwrap_or(0);
        let generation = inputs.iter().map(|t| t.generation()).max().unwrap_or(0);
        let id = TableId::compacted(base, generation);
        tracing::info!(table = %id, inputs = inputs.len(), "compaction started");

        // Inputs are already newest first, which is merge priority order.
        let sources: Vec<MergeSource> = inputs
            .iter()
            .map(|table| Box::new(table.iter()) as MergeSource)
            .collect();
        let output = self.storage.write_table(id, MergeIterator::new(sources)?)?;
        let entries = output.entry_count();

        {
            let mut state = self.state.write();
            let mut next = EngineState::clone(&state);
            next.sstables
                .retain(|table| !inputs.iter().any(|input| Arc::ptr_eq(input, table)));
            next.sstables.push(output);
            sort_tables(&mut next.sstables);
            *state = Arc::new(next);
        }

        // Files go once the last snapshot still scanning them is dropped.
        for table in &inputs {
            table.mark_obsolete();
        }

        tracing::info!(table = %id, entries, "compaction finished");
        Ok(())
    }
}
