//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTables, and Storage
//! - Handle concurrent read/write access
//! - Hand full memtables to the flush worker, with backpressure
//! - Run compactions on the compaction worker
//! - Manage crash recovery on startup
//!
//! ## Concurrency Model
//!
//! - **Writes** (upsert/put/delete/flush): serialized by the writer lock,
//!   which owns the active WAL segment. WAL append and memtable insert
//!   happen under it, so per-key order is real-time order.
//! - **Reads** (get/range): clone the current `EngineState` under a short
//!   read lock, then read memtables and SSTables with no lock held.
//! - **Background**: one flush worker and one compaction worker. Both
//!   publish by replacing the state pointer; I/O never runs under the
//!   state lock.
//!
//! Lock order is writer → state.

mod compaction;
mod flush;
mod iterator;
mod state;
mod worker;

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel;
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};

use crate::config::{BackpressurePolicy, Config};
use crate::entry::Entry;
use crate::error::{Result, TierError};
use crate::memtable::MemTable;
use crate::merge::MergeIterator;
use crate::storage::{StorageManager, TableId};
use crate::wal::{WalDirectory, WalWriter};

pub use iterator::EngineIterator;
pub use state::EngineStats;

use state::EngineState;
use worker::{Background, CompactTask, FlushTask};

/// State guarded by the writer lock
pub(crate) struct WriterState {
    /// Segment of the active memtable's generation
    wal: WalWriter,
    /// Generation the next frozen-and-replaced memtable hands out
    next_generation: u64,
    /// A flush task is queued or running
    flush_in_flight: bool,
    /// Error of the last failed flush, until a writer reports it
    flush_failure: Option<String>,
}

/// Shared by the engine handle and the background workers
pub(crate) struct EngineInner {
    config: Config,
    storage: StorageManager,
    wal_dir: WalDirectory,
    state: RwLock<Arc<EngineState>>,
    writer: Mutex<WriterState>,
    /// Signalled whenever a flush finishes, successfully or not
    flush_done: Condvar,
    compaction_running: AtomicBool,
    closed: AtomicBool,
}

impl EngineInner {
    fn snapshot(&self) -> Arc<EngineState> {
        Arc::clone(&self.state.read())
    }
}

/// The main storage engine
///
/// Cheap to share across threads behind an `Arc`; every method takes `&self`.
pub struct Engine {
    inner: Arc<EngineInner>,
    /// Owns the worker channels. Kept outside `EngineInner` so the workers'
    /// references to the inner state do not keep their own queues open.
    background: Mutex<Option<Background>>,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_DIR: &'static str = "wal";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Load existing SSTables (cleaning up interrupted writes)
    /// 3. Drop WAL segments already covered by an SSTable
    /// 4. Replay every other segment and flush it to its own SSTable
    /// 5. Start a new generation and the background workers
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let storage = StorageManager::open(
            &config.data_dir.join(Self::SSTABLE_DIR),
            config.read_backend,
        )?;
        let wal_dir = WalDirectory::open(config.data_dir.join(Self::WAL_DIR))?;

        let mut sstables = storage.open_all()?;
        let mut max_generation = sstables.iter().map(|t| t.generation()).max().unwrap_or(0);
        wal_dir.checkpoint(max_generation)?;

        for segment in wal_dir.segments()? {
            let (entries, recovery) = wal_dir.replay(segment)?;
            if recovery.has_data_loss() {
                if !config.tolerate_wal_data_loss {
                    return Err(TierError::WalDataLoss {
                        segment,
                        corrupted: recovery.entries_lost,
                    });
                }
                tracing::error!(
                    segment,
                    lost = recovery.entries_lost,
                    "WAL segment lost acknowledged records, continuing"
                );
            }
            tracing::info!(
                segment,
                recovered = recovery.entries_recovered,
                corrupted = recovery.entries_corrupted,
                last_lsn = recovery.last_lsn,
                "replayed WAL segment"
            );

            if !entries.is_empty() {
                let memtable = Arc::new(MemTable::new(segment, config.memtable_size_limit));
                for record in entries {
                    memtable.put(record.entry);
                }
                let table = storage.write_table(TableId::flushed(segment), memtable.iter().map(Ok))?;
                sstables.push(table);
            }
            wal_dir.checkpoint(segment)?;
            max_generation = max_generation.max(segment);
        }

        let generation = max_generation + 1;
        let wal = wal_dir.create_segment(generation, config.wal_sync_strategy)?;
        let active = Arc::new(MemTable::new(generation, config.memtable_size_limit));
        let state = EngineState::new(active, sstables);

        tracing::info!(
            data_dir = %config.data_dir.display(),
            generation,
            sstables = state.sstables.len(),
            "engine opened"
        );

        let inner = Arc::new(EngineInner {
            config,
            storage,
            wal_dir,
            state: RwLock::new(Arc::new(state)),
            writer: Mutex::new(WriterState {
                wal,
                next_generation: generation + 1,
                flush_in_flight: false,
                flush_failure: None,
            }),
            flush_done: Condvar::new(),
            compaction_running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        let background = Background::spawn(&inner)?;

        Ok(Self {
            inner,
            background: Mutex::new(Some(background)),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value by key
    ///
    /// Search order:
    /// 1. Active memtable (most recent writes)
    /// 2. Flushing memtable
    /// 3. SSTables (newest to oldest)
    ///
    /// The first tier holding the key decides; a tombstone there means absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.check_open()?;
        let snapshot = self.inner.snapshot();

        if let Some(entry) = snapshot.active.get(key) {
            return Ok(entry.value);
        }
        if let Some(entry) = snapshot.flushing.as_ref().and_then(|m| m.get(key)) {
            return Ok(entry.value);
        }
        for table in &snapshot.sstables {
            if let Some(entry) = table.get(key)? {
                return Ok(entry.value);
            }
        }
        Ok(None)
    }

    /// Scan live keys in `[from, to)`, ascending. `None` leaves a side open.
    pub fn range(&self, from: Option<&[u8]>, to: Option<&[u8]>) -> Result<EngineIterator> {
        self.check_open()?;
        if let (Some(from), Some(to)) = (from, to) {
            if from >= to {
                return Ok(EngineIterator::empty());
            }
        }
        let snapshot = self.inner.snapshot();
        let merge = MergeIterator::new(snapshot.sources(from, to)?)?;
        Ok(EngineIterator::new(merge))
    }

    /// Scan every live key
    pub fn scan(&self) -> Result<EngineIterator> {
        self.range(None, None)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert or overwrite an entry; a tombstone entry deletes its key.
    ///
    /// Steps:
    /// 1. Acquire writer lock
    /// 2. Make room if the active memtable is full (freeze or backpressure)
    /// 3. Append to the WAL (durability)
    /// 4. Insert into the active memtable
    /// 5. Freeze and hand off to the flush worker if now full
    pub fn upsert(&self, entry: Entry) -> Result<()> {
        self.check_open()?;
        let mut writer = self.inner.writer.lock();
        self.check_open()?;

        self.make_room(&mut writer)?;

        writer.wal.append(&entry)?;
        let full = self.inner.state.read().active.put(entry);

        if full && self.inner.state.read().flushing.is_none() {
            // The write is already durable and visible; a failed hand-off is
            // retried by the next writer.
            if let Err(e) = self.freeze_and_submit(&mut writer, None) {
                tracing::warn!(error = %e, "could not start flush after write");
            }
        }
        Ok(())
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.upsert(Entry::from_slices(key, Some(value)))
    }

    /// Delete a key (writes a tombstone)
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.upsert(Entry::from_slices(key, None))
    }

    /// Flush the active memtable and wait for its SSTable.
    ///
    /// Waits for an in-flight flush first. A memtable whose earlier flush
    /// failed is flushed again and this call reports how that retry went.
    /// An empty memtable is not flushed.
    pub fn flush(&self) -> Result<()> {
        self.check_open()?;
        let reply = {
            let mut writer = self.inner.writer.lock();
            self.drain_flush_slot(&mut writer)?;
            if self.inner.state.read().active.is_empty() {
                return Ok(());
            }
            let (tx, rx) = channel::bounded(1);
            self.freeze_and_submit(&mut writer, Some(tx))?;
            rx
        };
        reply
            .recv()
            .map_err(|_| TierError::Background("flush worker dropped the request".to_string()))?
    }

    /// Merge all SSTables into one and wait for it.
    ///
    /// Returns immediately if a compaction is already running.
    pub fn compact(&self) -> Result<()> {
        self.check_open()?;
        if self.inner.is_compacting() {
            return Ok(());
        }
        let (tx, rx) = channel::bounded(1);
        {
            let background = self.background.lock();
            let background = background.as_ref().ok_or(TierError::Closed)?;
            background.submit_compaction(CompactTask { reply: Some(tx) })?;
        }
        rx.recv().map_err(|_| {
            TierError::Background("compaction worker dropped the request".to_string())
        })?
    }

    /// Close the engine gracefully
    ///
    /// Flushes the active memtable, syncs the WAL and stops the workers after
    /// they finish their current task. Every call after this fails with
    /// `Closed`.
    pub fn close(&self) -> Result<()> {
        self.check_open()?;
        self.flush()?;

        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(TierError::Closed);
        }
        self.inner.writer.lock().wal.sync()?;

        let background = self.background.lock().take();
        if let Some(mut background) = background {
            background.shutdown()?;
        }
        tracing::info!(data_dir = %self.data_dir().display(), "engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.inner.config.data_dir
    }

    /// Get the storage directory path (where SSTables are stored)
    pub fn storage_dir(&self) -> &Path {
        self.inner.storage.dir()
    }

    /// Get the WAL directory path
    pub fn wal_dir(&self) -> &Path {
        self.inner.wal_dir.path()
    }

    /// Get the active memtable size
    pub fn memtable_size(&self) -> usize {
        self.inner.state.read().active.size()
    }

    /// Get the active memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.inner.state.read().active.entry_count()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.inner.state.read().sstables.len()
    }

    /// Whether a frozen memtable is still waiting for its SSTable
    pub fn is_flushing(&self) -> bool {
        self.inner.state.read().flushing.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn stats(&self) -> EngineStats {
        let snapshot = self.inner.snapshot();
        EngineStats {
            memtable_size: snapshot.active.size(),
            memtable_entries: snapshot.active.entry_count(),
            flushing: snapshot.flushing.is_some(),
            sstable_count: snapshot.sstables.len(),
            sstable_entries: snapshot.sstables.iter().map(|t| t.entry_count()).sum(),
            sstable_bytes: snapshot.sstables.iter().map(|t| t.data_size()).sum(),
            active_generation: snapshot.active.generation(),
            compaction_running: self.inner.is_compacting(),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            Err(TierError::Closed)
        } else {
            Ok(())
        }
    }

    /// Ensure the active memtable has room for one more write
    fn make_room(&self, writer: &mut MutexGuard<'_, WriterState>) -> Result<()> {
        while self.inner.state.read().active.should_flush() {
            if self.inner.state.read().flushing.is_none() {
                return self.freeze_and_submit(writer, None);
            }
            self.wait_for_flush_slot(writer)?;
        }
        Ok(())
    }

    /// Return once the flushing slot is empty, or fail per the configured
    /// backpressure policy.
    ///
    /// A flush that failed earlier is resubmitted and its error reported.
    fn wait_for_flush_slot(&self, writer: &mut MutexGuard<'_, WriterState>) -> Result<()> {
        loop {
            let Some(flushing) = self.inner.state.read().flushing.clone() else {
                return Ok(());
            };

            if !writer.flush_in_flight {
                let failure = writer.flush_failure.take();
                self.submit_flush(writer, flushing, None)?;
                if let Some(failure) = failure {
                    return Err(TierError::FlushFailed(failure));
                }
            }

            match self.inner.config.backpressure {
                BackpressurePolicy::Reject => {
                    tracing::debug!("memtable full while flushing, rejecting write");
                    return Err(TierError::Overloaded);
                }
                BackpressurePolicy::Block => {
                    tracing::debug!("memtable full while flushing, waiting");
                    self.inner.flush_done.wait(writer);
                }
            }
        }
    }

    /// Wait until the flushing slot is empty, retrying a failed flush once.
    ///
    /// A failure recorded before this call is stale and only triggers the
    /// retry; the error returned is the one from an attempt made after it.
    fn drain_flush_slot(&self, writer: &mut MutexGuard<'_, WriterState>) -> Result<()> {
        let mut retried = false;
        loop {
            let Some(flushing) = self.inner.state.read().flushing.clone() else {
                return Ok(());
            };

            if !writer.flush_in_flight {
                if retried {
                    if let Some(failure) = writer.flush_failure.clone() {
                        return Err(TierError::FlushFailed(failure));
                    }
                }
                if let Some(stale) = writer.flush_failure.take() {
                    tracing::info!(error = %stale, "retrying failed flush");
                }
                self.submit_flush(writer, flushing, None)?;
                retried = true;
            }

            self.inner.flush_done.wait(writer);
        }
    }

    fn freeze_and_submit(
        &self,
        writer: &mut MutexGuard<'_, WriterState>,
        reply: Option<channel::Sender<Result<()>>>,
    ) -> Result<()> {
        let frozen = self.inner.freeze(writer)?;
        self.submit_flush(writer, frozen, reply)
    }

    fn submit_flush(
        &self,
        writer: &mut MutexGuard<'_, WriterState>,
        memtable: Arc<MemTable>,
        reply: Option<channel::Sender<Result<()>>>,
    ) -> Result<()> {
        let background = self.background.lock();
        let background = background.as_ref().ok_or(TierError::Closed)?;
        background.submit_flush(FlushTask { memtable, reply })?;
        writer.flush_in_flight = true;
        Ok(())
    }
}

impl Drop for Engine {
    /// Stops the workers without flushing; the WAL still covers the active
    /// memtable.
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::Release);
        self.background.lock().take();
    }
}
