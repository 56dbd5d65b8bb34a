//! Configuration for TierKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, TierError};

/// Main configuration for a TierKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files (WAL, SSTables, etc.)
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal/             (one segment per memtable generation)
    ///     └── sstables/        (data + index file per table)
    pub data_dir: PathBuf,

    /// How SSTable files are read
    pub read_backend: ReadBackend,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// Keep opening when a WAL segment lost acknowledged records
    pub tolerate_wal_data_loss: bool,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    /// What a writer does when the memtable is full and a flush is running
    pub backpressure: BackpressurePolicy,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Schedule a background compaction once this many SSTables exist
    pub auto_compact_threshold: Option<usize>,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (group commit)
    EveryNEntries { count: usize },
}

/// Writer behaviour when the flushing slot is occupied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// Wait until the in-flight flush publishes its SSTable
    Block,

    /// Fail fast with `TierError::Overloaded`
    Reject,
}

/// Backend used by `ByteSource` to read SSTable files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadBackend {
    /// Positional reads through a file handle
    Buffered,

    /// Read-only memory map of the whole file
    Mmap,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tierkv_data"),
            read_backend: ReadBackend::Buffered,
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            tolerate_wal_data_loss: false,
            memtable_size_limit: 4 * 1024 * 1024, // 4 MB
            backpressure: BackpressurePolicy::Block,
            auto_compact_threshold: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the values a running engine relies on
    pub fn validate(&self) -> Result<()> {
        if self.memtable_size_limit == 0 {
            return Err(TierError::Config(
                "memtable_size_limit must be greater than zero".to_string(),
            ));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(TierError::Config(
                "EveryNEntries sync count must be greater than zero".to_string(),
            ));
        }
        if let Some(threshold) = self.auto_compact_threshold {
            if threshold < 2 {
                return Err(TierError::Config(format!(
                    "auto_compact_threshold must be at least 2, got {}",
                    threshold
                )));
            }
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the SSTable read backend
    pub fn read_backend(mut self, backend: ReadBackend) -> Self {
        self.config.read_backend = backend;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Open even when a WAL segment reports lost records
    pub fn tolerate_wal_data_loss(mut self, tolerate: bool) -> Self {
        self.config.tolerate_wal_data_loss = tolerate;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the backpressure policy
    pub fn backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.config.backpressure = policy;
        self
    }

    /// Enable automatic compaction at the given SSTable count
    pub fn auto_compact_threshold(mut self, threshold: Option<usize>) -> Self {
        self.config.auto_compact_threshold = threshold;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate
    pub fn try_build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
