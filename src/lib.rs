//! # TierKV
//!
//! An embeddable LSM-tree key-value store with:
//! - Write-Ahead Logging (WAL) for durability, one segment per memtable
//! - Crash recovery with partial write handling
//! - Immutable SSTables with an offset index and crash-safe publication
//! - Background flush and full compaction on dedicated workers
//! - Snapshot reads that never wait for background work
//!
//! ## Architecture Overview
//!
//! ```text
//!            upsert                               get / range
//!               │                                     │
//! ┌─────────────▼─────────────┐          ┌────────────▼────────────┐
//! │  Writer lock              │          │  State snapshot (Arc)   │
//! │  WAL append → memtable    │          │  MergeIterator          │
//! └─────────────┬─────────────┘          └────────────┬────────────┘
//!               │                                     │
//!   ┌───────────▼──────────┐   ┌──────────────┐   ┌───▼──────────────┐
//!   │ Active MemTable      │──►│ Flushing     │──►│ SSTables         │
//!   │ (SkipMap)            │   │ MemTable     │   │ (newest first)   │
//!   └──────────────────────┘   └──────┬───────┘   └───▲──────────┬───┘
//!                                     │ flush worker  │          │
//!                                     └───────────────┘          │
//!                                        compaction worker ◄─────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod entry;
pub mod error;

pub mod engine;
pub mod memtable;
pub mod merge;
pub mod storage;
pub mod wal;

mod io_util;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{BackpressurePolicy, Config, ReadBackend, WalSyncStrategy};
pub use engine::{Engine, EngineIterator, EngineStats};
pub use entry::Entry;
pub use error::{Result, TierError};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of TierKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
