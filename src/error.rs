//! Error types for TierKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using TierError
pub type Result<T> = std::result::Result<T, TierError>;

/// Unified error type for TierKV operations
#[derive(Debug, Error)]
pub enum TierError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    /// A corrupted record was followed by valid ones, so an acknowledged
    /// write is gone. Reported by `Engine::open`.
    #[error("WAL segment {segment} lost {corrupted} acknowledged record(s)")]
    WalDataLoss { segment: u64, corrupted: u64 },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("SSTable corruption: {0}")]
    Corruption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Write Path Errors
    // -------------------------------------------------------------------------
    /// The memtable is full and a flush is still in flight.
    #[error("Engine overloaded: flush in progress, retry the write")]
    Overloaded,

    #[error("Background flush failed: {0}")]
    FlushFailed(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Engine is closed")]
    Closed,

    #[error("Background worker unavailable: {0}")]
    Background(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
