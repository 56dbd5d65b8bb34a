//! Background workers
//!
//! One long-lived flush thread and one long-lived compaction thread, each
//! fed by a bounded channel. A worker exits when every sender of its
//! channel is gone.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use super::EngineInner;
use crate::error::{Result, TierError};
use crate::memtable::MemTable;

/// Capacity of the flush queue. At most one flush is outstanding.
const FLUSH_QUEUE_DEPTH: usize = 1;

/// Capacity of the compaction queue
const COMPACT_QUEUE_DEPTH: usize = 4;

/// Write a frozen memtable to an SSTable
pub(crate) struct FlushTask {
    pub memtable: Arc<MemTable>,
    pub reply: Option<Sender<Result<()>>>,
}

/// Merge the current SSTables
pub(crate) struct CompactTask {
    pub reply: Option<Sender<Result<()>>>,
}

/// Channels and threads owned by an open engine
pub(crate) struct Background {
    flush_tx: Option<Sender<FlushTask>>,
    compact_tx: Option<Sender<CompactTask>>,
    flush_handle: Option<JoinHandle<()>>,
    compact_handle: Option<JoinHandle<()>>,
}

impl Background {
    pub fn spawn(inner: &Arc<EngineInner>) -> Result<Self> {
        let (flush_tx, flush_rx) = channel::bounded(FLUSH_QUEUE_DEPTH);
        let (compact_tx, compact_rx) = channel::bounded(COMPACT_QUEUE_DEPTH);

        let compact_handle = thread::Builder::new()
            .name("tierkv-compact".to_string())
            .spawn({
                let inner = Arc::clone(inner);
                move || compaction_loop(inner, compact_rx)
            })?;
        let flush_handle = thread::Builder::new()
            .name("tierkv-flush".to_string())
            .spawn({
                let inner = Arc::clone(inner);
                let compact_tx = compact_tx.clone();
                move || flush_loop(inner, flush_rx, compact_tx)
            })?;

        Ok(Self {
            flush_tx: Some(flush_tx),
            compact_tx: Some(compact_tx),
            flush_handle: Some(flush_handle),
            compact_handle: Some(compact_handle),
        })
    }

    pub fn submit_flush(&self, task: FlushTask) -> Result<()> {
        let tx = self
            .flush_tx
            .as_ref()
            .ok_or_else(|| TierError::Background("flush worker stopped".to_string()))?;
        tx.send(task)
            .map_err(|_| TierError::Background("flush worker exited".to_string()))
    }

    pub fn submit_compaction(&self, task: CompactTask) -> Result<()> {
        let tx = self
            .compact_tx
            .as_ref()
            .ok_or_else(|| TierError::Background("compaction worker stopped".to_string()))?;
        tx.send(task)
            .map_err(|_| TierError::Background("compaction worker exited".to_string()))
    }

    /// Close both queues and wait for the workers to drain them.
    ///
    /// The flush worker holds a compaction sender, so it must finish first.
    pub fn shutdown(&mut self) -> Result<()> {
        let mut panicked = Vec::new();

        self.flush_tx.take();
        if let Some(handle) = self.flush_handle.take() {
            if handle.join().is_err() {
                panicked.push("flush");
            }
        }
        self.compact_tx.take();
        if let Some(handle) = self.compact_handle.take() {
            if handle.join().is_err() {
                panicked.push("compaction");
            }
        }

        if panicked.is_empty() {
            Ok(())
        } else {
            Err(TierError::Background(format!(
                "{} worker panicked",
                panicked.join(" and ")
            )))
        }
    }
}

impl Drop for Background {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(error = %e, "background shutdown failed");
        }
    }
}

fn flush_loop(inner: Arc<EngineInner>, rx: Receiver<FlushTask>, compact_tx: Sender<CompactTask>) {
    tracing::debug!("flush worker started");
    for task in rx.iter() {
        let result = inner.flush_memtable(&task.memtable);

        if result.is_ok() && inner.wants_auto_compaction() {
            match compact_tx.try_send(CompactTask { reply: None }) {
                Ok(()) => tracing::debug!("scheduled automatic compaction"),
                Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => {
                    tracing::warn!("compaction worker gone, skipping automatic compaction")
                }
            }
        }

        if let Some(reply) = task.reply {
            // The requester may have given up waiting.
            let _ = reply.send(result);
        }
    }
    tracing::debug!("flush worker stopped");
}

fn compaction_loop(inner: Arc<EngineInner>, rx: Receiver<CompactTask>) {
    tracing::debug!("compaction worker started");
    for task in rx.iter() {
        let result = inner.compact_tables();
        if let Err(e) = &result {
            tracing::error!(error = %e, "compaction failed");
        }
        if let Some(reply) = task.reply {
            let _ = reply.send(result);
        }
    }
    tracing::debug!("compaction worker stopped");
}
