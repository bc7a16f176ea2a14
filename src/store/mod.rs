//! The single write path for grade records.
//!
//! Callers never branch on connectivity themselves: `write` either reaches
//! the remote store directly or falls back to the durable local queue, and a
//! reconciliation task replays queued writes when the connectivity monitor
//! signals that the link is back. Offline is a handled case, not an error.

pub mod mock;
pub mod queue;
pub mod remote;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::model::{EntryKey, GradeEntry};

pub use queue::{PendingQueue, PendingWrite};
pub use remote::{ConnectivityMonitor, CurveStore, RemoteGradeStore};

/// Failures from the persistence layer. Transport failures are retryable and
/// absorbed into the queue; only local queue I/O and retry exhaustion ever
/// reach a caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote transport failure: {0}")]
    Transport(String),

    #[error("local queue failure: {0}")]
    Queue(#[from] rusqlite::Error),

    #[error("local queue failure: {0}")]
    QueueIo(String),

    #[error("retries exhausted for {key} after {attempts} attempts")]
    RetriesExhausted { key: EntryKey, attempts: i64 },
}

// anyhow::Error does not implement std::error::Error, so no #[from] here.
impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        StoreError::QueueIo(e.to_string())
    }
}

/// How a `write` call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The remote store acknowledged the write directly.
    Committed,
    /// The write is durably queued and will be reconciled later. From the
    /// caller's point of view this is a success.
    Queued,
}

/// Bounded-retry policy for the reconciliation drain.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { max_attempts: 5 }
    }
}

/// Counts surfaced to the caller's sync-status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    pub is_connected: bool,
    pub pending: i64,
    pub failed: i64,
}

pub struct ReconciledGradeStore {
    remote: Arc<dyn RemoteGradeStore>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    queue: Mutex<PendingQueue>,
    /// Single-consumer guard: at most one drain runs at a time, so writes for
    /// one identity tuple are replayed strictly in enqueue order.
    drain: Mutex<()>,
    policy: RetryPolicy,
}

impl ReconciledGradeStore {
    pub fn new(
        remote: Arc<dyn RemoteGradeStore>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        queue: PendingQueue,
        policy: RetryPolicy,
    ) -> Self {
        ReconciledGradeStore {
            remote,
            connectivity,
            queue: Mutex::new(queue),
            drain: Mutex::new(()),
            policy,
        }
    }

    /// Writes one grade record. Connected: attempt the remote upsert and fall
    /// back to the queue on transport failure. Disconnected: enqueue without
    /// trying. Either way the caller sees success; only a local queue failure
    /// is an error.
    pub async fn write(&self, entry: &GradeEntry) -> Result<WriteOutcome, StoreError> {
        if self.connectivity.is_connected() {
            match self.remote.upsert(entry).await {
                Ok(()) => {
                    debug!(key = %entry.identity(), "remote write committed");
                    return Ok(WriteOutcome::Committed);
                }
                Err(StoreError::Transport(reason)) => {
                    warn!(key = %entry.identity(), %reason, "remote write failed, queueing");
                }
                Err(other) => return Err(other),
            }
        }
        let seq = self.queue.lock().await.enqueue(entry)?;
        debug!(key = %entry.identity(), seq, "write queued for reconciliation");
        Ok(WriteOutcome::Queued)
    }

    /// Drains the pending queue against the remote store, FIFO by sequence
    /// number. Stops early when connectivity drops mid-drain; unacknowledged
    /// rows stay queued for the next connectivity event. If any write
    /// exhausted its retry budget during this pass, the drain still finishes
    /// and the exhaustion is returned as the error.
    pub async fn reconcile(&self) -> Result<SyncStatus, StoreError> {
        let _guard = self.drain.lock().await;

        let pending = self.queue.lock().await.pending()?;
        if !pending.is_empty() {
            info!(count = pending.len(), "reconciling queued writes");
        }

        let mut exhausted: Option<StoreError> = None;
        // Tuples that already failed this pass: later writes for them stay
        // queued so a retried earlier edit is never overtaken.
        let mut held_back: HashSet<EntryKey> = HashSet::new();
        for write in pending {
            if !self.connectivity.is_connected() {
                debug!(seq = write.seq, "connectivity lost mid-drain, stopping");
                break;
            }
            if held_back.contains(&write.entry.identity()) {
                continue;
            }
            match self.remote.upsert(&write.entry).await {
                Ok(()) => {
                    let queue = self.queue.lock().await;
                    queue.mark_synced(write.seq)?;
                    queue.purge_synced()?;
                }
                Err(StoreError::Transport(reason)) => {
                    held_back.insert(write.entry.identity());
                    let attempts = self.queue.lock().await.bump_attempts(write.seq)?;
                    if attempts >= self.policy.max_attempts {
                        self.queue.lock().await.mark_failed(write.seq)?;
                        error!(
                            key = %write.entry.identity(),
                            attempts,
                            %reason,
                            "retries exhausted, write parked for manual reconciliation"
                        );
                        exhausted.get_or_insert(StoreError::RetriesExhausted {
                            key: write.entry.identity(),
                            attempts,
                        });
                    } else {
                        warn!(
                            key = %write.entry.identity(),
                            attempts,
                            %reason,
                            "reconcile attempt failed, will retry"
                        );
                    }
                }
                Err(other) => return Err(other),
            }
        }

        match exhausted {
            Some(e) => Err(e),
            None => self.sync_status().await,
        }
    }

    /// Writes that exhausted their retry budget, kept for manual
    /// reconciliation.
    pub async fn failed_writes(&self) -> Result<Vec<PendingWrite>, StoreError> {
        Ok(self.queue.lock().await.failed()?)
    }

    /// Reads one record, merging committed remote state with any still-queued
    /// local write for the same identity tuple. The newest `dateRecorded`
    /// wins, so a just-entered grade is visible before sync completes. A
    /// reader is never blocked on reconciliation.
    pub async fn get(&self, key: &EntryKey) -> Result<Option<GradeEntry>, StoreError> {
        let remote = if self.connectivity.is_connected() {
            self.remote.get(key).await.unwrap_or_default()
        } else {
            None
        };
        let local = self
            .queue
            .lock()
            .await
            .pending_for_key(key)?
            .into_iter()
            .map(|w| w.entry)
            .max_by_key(|e| e.date_recorded);
        Ok(match (remote, local) {
            (Some(r), Some(l)) => Some(if l.date_recorded > r.date_recorded { l } else { r }),
            (r, l) => l.or(r),
        })
    }

    /// Reads a subject's records with the same merge semantics as `get`.
    pub async fn list_by_subject(&self, subject_id: &str) -> Result<Vec<GradeEntry>, StoreError> {
        let remote = if self.connectivity.is_connected() {
            self.remote
                .list_by_subject(subject_id)
                .await
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let mut merged: HashMap<EntryKey, GradeEntry> =
            remote.into_iter().map(|e| (e.identity(), e)).collect();
        for write in self.queue.lock().await.pending_for_subject(subject_id)? {
            let entry = write.entry;
            match merged.get(&entry.identity()) {
                Some(existing) if existing.date_recorded > entry.date_recorded => {}
                _ => {
                    merged.insert(entry.identity(), entry);
                }
            }
        }
        let mut out: Vec<GradeEntry> = merged.into_values().collect();
        out.sort_by(|a, b| {
            (a.student_id.as_str(), a.grade_period).cmp(&(b.student_id.as_str(), b.grade_period))
        });
        Ok(out)
    }

    pub async fn sync_status(&self) -> Result<SyncStatus, StoreError> {
        let queue = self.queue.lock().await;
        Ok(SyncStatus {
            is_connected: self.connectivity.is_connected(),
            pending: queue.pending_count()?,
            failed: queue.failed_count()?,
        })
    }

    /// Spawns the reconciliation task. Every offline-to-online transition of
    /// the connectivity monitor triggers one drain.
    pub fn spawn_reconciler(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let mut rx = store.connectivity.subscribe();
        tokio::spawn(async move {
            let mut was_connected = *rx.borrow();
            loop {
                if rx.changed().await.is_err() {
                    break;
                }
                let connected = *rx.borrow();
                if connected && !was_connected {
                    if let Err(e) = store.reconcile().await {
                        error!(error = %e, "reconciliation pass failed");
                    }
                }
                was_connected = connected;
            }
        })
    }
}
