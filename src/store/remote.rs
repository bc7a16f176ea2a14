//! Seams to the remote document store and the connectivity collaborator.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::model::{CurveApplication, EntryKey, GradeCurve, GradeEntry};
use crate::store::StoreError;

/// The remote grade collection. `upsert` is keyed by the identity tuple with
/// last-writer-wins by `dateRecorded`, which makes retries after an ambiguous
/// partial success safe.
#[async_trait]
pub trait RemoteGradeStore: Send + Sync {
    async fn upsert(&self, entry: &GradeEntry) -> Result<(), StoreError>;

    async fn get(&self, key: &EntryKey) -> Result<Option<GradeEntry>, StoreError>;

    async fn list_by_subject(&self, subject_id: &str) -> Result<Vec<GradeEntry>, StoreError>;
}

/// Curve history collections: applied curve configurations and their
/// per-student application records.
#[async_trait]
pub trait CurveStore: Send + Sync {
    async fn save_curve(&self, curve: &GradeCurve) -> Result<(), StoreError>;

    async fn append_applications(
        &self,
        curve_id: &str,
        applications: &[CurveApplication],
    ) -> Result<(), StoreError>;

    async fn curves_by_subject(&self, subject_id: &str) -> Result<Vec<GradeCurve>, StoreError>;
}

/// Connectivity collaborator: a point-in-time query plus an event stream.
/// Reconciliation is triggered by the restored signal, never polled.
pub trait ConnectivityMonitor: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Receiver that observes every connectivity transition. The current
    /// value is the latest known state.
    fn subscribe(&self) -> watch::Receiver<bool>;
}
