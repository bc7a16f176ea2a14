//! In-memory collaborators for tests and demos: a remote store with
//! last-writer-wins upsert semantics, a curve history store, and a
//! connectivity switch driven by hand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::model::{CurveApplication, EntryKey, GradeCurve, GradeEntry};
use crate::store::remote::{ConnectivityMonitor, CurveStore, RemoteGradeStore};
use crate::store::StoreError;

/// In-memory remote grade collection. Upsert is keyed by identity tuple with
/// last-writer-wins by `dateRecorded`, matching the real store's contract.
/// Transport failures can be injected for a set number of upcoming calls.
#[derive(Default)]
pub struct MockRemoteStore {
    records: Mutex<HashMap<EntryKey, GradeEntry>>,
    fail_next: AtomicU32,
    upsert_count: AtomicU32,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` calls fail with a transport error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn upsert_count(&self) -> u32 {
        self.upsert_count.load(Ordering::SeqCst)
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn snapshot(&self, key: &EntryKey) -> Option<GradeEntry> {
        self.records.lock().unwrap().get(key).cloned()
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RemoteGradeStore for MockRemoteStore {
    async fn upsert(&self, entry: &GradeEntry) -> Result<(), StoreError> {
        self.upsert_count.fetch_add(1, Ordering::SeqCst);
        if self.take_failure() {
            return Err(StoreError::Transport("injected failure".to_string()));
        }
        let mut records = self.records.lock().unwrap();
        match records.get(&entry.identity()) {
            Some(existing) if existing.date_recorded > entry.date_recorded => {}
            _ => {
                records.insert(entry.identity(), entry.clone());
            }
        }
        Ok(())
    }

    async fn get(&self, key: &EntryKey) -> Result<Option<GradeEntry>, StoreError> {
        if self.take_failure() {
            return Err(StoreError::Transport("injected failure".to_string()));
        }
        Ok(self.records.lock().unwrap().get(key).cloned())
    }

    async fn list_by_subject(&self, subject_id: &str) -> Result<Vec<GradeEntry>, StoreError> {
        if self.take_failure() {
            return Err(StoreError::Transport("injected failure".to_string()));
        }
        let mut out: Vec<GradeEntry> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.subject_id == subject_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            (a.student_id.as_str(), a.grade_period).cmp(&(b.student_id.as_str(), b.grade_period))
        });
        Ok(out)
    }
}

/// In-memory curve history.
#[derive(Default)]
pub struct MockCurveStore {
    curves: Mutex<Vec<GradeCurve>>,
    applications: Mutex<HashMap<String, Vec<CurveApplication>>>,
}

impl MockCurveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applications_for(&self, curve_id: &str) -> Vec<CurveApplication> {
        self.applications
            .lock()
            .unwrap()
            .get(curve_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CurveStore for MockCurveStore {
    async fn save_curve(&self, curve: &GradeCurve) -> Result<(), StoreError> {
        self.curves.lock().unwrap().push(curve.clone());
        Ok(())
    }

    async fn append_applications(
        &self,
        curve_id: &str,
        applications: &[CurveApplication],
    ) -> Result<(), StoreError> {
        self.applications
            .lock()
            .unwrap()
            .entry(curve_id.to_string())
            .or_default()
            .extend(applications.iter().cloned());
        Ok(())
    }

    async fn curves_by_subject(&self, subject_id: &str) -> Result<Vec<GradeCurve>, StoreError> {
        Ok(self
            .curves
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.subject_id == subject_id)
            .cloned()
            .collect())
    }
}

/// Hand-driven connectivity switch backed by a watch channel.
pub struct MockConnectivity {
    tx: watch::Sender<bool>,
}

impl MockConnectivity {
    pub fn new(connected: bool) -> Self {
        let (tx, _) = watch::channel(connected);
        MockConnectivity { tx }
    }

    pub fn set_connected(&self, connected: bool) {
        // send_replace updates the value even with no live receivers.
        self.tx.send_replace(connected);
    }
}

impl ConnectivityMonitor for MockConnectivity {
    fn is_connected(&self) -> bool {
        *self.tx.subscribe().borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
