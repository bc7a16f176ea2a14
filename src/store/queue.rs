//! Durable local queue of grade writes awaiting the remote store.
//!
//! Append-only enqueue, single-consumer drain. A row is marked synced only
//! after the remote store acknowledges the write and is purged afterwards; a
//! crash at any point before the acknowledgment leaves the row in place for
//! retry (at-least-once delivery, deduplicated remotely by identity tuple).

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use crate::model::{EntryKey, GradeEntry};

/// One queued write: the grade payload plus its local sequence number and
/// delivery bookkeeping.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub seq: i64,
    pub attempts: i64,
    pub entry: GradeEntry,
}

pub struct PendingQueue {
    conn: Connection,
}

impl PendingQueue {
    pub fn open(workspace: &Path) -> anyhow::Result<PendingQueue> {
        std::fs::create_dir_all(workspace)?;
        let db_path = workspace.join("acadtrack-queue.sqlite3");
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    /// In-memory variant for tests that do not need durability.
    pub fn open_in_memory() -> anyhow::Result<PendingQueue> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<PendingQueue> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS pending_writes(
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                grade_period TEXT NOT NULL,
                payload TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                synced INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_pending_identity
             ON pending_writes(student_id, subject_id, grade_period)",
            [],
        )?;
        Ok(PendingQueue { conn })
    }

    /// Appends one write. Returns the assigned monotonic sequence number.
    pub fn enqueue(&self, entry: &GradeEntry) -> rusqlite::Result<i64> {
        let payload = serde_json::to_string(entry).map_err(|e| {
            rusqlite::Error::ToSqlConversionFailure(Box::new(e))
        })?;
        self.conn.execute(
            "INSERT INTO pending_writes(student_id, subject_id, grade_period, payload)
             VALUES (?1, ?2, ?3, ?4)",
            (
                &entry.student_id,
                &entry.subject_id,
                entry.grade_period.as_str(),
                &payload,
            ),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All undelivered writes in enqueue order. Failed rows are excluded; they
    /// stay in the table for manual reconciliation.
    pub fn pending(&self) -> anyhow::Result<Vec<PendingWrite>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, attempts, payload
             FROM pending_writes
             WHERE synced = 0 AND failed = 0
             ORDER BY seq",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, String>(2)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (seq, attempts, payload) = row?;
            let entry: GradeEntry = serde_json::from_str(&payload)?;
            out.push(PendingWrite { seq, attempts, entry });
        }
        Ok(out)
    }

    /// Rows parked after retry exhaustion, in enqueue order.
    pub fn failed(&self) -> anyhow::Result<Vec<PendingWrite>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, attempts, payload
             FROM pending_writes
             WHERE failed = 1
             ORDER BY seq",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, String>(2)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (seq, attempts, payload) = row?;
            let entry: GradeEntry = serde_json::from_str(&payload)?;
            out.push(PendingWrite { seq, attempts, entry });
        }
        Ok(out)
    }

    /// Undelivered writes for one identity tuple, used by the merge read path.
    pub fn pending_for_key(&self, key: &EntryKey) -> anyhow::Result<Vec<PendingWrite>> {
        Ok(self
            .pending()?
            .into_iter()
            .filter(|w| w.entry.identity() == *key)
            .collect())
    }

    /// Undelivered writes for one subject, used by the merge read path.
    pub fn pending_for_subject(&self, subject_id: &str) -> anyhow::Result<Vec<PendingWrite>> {
        Ok(self
            .pending()?
            .into_iter()
            .filter(|w| w.entry.subject_id == subject_id)
            .collect())
    }

    /// Flags a row as delivered. Called only after the remote acknowledgment.
    pub fn mark_synced(&self, seq: i64) -> rusqlite::Result<()> {
        self.conn.execute(
            "UPDATE pending_writes SET synced = 1 WHERE seq = ?1",
            [seq],
        )?;
        Ok(())
    }

    /// Removes delivered rows. Safe to run at any time; a crash between
    /// `mark_synced` and the purge only delays cleanup.
    pub fn purge_synced(&self) -> rusqlite::Result<usize> {
        self.conn
            .execute("DELETE FROM pending_writes WHERE synced = 1", [])
    }

    /// Increments the delivery attempt counter, returning the new value.
    pub fn bump_attempts(&self, seq: i64) -> rusqlite::Result<i64> {
        self.conn.execute(
            "UPDATE pending_writes SET attempts = attempts + 1 WHERE seq = ?1",
            [seq],
        )?;
        let attempts: Option<i64> = self
            .conn
            .query_row(
                "SELECT attempts FROM pending_writes WHERE seq = ?1",
                [seq],
                |r| r.get(0),
            )
            .optional()?;
        Ok(attempts.unwrap_or(0))
    }

    /// Parks a row after retry exhaustion. It no longer participates in the
    /// drain but remains readable for manual reconciliation.
    pub fn mark_failed(&self, seq: i64) -> rusqlite::Result<()> {
        self.conn.execute(
            "UPDATE pending_writes SET failed = 1 WHERE seq = ?1",
            [seq],
        )?;
        Ok(())
    }

    pub fn pending_count(&self) -> rusqlite::Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM pending_writes WHERE synced = 0 AND failed = 0",
            [],
            |r| r.get(0),
        )
    }

    pub fn failed_count(&self) -> rusqlite::Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM pending_writes WHERE failed = 1",
            [],
            |r| r.get(0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::entry;
    use crate::model::GradePeriod;

    #[test]
    fn enqueue_assigns_monotonic_sequence() {
        let queue = PendingQueue::open_in_memory().unwrap();
        let a = queue.enqueue(&entry("S1", "SUB1", GradePeriod::Prelim, 40.0, 50.0)).unwrap();
        let b = queue.enqueue(&entry("S2", "SUB1", GradePeriod::Prelim, 42.0, 50.0)).unwrap();
        assert!(b > a);
        let pending = queue.pending().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].seq, a);
        assert_eq!(pending[1].seq, b);
        assert_eq!(pending[0].entry.student_id, "S1");
    }

    #[test]
    fn synced_rows_leave_the_drain_and_get_purged() {
        let queue = PendingQueue::open_in_memory().unwrap();
        let seq = queue.enqueue(&entry("S1", "SUB1", GradePeriod::Final, 40.0, 50.0)).unwrap();
        queue.mark_synced(seq).unwrap();
        assert!(queue.pending().unwrap().is_empty());
        assert_eq!(queue.purge_synced().unwrap(), 1);
    }

    #[test]
    fn failed_rows_are_parked_not_dropped() {
        let queue = PendingQueue::open_in_memory().unwrap();
        let seq = queue.enqueue(&entry("S1", "SUB1", GradePeriod::Final, 40.0, 50.0)).unwrap();
        assert_eq!(queue.bump_attempts(seq).unwrap(), 1);
        assert_eq!(queue.bump_attempts(seq).unwrap(), 2);
        queue.mark_failed(seq).unwrap();
        assert!(queue.pending().unwrap().is_empty());
        assert_eq!(queue.failed_count().unwrap(), 1);
        assert_eq!(queue.pending_count().unwrap(), 0);
    }

    #[test]
    fn queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let queue = PendingQueue::open(dir.path()).unwrap();
            queue.enqueue(&entry("S1", "SUB1", GradePeriod::Prelim, 40.0, 50.0)).unwrap();
        }
        let queue = PendingQueue::open(dir.path()).unwrap();
        let pending = queue.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entry.student_id, "S1");
    }

    #[test]
    fn pending_for_key_filters_by_identity() {
        let queue = PendingQueue::open_in_memory().unwrap();
        queue.enqueue(&entry("S1", "SUB1", GradePeriod::Prelim, 40.0, 50.0)).unwrap();
        queue.enqueue(&entry("S1", "SUB1", GradePeriod::Midterm, 41.0, 50.0)).unwrap();
        let key = EntryKey {
            student_id: "S1".to_string(),
            subject_id: "SUB1".to_string(),
            grade_period: GradePeriod::Prelim,
        };
        let matched = queue.pending_for_key(&key).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].entry.grade_period, GradePeriod::Prelim);
    }
}
