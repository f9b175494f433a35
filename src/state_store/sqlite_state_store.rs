use super::models::{ScanAuditEntry, ScanAuditEventType, ScheduledEvent};
use super::schema::STATE_VERSIONED_SCHEMAS;
use super::StateStore;
use crate::sqlite_persistence::open_versioned;
use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path.as_ref(), STATE_VERSIONED_SCHEMAS, "state")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave the connection itself in
        // a broken state, so keep going with the inner value.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<ScheduledEvent> {
        Ok(ScheduledEvent {
            hook: row.get("hook")?,
            run_at: row.get("run_at")?,
            interval_secs: row.get("interval_secs")?,
        })
    }

    fn row_to_audit_entry(row: &rusqlite::Row) -> rusqlite::Result<ScanAuditEntry> {
        let event_type_str: String = row.get("event_type")?;
        let event_type =
            ScanAuditEventType::parse(&event_type_str).unwrap_or(ScanAuditEventType::Progress);

        let details_str: Option<String> = row.get("details")?;
        let details = details_str.and_then(|s| serde_json::from_str(&s).ok());

        Ok(ScanAuditEntry {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            event_type,
            timestamp: row.get("timestamp")?,
            duration_ms: row.get("duration_ms")?,
            details,
            error: row.get("error")?,
        })
    }

    /// First run strictly after `now` for a recurring event anchored at `run_at`.
    fn next_recurrence(run_at: i64, interval_secs: i64, now: i64) -> i64 {
        let interval = interval_secs.max(1);
        let missed = (now - run_at).max(0) / interval;
        run_at + (missed + 1) * interval
    }
}

impl StateStore for SqliteStateStore {
    fn get_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT value FROM server_state WHERE key = ?1")?;
        let value: Option<String> = stmt.query_row(params![key], |row| row.get(0)).optional()?;
        Ok(value)
    }

    fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO server_state (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn delete_state(&self, key: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM server_state WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn schedule_event(
        &self,
        hook: &str,
        run_at: i64,
        interval_secs: Option<i64>,
    ) -> Result<bool> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO scheduled_events (hook, run_at, interval_secs)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(hook) DO NOTHING",
            params![hook, run_at, interval_secs],
        )?;
        Ok(inserted == 1)
    }

    fn get_scheduled_event(&self, hook: &str) -> Result<Option<ScheduledEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT hook, run_at, interval_secs FROM scheduled_events WHERE hook = ?1",
        )?;
        let event = stmt.query_row(params![hook], Self::row_to_event).optional()?;
        Ok(event)
    }

    fn clear_scheduled_event(&self, hook: &str) -> Result<bool> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM scheduled_events WHERE hook = ?1",
            params![hook],
        )?;
        Ok(deleted > 0)
    }

    fn claim_due_events(&self, now: i64) -> Result<Vec<ScheduledEvent>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let due = {
            let mut stmt = tx.prepare(
                "SELECT hook, run_at, interval_secs FROM scheduled_events
                 WHERE run_at <= ?1 ORDER BY run_at ASC, hook ASC",
            )?;
            let rows = stmt
                .query_map(params![now], Self::row_to_event)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        for event in &due {
            match event.interval_secs {
                Some(interval) => {
                    tx.execute(
                        "UPDATE scheduled_events SET run_at = ?1 WHERE hook = ?2",
                        params![
                            Self::next_recurrence(event.run_at, interval, now),
                            event.hook
                        ],
                    )?;
                }
                None => {
                    tx.execute(
                        "DELETE FROM scheduled_events WHERE hook = ?1",
                        params![event.hook],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(due)
    }

    fn next_event_time(&self) -> Result<Option<i64>> {
        let conn = self.conn();
        let next: Option<i64> =
            conn.query_row("SELECT MIN(run_at) FROM scheduled_events", [], |row| {
                row.get(0)
            })?;
        Ok(next)
    }

    fn set_ephemeral(&self, key: &str, value: &str, ttl_secs: i64) -> Result<()> {
        let conn = self.conn();
        let expires_at = Self::now() + ttl_secs;
        conn.execute(
            "INSERT INTO ephemeral_entries (key, value, expires_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, expires_at = ?3",
            params![key, value, expires_at],
        )?;
        Ok(())
    }

    fn take_ephemeral(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let value: Option<String> = tx
            .query_row(
                "SELECT value FROM ephemeral_entries WHERE key = ?1 AND expires_at > ?2",
                params![key, Self::now()],
                |row| row.get(0),
            )
            .optional()?;
        tx.execute(
            "DELETE FROM ephemeral_entries WHERE key = ?1",
            params![key],
        )?;
        tx.commit()?;
        Ok(value)
    }

    fn purge_expired_ephemeral(&self) -> Result<usize> {
        let conn = self.conn();
        let count = conn.execute(
            "DELETE FROM ephemeral_entries WHERE expires_at <= ?1",
            params![Self::now()],
        )?;
        Ok(count)
    }

    fn log_scan_audit(
        &self,
        job_id: &str,
        event_type: ScanAuditEventType,
        duration_ms: Option<i64>,
        details: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn();
        let details_str = details.map(|d| d.to_string());

        conn.execute(
            "INSERT INTO scan_audit_log (job_id, event_type, timestamp, duration_ms, details, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                job_id,
                event_type.as_str(),
                Self::now(),
                duration_ms,
                details_str,
                error
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_scan_audit_log(&self, limit: usize, offset: usize) -> Result<Vec<ScanAuditEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, job_id, event_type, timestamp, duration_ms, details, error
             FROM scan_audit_log ORDER BY id DESC LIMIT ?1 OFFSET ?2",
        )?;
        let entries = stmt
            .query_map(
                params![limit as i64, offset as i64],
                Self::row_to_audit_entry,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn get_scan_audit_log_by_job(
        &self,
        job_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ScanAuditEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, job_id, event_type, timestamp, duration_ms, details, error
             FROM scan_audit_log WHERE job_id = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let entries = stmt
            .query_map(
                params![job_id, limit as i64, offset as i64],
                Self::row_to_audit_entry,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn cleanup_old_scan_audit_entries(&self, before_timestamp: i64) -> Result<usize> {
        let conn = self.conn();
        let count = conn.execute(
            "DELETE FROM scan_audit_log WHERE timestamp < ?1",
            params![before_timestamp],
        )?;
        Ok(count)
    }
}
