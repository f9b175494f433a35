//! Durable state store.
//!
//! Whole-value key/value persistence, scheduled deferred events, ephemeral
//! entries with an expiry, and the scan audit log.

mod models;
mod schema;
mod sqlite_state_store;

pub use models::*;
pub use schema::STATE_VERSIONED_SCHEMAS;
pub use sqlite_state_store::SqliteStateStore;

use anyhow::Result;

pub trait StateStore: Send + Sync {
    // Key-value state storage
    fn get_state(&self, key: &str) -> Result<Option<String>>;
    fn set_state(&self, key: &str, value: &str) -> Result<()>;
    fn delete_state(&self, key: &str) -> Result<()>;

    // Scheduled events
    /// Registers `hook` to fire at `run_at` unless an event for the same hook
    /// is already pending. Returns whether a new event was inserted.
    fn schedule_event(&self, hook: &str, run_at: i64, interval_secs: Option<i64>)
        -> Result<bool>;
    fn get_scheduled_event(&self, hook: &str) -> Result<Option<ScheduledEvent>>;
    /// Removes the pending event for `hook`. Returns whether one existed.
    fn clear_scheduled_event(&self, hook: &str) -> Result<bool>;
    /// Atomically takes every event due at `now`: single events are deleted,
    /// recurring ones are moved to their next run after `now`.
    fn claim_due_events(&self, now: i64) -> Result<Vec<ScheduledEvent>>;
    /// Earliest `run_at` among all pending events.
    fn next_event_time(&self) -> Result<Option<i64>>;

    // Ephemeral entries
    /// Writes `value` under `key`, replacing any previous entry, expiring
    /// `ttl_secs` from now.
    fn set_ephemeral(&self, key: &str, value: &str, ttl_secs: i64) -> Result<()>;
    /// Returns and removes an unexpired entry.
    fn take_ephemeral(&self, key: &str) -> Result<Option<String>>;
    fn purge_expired_ephemeral(&self) -> Result<usize>;

    // Scan audit log
    fn log_scan_audit(
        &self,
        job_id: &str,
        event_type: ScanAuditEventType,
        duration_ms: Option<i64>,
        details: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<i64>;
    fn get_scan_audit_log(&self, limit: usize, offset: usize) -> Result<Vec<ScanAuditEntry>>;
    fn get_scan_audit_log_by_job(
        &self,
        job_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ScanAuditEntry>>;
    fn cleanup_old_scan_audit_entries(&self, before_timestamp: i64) -> Result<usize>;
}
