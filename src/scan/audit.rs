//! Audit logging for scan jobs.
//!
//! Builds on the state store's raw audit log with entries populated from the
//! job being processed.

use super::job::ScanJob;
use crate::state_store::{ScanAuditEventType, StateStore};
use anyhow::Result;
use std::sync::Arc;

#[derive(Clone)]
pub struct ScanAuditLogger {
    state_store: Arc<dyn StateStore>,
}

impl ScanAuditLogger {
    pub fn new(state_store: Arc<dyn StateStore>) -> Self {
        Self { state_store }
    }

    pub fn log_started(&self, job: &ScanJob) -> Result<()> {
        let details = serde_json::json!({
            "origin": job.origin.as_str(),
            "initiated_by": job.initiated_by,
            "record_types": job.record_types,
            "batch_size": job.batch_size,
            "total": job.total,
        });
        self.state_store.log_scan_audit(
            &job.id,
            ScanAuditEventType::Started,
            None,
            Some(&details),
            None,
        )?;
        Ok(())
    }

    /// Logs one processed batch.
    pub fn log_progress(&self, job: &ScanJob, batch_processed: usize) -> Result<()> {
        let details = serde_json::json!({
            "batch_processed": batch_processed,
            "processed": job.processed,
            "total": job.total,
        });
        self.state_store.log_scan_audit(
            &job.id,
            ScanAuditEventType::Progress,
            None,
            Some(&details),
            None,
        )?;
        Ok(())
    }

    pub fn log_completed(&self, job: &ScanJob) -> Result<()> {
        let details = serde_json::json!({
            "processed": job.processed,
            "total": job.total,
            "last_error": job.last_error,
        });
        self.state_store.log_scan_audit(
            &job.id,
            ScanAuditEventType::Completed,
            job_duration_ms(job),
            Some(&details),
            None,
        )?;
        Ok(())
    }

    /// `job_id` is `None` when the failure happened before a job could be loaded.
    pub fn log_failed(&self, job_id: Option<&str>, context: &str, error: &str) -> Result<()> {
        let details = serde_json::json!({ "context": context });
        self.state_store.log_scan_audit(
            job_id.unwrap_or("-"),
            ScanAuditEventType::Failed,
            None,
            Some(&details),
            Some(error),
        )?;
        Ok(())
    }
}

fn job_duration_ms(job: &ScanJob) -> Option<i64> {
    match (job.started_at, job.finished_at) {
        (Some(start), Some(end)) => Some((end - start).max(0) * 1000),
        _ => None,
    }
}
