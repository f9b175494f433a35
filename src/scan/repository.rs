//! Persistence of the singular scan job and the last-run summary.

use super::job::{ScanJob, ScanSummary};
use crate::state_store::StateStore;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

pub const JOB_STATE_KEY: &str = "scan_job";
pub const SUMMARY_STATE_KEY: &str = "scan_last_summary";

/// Scheduled event running one deferred batch.
pub const PROCESS_HOOK: &str = "scan_process";
/// Recurring scheduled event starting a timer scan.
pub const TIMER_HOOK: &str = "scan_timer";

#[derive(Clone)]
pub struct JobRepository {
    state_store: Arc<dyn StateStore>,
}

impl JobRepository {
    pub fn new(state_store: Arc<dyn StateStore>) -> Self {
        Self { state_store }
    }

    pub fn load(&self) -> Result<Option<ScanJob>> {
        self.load_json(JOB_STATE_KEY)
    }

    pub fn save(&self, job: &ScanJob) -> Result<()> {
        self.save_json(JOB_STATE_KEY, job)
            .with_context(|| format!("Failed to persist scan job {}", job.id))
    }

    /// Deletes the job and cancels any pending deferred batch.
    pub fn clear(&self) -> Result<()> {
        self.state_store.delete_state(JOB_STATE_KEY)?;
        self.state_store.clear_scheduled_event(PROCESS_HOOK)?;
        Ok(())
    }

    pub fn load_summary(&self) -> Result<Option<ScanSummary>> {
        self.load_json(SUMMARY_STATE_KEY)
    }

    pub fn save_summary(&self, summary: &ScanSummary) -> Result<()> {
        self.save_json(SUMMARY_STATE_KEY, summary)
            .context("Failed to persist scan summary")
    }

    fn load_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.state_store.get_state(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Ignoring undecodable value stored under '{}': {}", key, e);
                Ok(None)
            }
        }
    }

    fn save_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.state_store.set_state(key, &raw)
    }
}
