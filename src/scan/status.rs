use super::job::{ScanJob, ScanOrigin, ScanStatus, ScanSummary};
use serde::Serialize;

/// What status endpoints and triggers return. Serialized untagged so both
/// shapes carry a plain `status` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ScanStatusReport {
    Idle(IdleStatus),
    Job(JobStatus),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdleStatus {
    pub status: &'static str,
    #[serde(rename = "lastRun")]
    pub last_run: Option<ScanSummary>,
    #[serde(rename = "nextRun")]
    pub next_run: Option<i64>,
    /// Record types a scan started without selectors would use.
    pub record_types: Vec<String>,
}

/// A job projected for clients: everything except the queue, plus derived
/// progress fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub id: String,
    pub status: ScanStatus,
    pub record_types: Vec<String>,
    pub batch_size: usize,
    pub total: usize,
    pub processed: usize,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub origin: ScanOrigin,
    pub initiated_by: Option<String>,
    pub last_error: String,
    pub remaining: usize,
    pub percent: u32,
    #[serde(rename = "lastRun")]
    pub last_run: Option<ScanSummary>,
    #[serde(rename = "nextRun")]
    pub next_run: Option<i64>,
}

impl ScanStatusReport {
    pub fn idle(
        last_run: Option<ScanSummary>,
        next_run: Option<i64>,
        default_record_types: Vec<String>,
    ) -> Self {
        ScanStatusReport::Idle(IdleStatus {
            status: "idle",
            last_run,
            next_run,
            record_types: default_record_types,
        })
    }

    pub fn for_job(job: &ScanJob, last_run: Option<ScanSummary>, next_run: Option<i64>) -> Self {
        ScanStatusReport::Job(JobStatus {
            id: job.id.clone(),
            status: job.status,
            record_types: job.record_types.clone(),
            batch_size: job.batch_size,
            total: job.total,
            processed: job.processed,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            origin: job.origin,
            initiated_by: job.initiated_by.clone(),
            last_error: job.last_error.clone(),
            remaining: job.remaining(),
            percent: job.percent(),
            last_run,
            next_run,
        })
    }

    pub fn status(&self) -> &'static str {
        match self {
            ScanStatusReport::Idle(idle) => idle.status,
            ScanStatusReport::Job(job) => job.status.as_str(),
        }
    }

    pub fn as_job(&self) -> Option<&JobStatus> {
        match self {
            ScanStatusReport::Job(job) => Some(job),
            ScanStatusReport::Idle(_) => None,
        }
    }
}
