use serde::{Deserialize, Deserializer, Serialize};
use std::collections::VecDeque;

pub const MIN_BATCH_SIZE: usize = 10;
pub const MAX_BATCH_SIZE: usize = 200;
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Lifecycle of a persisted scan job. "Idle" is the absence of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Queued,
    Running,
    Completed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Queued => "queued",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
        }
    }
}

/// Which trigger created a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOrigin {
    Interactive,
    Cli,
    Timer,
}

impl ScanOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanOrigin::Interactive => "interactive",
            ScanOrigin::Cli => "cli",
            ScanOrigin::Timer => "timer",
        }
    }
}

impl std::fmt::Display for ScanOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamps a requested batch size into `[MIN_BATCH_SIZE, MAX_BATCH_SIZE]`.
pub fn clamp_batch_size(requested: i64) -> usize {
    requested.clamp(MIN_BATCH_SIZE as i64, MAX_BATCH_SIZE as i64) as usize
}

/// Splits a comma separated list, dropping empty items.
pub fn split_comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parameters for starting a scan, as received from any trigger.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanRequest {
    /// Requested record types. Accepts a JSON list or a comma separated string.
    #[serde(default, deserialize_with = "deserialize_record_types")]
    pub record_types: Vec<String>,
    #[serde(default)]
    pub batch_size: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordTypesInput {
    List(Vec<String>),
    Csv(String),
}

fn deserialize_record_types<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RecordTypesInput>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(RecordTypesInput::List(types)) => types,
        Some(RecordTypesInput::Csv(raw)) => split_comma_list(&raw),
    })
}

/// The single mutable scan record. Replaced as a whole on every persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: String,
    pub status: ScanStatus,
    pub record_types: Vec<String>,
    pub batch_size: usize,
    pub total: usize,
    pub processed: usize,
    /// Remaining record ids, ascending, consumed from the front.
    pub queue: VecDeque<i64>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub origin: ScanOrigin,
    pub initiated_by: Option<String>,
    #[serde(default)]
    pub last_error: String,
}

impl ScanJob {
    pub fn new(
        record_types: Vec<String>,
        batch_size: i64,
        record_ids: Vec<i64>,
        origin: ScanOrigin,
        initiated_by: Option<String>,
        now: i64,
    ) -> Self {
        Self {
            id: format!("scan_{}", uuid::Uuid::new_v4().simple()),
            status: ScanStatus::Queued,
            record_types,
            batch_size: clamp_batch_size(batch_size),
            total: record_ids.len(),
            processed: 0,
            queue: record_ids.into(),
            created_at: now,
            started_at: None,
            finished_at: None,
            origin,
            initiated_by,
            last_error: String::new(),
        }
    }

    /// Queued or running with work left. A job whose queue drained without
    /// being finalized does not count.
    pub fn is_active(&self) -> bool {
        !self.queue.is_empty() && matches!(self.status, ScanStatus::Queued | ScanStatus::Running)
    }

    /// Moves the job to `running`, stamping `started_at` the first time.
    pub fn mark_running(&mut self, now: i64) {
        self.status = ScanStatus::Running;
        self.started_at.get_or_insert(now);
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed)
    }

    pub fn percent(&self) -> u32 {
        percent(self.processed, self.total)
    }

    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            total: self.total,
            processed: self.processed,
            record_types: self.record_types.clone(),
            finished_at: self.finished_at,
            origin: self.origin,
        }
    }
}

/// Floor of `processed / total` as a percentage, 0 for an empty scan.
pub fn percent(processed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((processed.min(total) as u64 * 100) / total as u64) as u32
}

/// Snapshot of the most recently completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total: usize,
    pub processed: usize,
    pub record_types: Vec<String>,
    pub finished_at: Option<i64>,
    pub origin: ScanOrigin,
}
