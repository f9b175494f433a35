use serde::{Deserialize, Serialize};

/// A deferred callback registered under a fixed hook name.
///
/// Single events are removed when claimed; recurring events (with
/// `interval_secs`) are pushed forward past the claim time instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub hook: String,
    /// Unix timestamp (seconds) at which the event becomes due.
    pub run_at: i64,
    pub interval_secs: Option<i64>,
}

impl ScheduledEvent {
    pub fn is_recurring(&self) -> bool {
        self.interval_secs.is_some()
    }
}

/// Event types for scan audit log entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanAuditEventType {
    Started,
    Progress,
    Completed,
    Failed,
}

impl ScanAuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanAuditEventType::Started => "started",
            ScanAuditEventType::Progress => "progress",
            ScanAuditEventType::Completed => "completed",
            ScanAuditEventType::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "started" => Some(ScanAuditEventType::Started),
            "progress" => Some(ScanAuditEventType::Progress),
            "completed" => Some(ScanAuditEventType::Completed),
            "failed" => Some(ScanAuditEventType::Failed),
            _ => None,
        }
    }
}

/// An entry in the scan audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanAuditEntry {
    pub id: i64,
    pub job_id: String,
    pub event_type: ScanAuditEventType,
    /// Unix timestamp when the event occurred
    pub timestamp: i64,
    pub duration_ms: Option<i64>,
    pub details: Option<serde_json::Value>,
    pub error: Option<String>,
}
