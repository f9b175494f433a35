//! SQLite schema definitions for the state database.
//!
//! Holds whole-value server state (the scan job and summary), scheduled
//! deferred events, short-lived ephemeral entries and the scan audit log.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

/// Key-value store for whole structured values (JSON text).
const SERVER_STATE_TABLE_V1: Table = Table {
    name: "server_state",
    columns: &[
        sqlite_column!("key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
        sqlite_column!(
            "updated_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some("(datetime('now'))")
        ),
    ],
    indices: &[],
};

/// One row per hook; the primary key is what makes scheduling debounced.
const SCHEDULED_EVENTS_TABLE_V1: Table = Table {
    name: "scheduled_events",
    columns: &[
        sqlite_column!("hook", &SqlType::Text, is_primary_key = true),
        sqlite_column!("run_at", &SqlType::Integer, non_null = true),
        sqlite_column!("interval_secs", &SqlType::Integer),
    ],
    indices: &[("idx_scheduled_events_run_at", "run_at")],
};

const EPHEMERAL_ENTRIES_TABLE_V1: Table = Table {
    name: "ephemeral_entries",
    columns: &[
        sqlite_column!("key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
        sqlite_column!("expires_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_ephemeral_entries_expires_at", "expires_at")],
};

const SCAN_AUDIT_LOG_TABLE_V1: Table = Table {
    name: "scan_audit_log",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("job_id", &SqlType::Text, non_null = true),
        sqlite_column!("event_type", &SqlType::Text, non_null = true),
        sqlite_column!("timestamp", &SqlType::Integer, non_null = true),
        sqlite_column!("duration_ms", &SqlType::Integer),
        sqlite_column!("details", &SqlType::Text),
        sqlite_column!("error", &SqlType::Text),
    ],
    indices: &[
        ("idx_scan_audit_log_job_id", "job_id"),
        ("idx_scan_audit_log_timestamp", "timestamp DESC"),
    ],
};

pub const STATE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        SERVER_STATE_TABLE_V1,
        SCHEDULED_EVENTS_TABLE_V1,
        EPHEMERAL_ENTRIES_TABLE_V1,
        SCAN_AUDIT_LOG_TABLE_V1,
    ],
    migration: None,
}];
