//! SQLite schema for the record database scanned by the maintenance job.

use crate::sqlite_column;
use crate::sqlite_persistence::{ForeignKey, SqlType, Table, VersionedSchema};

/// Registered record types. Only public ones are offered to scans.
const RECORD_TYPES_TABLE_V1: Table = Table {
    name: "record_types",
    columns: &[
        sqlite_column!("slug", &SqlType::Text, is_primary_key = true),
        sqlite_column!("label", &SqlType::Text, non_null = true),
        sqlite_column!(
            "is_public",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
    ],
    indices: &[],
};

const RECORDS_TABLE_V1: Table = Table {
    name: "records",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("record_type", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!(
            "title",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
    ],
    indices: &[("idx_records_type_status", "record_type, status")],
};

const RECORD_ID_FK: ForeignKey = ForeignKey {
    foreign_table: "records",
    foreign_column: "id",
};

const RECORD_META_TABLE_V1: Table = Table {
    name: "record_meta",
    columns: &[
        sqlite_column!(
            "record_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&RECORD_ID_FK)
        ),
        sqlite_column!("meta_key", &SqlType::Text, non_null = true),
        sqlite_column!("meta_value", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_record_meta_record_key", "record_id, meta_key")],
};

pub const RECORDS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[RECORD_TYPES_TABLE_V1, RECORDS_TABLE_V1, RECORD_META_TABLE_V1],
    migration: None,
}];
