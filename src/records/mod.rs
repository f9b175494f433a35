//! The record set walked by scans.
//!
//! Scans only need three things from it: which record types exist, the ids of
//! published records of some types, and a per-record metadata slot to stamp.

mod schema;
mod sqlite_record_store;

pub use schema::RECORDS_VERSIONED_SCHEMAS;
pub use sqlite_record_store::SqliteRecordStore;

use anyhow::Result;
use std::collections::BTreeMap;

/// Status a record must have to be picked up by a scan.
pub const PUBLISHED_STATUS: &str = "publish";

pub trait RecordStore: Send + Sync {
    /// Record types eligible for scanning, as `slug => label`.
    fn supported_record_types(&self) -> Result<BTreeMap<String, String>>;

    /// Ids of published records whose type is one of `record_types`,
    /// in ascending order.
    fn find_published_ids(&self, record_types: &[String]) -> Result<Vec<i64>>;

    /// Writes (or overwrites) one metadata value on a record.
    fn set_meta(&self, record_id: i64, key: &str, value: &str) -> Result<()>;

    fn get_meta(&self, record_id: i64, key: &str) -> Result<Option<String>>;
}
