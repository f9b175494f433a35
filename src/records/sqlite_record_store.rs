use super::schema::RECORDS_VERSIONED_SCHEMAS;
use super::{RecordStore, PUBLISHED_STATUS};
use crate::sqlite_persistence::open_versioned;
use anyhow::{bail, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path.as_ref(), RECORDS_VERSIONED_SCHEMAS, "records")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds or updates a record type. Private types exist but are never scanned.
    pub fn register_record_type(&self, slug: &str, label: &str, is_public: bool) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO record_types (slug, label, is_public) VALUES (?1, ?2, ?3)
             ON CONFLICT(slug) DO UPDATE SET label = ?2, is_public = ?3",
            params![slug, label, is_public as i64],
        )?;
        Ok(())
    }

    /// Inserts a record and returns its id.
    pub fn insert_record(&self, record_type: &str, status: &str, title: &str) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO records (record_type, status, title) VALUES (?1, ?2, ?3)",
            params![record_type, status, title],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

impl RecordStore for SqliteRecordStore {
    fn supported_record_types(&self) -> Result<BTreeMap<String, String>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT slug, label FROM record_types WHERE is_public = 1")?;
        let types = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
        Ok(types)
    }

    fn find_published_ids(&self, record_types: &[String]) -> Result<Vec<i64>> {
        if record_types.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (0..record_types.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT id FROM records WHERE status = ?1 AND record_type IN ({}) ORDER BY id ASC",
            placeholders
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let bound = std::iter::once(PUBLISHED_STATUS).chain(record_types.iter().map(String::as_str));
        let ids = stmt
            .query_map(params_from_iter(bound), |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn set_meta(&self, record_id: i64, key: &str, value: &str) -> Result<()> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE record_meta SET meta_value = ?3 WHERE record_id = ?1 AND meta_key = ?2",
            params![record_id, key, value],
        )?;
        if updated > 0 {
            return Ok(());
        }

        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM records WHERE id = ?1",
                params![record_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !exists {
            bail!("Record {} does not exist", record_id);
        }

        conn.execute(
            "INSERT INTO record_meta (record_id, meta_key, meta_value) VALUES (?1, ?2, ?3)",
            params![record_id, key, value],
        )?;
        Ok(())
    }

    fn get_meta(&self, record_id: i64, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let value = conn
            .query_row(
                "SELECT meta_value FROM record_meta WHERE record_id = ?1 AND meta_key = ?2",
                params![record_id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}
