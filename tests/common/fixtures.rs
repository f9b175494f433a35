//! Test fixture creation for the records database

use super::constants::*;
use anyhow::Result;
use record_scan_server::records::PUBLISHED_STATUS;
use record_scan_server::SqliteRecordStore;
use std::path::Path;

/// Creates records.db under `db_dir` with posts, pages, drafts and a
/// private record type.
///
/// Returns the store and the ids of the published posts and pages, in
/// insertion order.
pub fn create_test_records(db_dir: &Path) -> Result<(SqliteRecordStore, Vec<i64>)> {
    let store = SqliteRecordStore::new(db_dir.join("records.db"))?;

    store.register_record_type("post", "Posts", true)?;
    store.register_record_type("page", "Pages", true)?;
    store.register_record_type(EMPTY_TYPE, "Products", true)?;
    store.register_record_type(PRIVATE_TYPE, "Revisions", false)?;

    let mut published = Vec::new();
    for i in 0..PUBLISHED_POSTS {
        published.push(store.insert_record("post", PUBLISHED_STATUS, &format!("Post {}", i))?);
    }
    for i in 0..PUBLISHED_PAGES {
        published.push(store.insert_record("page", PUBLISHED_STATUS, &format!("Page {}", i))?);
    }
    for i in 0..DRAFT_POSTS {
        store.insert_record("post", "draft", &format!("Draft {}", i))?;
    }
    store.insert_record(PRIVATE_TYPE, PUBLISHED_STATUS, "Revision")?;

    Ok((store, published))
}
