//! Shared SQLite plumbing: declarative table definitions, schema validation
//! and versioned migrations used by every on-disk store.

mod versioned_schema;

pub use versioned_schema::*;
