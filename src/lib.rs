//! Record Scan Server Library
//!
//! A single-flight, resumable batch scan over a record store, driven by HTTP
//! requests, a recurring timer and a command line trigger.

pub mod config;
pub mod records;
pub mod scan;
pub mod server;
pub mod sqlite_persistence;
pub mod state_store;

// Re-export commonly used types for convenience
pub use config::{AppConfig, CliConfig, FileConfig, ScanSettings};
pub use records::{RecordStore, SqliteRecordStore};
pub use scan::{DeferredDispatcher, ScanError, ScanMode, ScanOrigin, ScanRequest, ScanService};
pub use server::{run_server, RequestsLoggingLevel};
pub use state_store::{SqliteStateStore, StateStore};
