//! Background scan jobs.
//!
//! A scan walks every published record of some record types in bounded
//! batches and stamps each one with the scan time. Only one job exists at a
//! time. It can be drained synchronously by the caller or one batch per
//! deferred invocation, and it survives restarts because every batch
//! persists the job before returning.

mod audit;
mod dispatcher;
mod error;
mod executor;
mod job;
mod repository;
mod service;
mod status;

pub use audit::ScanAuditLogger;
pub use dispatcher::DeferredDispatcher;
pub use error::{ScanError, ScanResult};
pub use executor::{BatchExecutor, BatchOutcome, ProgressSink, ScanProgress, LAST_SCAN_META_KEY};
pub use job::{
    clamp_batch_size, split_comma_list, ScanJob, ScanOrigin, ScanRequest, ScanStatus,
    ScanSummary, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE, MIN_BATCH_SIZE,
};
pub use repository::{JobRepository, JOB_STATE_KEY, PROCESS_HOOK, SUMMARY_STATE_KEY, TIMER_HOOK};
pub use service::{ScanMode, ScanService};
pub use status::{IdleStatus, JobStatus, ScanStatusReport};
