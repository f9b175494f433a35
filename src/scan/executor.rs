use super::job::ScanJob;
use crate::records::RecordStore;
use crate::server::metrics;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Metadata key stamped on every scanned record.
pub const LAST_SCAN_META_KEY: &str = "last_scan";

const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Progress notifications emitted while draining a job synchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanProgress {
    Start { job_id: String, total: usize },
    Processed { record_id: i64, processed: usize, total: usize },
    Finish { processed: usize, total: usize },
}

pub type ProgressSink<'a> = Option<&'a mut dyn FnMut(&ScanProgress)>;

/// Lends `sink` out for one call, leaving it usable afterwards.
pub fn reborrow_sink<'s>(sink: &'s mut ProgressSink<'_>) -> ProgressSink<'s> {
    sink.as_mut().map(|s| &mut **s as &mut dyn FnMut(&ScanProgress))
}

/// Outcome of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Ids counted as processed, including those whose stamp failed.
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct BatchExecutor {
    record_store: Arc<dyn RecordStore>,
}

impl BatchExecutor {
    pub fn new(record_store: Arc<dyn RecordStore>) -> Self {
        Self { record_store }
    }

    /// Consumes up to `batch_size` ids from the front of the queue and stamps
    /// each one. Ids that are not positive are dropped without being counted.
    /// A failed stamp is logged and remembered in `last_error` but still
    /// counts as processed.
    pub fn process_batch(&self, job: &mut ScanJob, mut sink: ProgressSink<'_>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let take = job.batch_size.min(job.queue.len());
        let batch: Vec<i64> = job.queue.drain(..take).collect();
        let stamp = Utc::now().format(STAMP_FORMAT).to_string();

        for record_id in batch {
            if record_id <= 0 {
                debug!("Skipping invalid record id {} in scan {}", record_id, job.id);
                outcome.skipped += 1;
                continue;
            }

            if let Err(e) = self
                .record_store
                .set_meta(record_id, LAST_SCAN_META_KEY, &stamp)
            {
                warn!("Scan {} failed to stamp record {}: {:#}", job.id, record_id, e);
                job.last_error = format!("Failed to stamp record {}: {}", record_id, e);
                outcome.failed += 1;
            }

            job.processed = (job.processed + 1).min(job.total);
            outcome.processed += 1;

            if let Some(sink) = sink.as_deref_mut() {
                sink(&ScanProgress::Processed {
                    record_id,
                    processed: job.processed,
                    total: job.total,
                });
            }
        }

        metrics::record_scan_batch(outcome.processed, outcome.failed);
        debug!(
            "Scan {} batch done: {} processed, {} skipped, {} failed, {} remaining in queue",
            job.id,
            outcome.processed,
            outcome.skipped,
            outcome.failed,
            job.queue.len()
        );
        outcome
    }
}
