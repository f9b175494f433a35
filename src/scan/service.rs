use super::audit::ScanAuditLogger;
use super::error::{ScanError, ScanResult};
use super::executor::{reborrow_sink, BatchExecutor, ProgressSink, ScanProgress};
use super::job::{ScanJob, ScanOrigin, ScanRequest, ScanStatus, ScanSummary};
use super::repository::{JobRepository, PROCESS_HOOK, TIMER_HOOK};
use super::status::ScanStatusReport;
use crate::config::ScanSettings;
use crate::records::RecordStore;
use crate::server::metrics;
use crate::state_store::{ScanAuditEntry, StateStore};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Persist the job and let the dispatcher run it one batch at a time.
    Async,
    /// Drain the whole job before returning.
    Sync,
}

/// Owns the scan job lifecycle: admission, draining, finalizing and status.
pub struct ScanService {
    repository: JobRepository,
    executor: BatchExecutor,
    audit: ScanAuditLogger,
    state_store: Arc<dyn StateStore>,
    record_store: Arc<dyn RecordStore>,
    settings: ScanSettings,
    /// Signalled whenever a new scheduled event is registered.
    wake: Arc<Notify>,
}

fn now() -> i64 {
    Utc::now().timestamp()
}

fn sanitize_selector(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn warn_on_audit_failure(result: anyhow::Result<()>) {
    if let Err(e) = result {
        warn!("Failed to write scan audit entry: {}", e);
    }
}

impl ScanService {
    pub fn new(
        state_store: Arc<dyn StateStore>,
        record_store: Arc<dyn RecordStore>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            repository: JobRepository::new(state_store.clone()),
            executor: BatchExecutor::new(record_store.clone()),
            audit: ScanAuditLogger::new(state_store.clone()),
            state_store,
            record_store,
            settings,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn state_store(&self) -> Arc<dyn StateStore> {
        self.state_store.clone()
    }

    pub fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// Starts a scan.
    ///
    /// Async starts are refused while another job is active. A scan matching
    /// no records completes immediately without running any batch.
    pub fn start(
        &self,
        request: &ScanRequest,
        origin: ScanOrigin,
        initiated_by: Option<&str>,
        mode: ScanMode,
        sink: ProgressSink<'_>,
    ) -> ScanResult<ScanStatusReport> {
        if mode == ScanMode::Async && self.is_running()? {
            return Err(ScanError::AlreadyRunning);
        }

        let record_types = self.resolve_record_types(&request.record_types)?;
        if record_types.is_empty() {
            return Err(ScanError::NoValidSelectors);
        }

        let record_ids = self.record_store.find_published_ids(&record_types)?;
        let batch_size = request
            .batch_size
            .unwrap_or(self.settings.default_batch_size as i64);
        let mut job = ScanJob::new(
            record_types,
            batch_size,
            record_ids,
            origin,
            initiated_by.map(str::to_string),
            now(),
        );

        info!(
            "Starting {} scan {} ({:?}) over {} records of types [{}], batch size {}",
            origin,
            job.id,
            mode,
            job.total,
            job.record_types.join(", "),
            job.batch_size
        );
        metrics::record_scan_started(origin);

        if job.total == 0 {
            self.finalize(&mut job)?;
            return self.get_status();
        }

        match mode {
            ScanMode::Sync => self.process_job_immediately(&mut job, sink)?,
            ScanMode::Async => {
                self.repository.save(&job)?;
                self.schedule_next_batch()?;
            }
        }

        self.get_status()
    }

    /// Drains `job` in the calling thread, persisting after every batch.
    pub fn process_job_immediately(
        &self,
        job: &mut ScanJob,
        mut sink: ProgressSink<'_>,
    ) -> ScanResult<()> {
        let first_run = job.started_at.is_none();
        job.mark_running(now());
        self.repository.save(job)?;
        if first_run {
            warn_on_audit_failure(self.audit.log_started(job));
        }

        if let Some(sink) = sink.as_deref_mut() {
            sink(&ScanProgress::Start {
                job_id: job.id.clone(),
                total: job.total,
            });
        }

        while !job.queue.is_empty() {
            let outcome = self.executor.process_batch(job, reborrow_sink(&mut sink));
            warn_on_audit_failure(self.audit.log_progress(job, outcome.processed));
            self.repository.save(job)?;
        }

        self.finalize(job)?;

        if let Some(sink) = sink.as_deref_mut() {
            sink(&ScanProgress::Finish {
                processed: job.processed,
                total: job.total,
            });
        }
        Ok(())
    }

    /// Runs one batch of the persisted job. Schedules the next batch while
    /// work remains, finalizes otherwise.
    pub fn handle_deferred_batch(&self) -> ScanResult<()> {
        let Some(mut job) = self.repository.load()? else {
            debug!("Deferred scan batch fired with no job");
            return Ok(());
        };
        if job.queue.is_empty() {
            debug!("Deferred scan batch fired for drained job {}", job.id);
            return Ok(());
        }

        let first_run = job.started_at.is_none();
        job.mark_running(now());
        if first_run {
            warn_on_audit_failure(self.audit.log_started(&job));
        }

        let outcome = self.executor.process_batch(&mut job, None);
        warn_on_audit_failure(self.audit.log_progress(&job, outcome.processed));

        if job.queue.is_empty() {
            self.finalize(&mut job)?;
        } else {
            self.repository.save(&job)?;
            self.schedule_next_batch()?;
        }
        Ok(())
    }

    /// Starts a default scan unless one is already active.
    pub fn handle_timer(&self) -> ScanResult<()> {
        if let Err(e) = self.prune_audit_log() {
            warn!("Failed to prune scan audit log: {}", e);
        }

        if self.is_running()? {
            info!("Timer scan skipped, a scan is already active");
            self.resume_pending_job()?;
            return Ok(());
        }

        let request = ScanRequest {
            record_types: Vec::new(),
            batch_size: Some(self.settings.default_batch_size as i64),
        };
        match self.start(&request, ScanOrigin::Timer, None, ScanMode::Async, None) {
            Ok(_) | Err(ScanError::AlreadyRunning) => Ok(()),
            Err(ScanError::NoValidSelectors) => {
                warn!("Timer scan skipped, none of the default record types are supported");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Marks `job` completed and records its summary. Safe to call again on
    /// an already completed job.
    pub fn finalize(&self, job: &mut ScanJob) -> ScanResult<ScanSummary> {
        let newly_completed = job.status != ScanStatus::Completed;
        job.status = ScanStatus::Completed;
        job.finished_at.get_or_insert(now());
        job.queue.clear();
        self.repository.save(job)?;

        let summary = job.summary();
        self.repository.save_summary(&summary)?;

        if newly_completed {
            info!(
                "Scan {} completed: {}/{} records processed",
                job.id, job.processed, job.total
            );
            metrics::record_scan_completed(job.origin);
            warn_on_audit_failure(self.audit.log_completed(job));
        }
        Ok(summary)
    }

    pub fn is_running(&self) -> ScanResult<bool> {
        Ok(self
            .repository
            .load()?
            .is_some_and(|job| job.is_active()))
    }

    pub fn get_status(&self) -> ScanResult<ScanStatusReport> {
        let last_run = self.repository.load_summary()?;
        let next_run = self.next_timer_run()?;
        match self.repository.load()? {
            Some(job) => Ok(ScanStatusReport::for_job(&job, last_run, next_run)),
            None => Ok(ScanStatusReport::idle(
                last_run,
                next_run,
                self.default_record_types()?,
            )),
        }
    }

    pub fn last_summary(&self) -> ScanResult<Option<ScanSummary>> {
        Ok(self.repository.load_summary()?)
    }

    /// Deletes the job and cancels its pending batch. A batch already
    /// executing is not interrupted.
    pub fn clear_job(&self) -> ScanResult<()> {
        self.repository.clear()?;
        metrics::set_scan_running(false);
        info!("Scan job cleared");
        Ok(())
    }

    /// Schedules a batch for an active job that has none pending. The pending
    /// batch is claimed before it runs, so a failed batch or a crash leaves
    /// the job without one. Returns whether a batch was scheduled.
    pub fn resume_pending_job(&self) -> ScanResult<bool> {
        let running = self.is_running()?;
        metrics::set_scan_running(running);
        if !running {
            return Ok(false);
        }

        let scheduled = self.schedule_next_batch()?;
        if scheduled {
            info!("Resuming active scan job, next batch scheduled");
        }
        Ok(scheduled)
    }

    /// Registers the recurring timer event if it is enabled and not already
    /// pending, or removes it when disabled. Returns whether a new event
    /// was registered.
    pub fn ensure_timer_scheduled(&self) -> ScanResult<bool> {
        if !self.settings.timer_enabled {
            if self.state_store.clear_scheduled_event(TIMER_HOOK)? {
                info!("Scan timer disabled, removed pending timer event");
            }
            return Ok(false);
        }

        let interval = self.settings.timer_interval_secs;
        let inserted = self
            .state_store
            .schedule_event(TIMER_HOOK, now().saturating_add(interval), Some(interval))?;
        if inserted {
            info!("Scheduled scan timer every {}s", interval);
            self.wake.notify_one();
        }
        Ok(inserted)
    }

    pub fn next_timer_run(&self) -> ScanResult<Option<i64>> {
        Ok(self
            .state_store
            .get_scheduled_event(TIMER_HOOK)?
            .map(|event| event.run_at))
    }

    pub fn supported_record_types(&self) -> ScanResult<BTreeMap<String, String>> {
        Ok(self.record_store.supported_record_types()?)
    }

    /// Configured default record types that are currently supported.
    pub fn default_record_types(&self) -> ScanResult<Vec<String>> {
        let supported = self.record_store.supported_record_types()?;
        Ok(self.defaults_within(&supported))
    }

    /// Sanitized, supported, de-duplicated selectors in request order, or the
    /// defaults when none survive.
    pub fn resolve_record_types(&self, requested: &[String]) -> ScanResult<Vec<String>> {
        let supported = self.record_store.supported_record_types()?;
        let mut resolved: Vec<String> = Vec::new();
        for raw in requested {
            let selector = sanitize_selector(raw);
            if supported.contains_key(&selector) && !resolved.contains(&selector) {
                resolved.push(selector);
            }
        }

        if resolved.is_empty() {
            resolved = self.defaults_within(&supported);
        }
        Ok(resolved)
    }

    pub fn audit_log(&self, limit: usize, offset: usize) -> ScanResult<Vec<ScanAuditEntry>> {
        Ok(self.state_store.get_scan_audit_log(limit, offset)?)
    }

    pub fn audit_log_for_job(
        &self,
        job_id: &str,
        limit: usize,
        offset: usize,
    ) -> ScanResult<Vec<ScanAuditEntry>> {
        Ok(self
            .state_store
            .get_scan_audit_log_by_job(job_id, limit, offset)?)
    }

    /// Drops audit entries older than the configured retention.
    pub fn prune_audit_log(&self) -> ScanResult<usize> {
        let retention_secs = i64::try_from(self.settings.audit_log_retention_days)
            .unwrap_or(i64::MAX)
            .saturating_mul(24 * 3600);
        let removed = self
            .state_store
            .cleanup_old_scan_audit_entries(now().saturating_sub(retention_secs))?;
        if removed > 0 {
            info!("Pruned {} scan audit entries", removed);
        }
        Ok(removed)
    }

    /// Records a failed deferred invocation against the current job, if any.
    pub fn record_failure(&self, hook: &str, error: &ScanError) {
        let job_id = self.repository.load().ok().flatten().map(|job| job.id);
        warn_on_audit_failure(
            self.audit
                .log_failed(job_id.as_deref(), hook, &error.to_string()),
        );
    }

    fn defaults_within(&self, supported: &BTreeMap<String, String>) -> Vec<String> {
        let mut defaults: Vec<String> = Vec::new();
        for record_type in &self.settings.default_record_types {
            if supported.contains_key(record_type) && !defaults.contains(record_type) {
                defaults.push(record_type.clone());
            }
        }
        defaults
    }

    /// Registers the next deferred batch unless one is already pending.
    fn schedule_next_batch(&self) -> ScanResult<bool> {
        let run_at = now().saturating_add(self.settings.batch_delay_secs);
        let inserted = self.state_store.schedule_event(PROCESS_HOOK, run_at, None)?;
        if inserted {
            self.wake.notify_one();
        } else {
            debug!("Deferred scan batch already pending");
        }
        Ok(inserted)
    }
}
