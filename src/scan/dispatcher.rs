//! In-process runner for due scheduled events.

use super::error::ScanResult;
use super::repository::{PROCESS_HOOK, TIMER_HOOK};
use super::service::ScanService;
use crate::server::metrics;
use crate::state_store::{ScheduledEvent, StateStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound on how long the loop sleeps without looking at the store.
const MAX_IDLE: Duration = Duration::from_secs(60);

/// Claims due events from the state store and runs them one at a time on the
/// blocking pool, so two deferred batches never overlap in this process.
pub struct DeferredDispatcher {
    service: Arc<ScanService>,
    state_store: Arc<dyn StateStore>,
    wake: Arc<Notify>,
    shutdown_token: CancellationToken,
}

impl DeferredDispatcher {
    pub fn new(
        service: Arc<ScanService>,
        state_store: Arc<dyn StateStore>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let wake = service.wake_handle();
        Self {
            service,
            state_store,
            wake,
            shutdown_token,
        }
    }

    /// Main dispatcher loop.
    pub async fn run(self) {
        info!("Starting deferred event dispatcher");

        loop {
            self.run_due_events().await;
            self.purge_ephemeral();

            let sleep_duration = self.time_until_next_event();
            debug!("Dispatcher sleeping for {:?}", sleep_duration);

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {}
                _ = self.wake.notified() => {
                    debug!("Dispatcher woken by a new scheduled event");
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Dispatcher received shutdown signal");
                    break;
                }
            }
        }

        info!("Deferred event dispatcher stopped");
    }

    /// Claims and runs every due event. Returns how many were run.
    pub async fn run_due_events(&self) -> usize {
        let due = match self.state_store.claim_due_events(Utc::now().timestamp()) {
            Ok(due) => due,
            Err(e) => {
                error!("Failed to claim due scheduled events: {}", e);
                return 0;
            }
        };

        let count = due.len();
        for event in due {
            self.dispatch(event).await;
        }
        count
    }

    async fn dispatch(&self, event: ScheduledEvent) {
        let hook = event.hook.clone();
        let service = self.service.clone();
        let start_time = Instant::now();

        let result = tokio::task::spawn_blocking(move || run_hook(&service, &event)).await;
        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(())) => {
                debug!("Scheduled event {} finished in {:?}", hook, elapsed);
                metrics::record_deferred_invocation(&hook, "success", elapsed);
            }
            Ok(Err(e)) => {
                error!("Scheduled event {} failed after {:?}: {}", hook, elapsed, e);
                metrics::record_deferred_invocation(&hook, "failed", elapsed);
                let service = self.service.clone();
                let failed_hook = hook.clone();
                let _ = tokio::task::spawn_blocking(move || {
                    service.record_failure(&failed_hook, &e)
                })
                .await;
                self.resume_after_failure(&hook).await;
            }
            Err(e) => {
                error!("Scheduled event {} panicked: {}", hook, e);
                metrics::record_deferred_invocation(&hook, "panicked", elapsed);
                self.resume_after_failure(&hook).await;
            }
        }
    }

    /// The failed event was already claimed; an active job needs a new batch.
    async fn resume_after_failure(&self, hook: &str) {
        let service = self.service.clone();
        match tokio::task::spawn_blocking(move || service.resume_pending_job()).await {
            Ok(Ok(true)) => info!("Rescheduled scan batch after {} failed", hook),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => error!("Failed to reschedule scan batch after {}: {}", hook, e),
            Err(e) => error!("Rescheduling after {} panicked: {}", hook, e),
        }
    }

    fn purge_ephemeral(&self) {
        match self.state_store.purge_expired_ephemeral() {
            Ok(0) => {}
            Ok(count) => debug!("Purged {} expired ephemeral entries", count),
            Err(e) => warn!("Failed to purge expired ephemeral entries: {}", e),
        }
    }

    fn time_until_next_event(&self) -> Duration {
        match self.state_store.next_event_time() {
            Ok(Some(run_at)) => {
                let wait = (run_at - Utc::now().timestamp()).max(0) as u64;
                Duration::from_secs(wait).min(MAX_IDLE)
            }
            Ok(None) => MAX_IDLE,
            Err(e) => {
                warn!("Failed to read next scheduled event time: {}", e);
                MAX_IDLE
            }
        }
    }
}

fn run_hook(service: &ScanService, event: &ScheduledEvent) -> ScanResult<()> {
    match event.hook.as_str() {
        PROCESS_HOOK => service.handle_deferred_batch(),
        TIMER_HOOK => service.handle_timer(),
        other => {
            warn!("Ignoring scheduled event with unknown hook '{}'", other);
            Ok(())
        }
    }
}
