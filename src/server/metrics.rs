use crate::scan::ScanOrigin;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all metrics of this server
const PREFIX: &str = "record_scan";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Scan Metrics
    pub static ref SCANS_STARTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_scans_started_total"), "Scans started, by origin"),
        &["origin"]
    ).expect("Failed to create scans_started_total metric");

    pub static ref SCANS_COMPLETED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_scans_completed_total"), "Scans completed, by origin"),
        &["origin"]
    ).expect("Failed to create scans_completed_total metric");

    pub static ref SCAN_BATCHES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_scan_batches_total"),
        "Scan batches processed"
    ).expect("Failed to create scan_batches_total metric");

    pub static ref SCAN_RECORDS_STAMPED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_scan_records_total"), "Records processed by scans"),
        &["result"]
    ).expect("Failed to create scan_records_total metric");

    pub static ref SCAN_RUNNING: Gauge = Gauge::new(
        format!("{PREFIX}_scan_running"),
        "1 while a scan job is queued or running"
    ).expect("Failed to create scan_running metric");

    // Deferred Event Metrics
    pub static ref DEFERRED_INVOCATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_deferred_invocations_total"), "Scheduled event invocations"),
        &["hook", "status"]
    ).expect("Failed to create deferred_invocations_total metric");

    pub static ref DEFERRED_INVOCATION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_deferred_invocation_duration_seconds"),
            "Scheduled event invocation duration in seconds"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]),
        &["hook"]
    ).expect("Failed to create deferred_invocation_duration_seconds metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(SCANS_STARTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SCANS_COMPLETED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SCAN_BATCHES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SCAN_RECORDS_STAMPED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SCAN_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(DEFERRED_INVOCATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(DEFERRED_INVOCATION_DURATION_SECONDS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_scan_started(origin: ScanOrigin) {
    SCANS_STARTED_TOTAL
        .with_label_values(&[origin.as_str()])
        .inc();
    SCAN_RUNNING.set(1.0);
}

pub fn record_scan_completed(origin: ScanOrigin) {
    SCANS_COMPLETED_TOTAL
        .with_label_values(&[origin.as_str()])
        .inc();
    SCAN_RUNNING.set(0.0);
}

/// Syncs the running gauge with the persisted job, after a reset or a restart.
pub fn set_scan_running(running: bool) {
    SCAN_RUNNING.set(if running { 1.0 } else { 0.0 });
}

/// `processed` includes the `failed` ones.
pub fn record_scan_batch(processed: usize, failed: usize) {
    SCAN_BATCHES_TOTAL.inc();
    SCAN_RECORDS_STAMPED_TOTAL
        .with_label_values(&["stamped"])
        .inc_by(processed.saturating_sub(failed) as f64);
    if failed > 0 {
        SCAN_RECORDS_STAMPED_TOTAL
            .with_label_values(&["failed"])
            .inc_by(failed as f64);
    }
}

pub fn record_deferred_invocation(hook: &str, status: &str, duration: Duration) {
    DEFERRED_INVOCATIONS_TOTAL
        .with_label_values(&[hook, status])
        .inc();
    DEFERRED_INVOCATION_DURATION_SECONDS
        .with_label_values(&[hook])
        .observe(duration.as_secs_f64());
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Serves `/metrics` on its own port until the listener fails.
pub async fn run_metrics_server(port: u16) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Metrics server listening on port {}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
