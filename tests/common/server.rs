//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own databases and a running
//! deferred dispatcher, so asynchronous scans drain as they would in
//! production.

use super::constants::*;
use super::fixtures::create_test_records;
use record_scan_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use record_scan_server::{
    DeferredDispatcher, ScanService, ScanSettings, SqliteRecordStore, SqliteStateStore, StateStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Test server instance with isolated databases
///
/// When dropped, the server and the dispatcher shut down and the temp
/// directory is removed.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Records database, for checking stamps directly
    pub record_store: Arc<SqliteRecordStore>,

    /// Scan service shared with the server
    pub scan_service: Arc<ScanService>,

    /// Ids of the published fixture records
    pub published_ids: Vec<i64>,

    _temp_db_dir: TempDir,
    _shutdown_token: CancellationToken,
}

impl TestServer {
    /// Spawns a server on a random port with the timer disabled and no delay
    /// between deferred batches.
    pub async fn spawn() -> Self {
        Self::spawn_with_settings(ScanSettings {
            batch_delay_secs: 0,
            timer_enabled: false,
            ..Default::default()
        })
        .await
    }

    pub async fn spawn_with_settings(settings: ScanSettings) -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp dir");
        let (record_store, published_ids) =
            create_test_records(temp_db_dir.path()).expect("Failed to create test records");
        let record_store = Arc::new(record_store);

        let state_store: Arc<dyn StateStore> = Arc::new(
            SqliteStateStore::new(temp_db_dir.path().join("server.db"))
                .expect("Failed to open state store"),
        );

        let scan_service = Arc::new(ScanService::new(
            state_store.clone(),
            record_store.clone(),
            settings,
        ));
        scan_service
            .ensure_timer_scheduled()
            .expect("Failed to schedule timer");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let shutdown_token = CancellationToken::new();

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port,
            api_tokens: HashMap::from([(API_TOKEN.to_string(), API_USER.to_string())]),
        };
        let app = make_app(config, scan_service.clone());

        let server_token = shutdown_token.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_token.cancelled().await })
                .await
                .expect("Server failed");
        });

        let dispatcher =
            DeferredDispatcher::new(scan_service.clone(), state_store, shutdown_token.clone());
        tokio::spawn(dispatcher.run());

        let server = Self {
            base_url,
            record_store,
            scan_service,
            published_ids,
            _temp_db_dir: temp_db_dir,
            _shutdown_token: shutdown_token,
        };

        server.wait_for_ready().await;

        server
    }

    /// Polls the home route until the server answers
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self._shutdown_token.cancel();
    }
}
