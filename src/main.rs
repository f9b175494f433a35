use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use record_scan_server::config::parse_path;
use record_scan_server::server::{metrics, ServerConfig};
use record_scan_server::{
    run_server, AppConfig, CliConfig, DeferredDispatcher, FileConfig, RequestsLoggingLevel,
    ScanService, SqliteRecordStore, SqliteStateStore, StateStore,
};

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding server.db (scan state) and records.db (scanned records).
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to a TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir,
        port: cli_args.port,
        metrics_port: cli_args.metrics_port,
        logging_level: cli_args.logging_level,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    if config.api_tokens.is_empty() {
        warn!("No API tokens configured, every scan route will reject requests");
    }

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!("Opening state database at {:?}...", config.server_db_path());
    let state_store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(config.server_db_path())?);
    info!("Opening records database at {:?}...", config.records_db_path());
    let record_store = Arc::new(SqliteRecordStore::new(config.records_db_path())?);

    let scan_service = Arc::new(ScanService::new(
        state_store.clone(),
        record_store,
        config.scan.clone(),
    ));
    scan_service.ensure_timer_scheduled()?;
    if scan_service.resume_pending_job()? {
        info!("Resumed an interrupted scan job");
    }
    if let Err(e) = scan_service.prune_audit_log() {
        warn!("Failed to prune scan audit log: {}", e);
    }

    let shutdown_token = CancellationToken::new();
    {
        let shutdown_token = shutdown_token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received ctrl-c, shutting down..."),
                Err(e) => error!("Failed to listen for ctrl-c: {}", e),
            }
            shutdown_token.cancel();
        });
    }

    let dispatcher = DeferredDispatcher::new(
        scan_service.clone(),
        state_store.clone(),
        shutdown_token.clone(),
    );
    let dispatcher_handle = tokio::spawn(dispatcher.run());

    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::run_metrics_server(metrics_port).await {
            error!("Metrics server failed: {:#}", e);
        }
    });

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level.clone(),
        port: config.port,
        api_tokens: config.api_tokens.clone(),
    };

    info!("Ready to serve at port {}!", config.port);
    info!("Metrics available at port {}!", config.metrics_port);
    let result = run_server(server_config, scan_service, shutdown_token.clone()).await;

    shutdown_token.cancel();
    if let Err(e) = dispatcher_handle.await {
        error!("Dispatcher task failed: {}", e);
    }
    info!("Shutdown complete");
    result
}
