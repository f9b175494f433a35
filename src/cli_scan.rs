use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use record_scan_server::config::parse_path;
use record_scan_server::scan::{
    split_comma_list, ScanMode, ScanOrigin, ScanProgress, ScanRequest, ScanService,
    ScanStatusReport, ScanSummary,
};
use record_scan_server::{AppConfig, CliConfig, FileConfig, SqliteRecordStore, SqliteStateStore};

mod cli_style;
use cli_style::{
    get_styles, print_error, print_header, print_key_value, print_job_status,
    print_success, print_warning, scan_progress_bar,
};

#[derive(Parser, Debug)]
#[command(styles=get_styles(), about = "Runs a record scan to completion, or inspects the current one.")]
struct CliArgs {
    /// Directory holding server.db and records.db.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to a TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Comma separated record types to scan. Defaults to the configured ones.
    #[clap(long)]
    pub types: Option<String>,

    /// Records stamped per batch (clamped to 10..=200).
    #[clap(long)]
    pub batch_size: Option<i64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Shows the current job, or the last run when idle.
    Status,

    /// Deletes the current job and cancels its pending batch.
    Reset,
}

fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn describe_summary(summary: &ScanSummary) -> String {
    let finished = summary
        .finished_at
        .map(format_timestamp)
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}/{} records ({}) by {} at {}",
        summary.processed,
        summary.total,
        summary.record_types.join(", "),
        summary.origin,
        finished
    )
}

fn run_scan(service: &ScanService, types: Option<String>, batch_size: Option<i64>) -> ExitCode {
    match service.is_running() {
        Ok(false) => {}
        Ok(true) => {
            print_error("A scan is already running. Please wait for it to finish.");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    }

    let request = ScanRequest {
        record_types: types.as_deref().map(split_comma_list).unwrap_or_default(),
        batch_size,
    };
    let initiated_by = std::env::var("USER").ok();

    let progress = scan_progress_bar();
    let mut sink = |event: &ScanProgress| match event {
        ScanProgress::Start { total, .. } => progress.set_length(*total as u64),
        ScanProgress::Processed { processed, .. } => progress.set_position(*processed as u64),
        ScanProgress::Finish { .. } => progress.finish_and_clear(),
    };

    let result = service.start(
        &request,
        ScanOrigin::Cli,
        initiated_by.as_deref(),
        ScanMode::Sync,
        Some(&mut sink),
    );
    progress.finish_and_clear();

    match result {
        Ok(report) => {
            let Some(job) = report.as_job() else {
                print_warning("Scan finished but no job was recorded.");
                return ExitCode::SUCCESS;
            };
            if !job.last_error.is_empty() {
                print_warning(&format!("Last error: {}", job.last_error));
            }
            print_success(&format!(
                "Scan completed: {}/{} records updated ({})",
                job.processed,
                job.total,
                job.record_types.join(", ")
            ));
            ExitCode::SUCCESS
        }
        Err(e) => {
            print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn print_status(report: &ScanStatusReport) {
    match report {
        ScanStatusReport::Idle(idle) => {
            print_header("No scan job");
            print_key_value("Default types", &idle.record_types.join(", "));
            let last_run = idle
                .last_run
                .as_ref()
                .map(describe_summary)
                .unwrap_or_else(|| "never".to_string());
            print_key_value("Last run", &last_run);
            print_next_run(idle.next_run);
        }
        ScanStatusReport::Job(job) => {
            print_header(&format!("Scan {}", job.id));
            print_job_status(job.status);
            print_key_value(
                "Progress",
                &format!("{}/{} ({}%)", job.processed, job.total, job.percent),
            );
            print_key_value("Types", &job.record_types.join(", "));
            print_key_value("Batch size", &job.batch_size.to_string());
            print_key_value("Origin", job.origin.as_str());
            if let Some(user) = &job.initiated_by {
                print_key_value("Initiated by", user);
            }
            print_key_value("Created", &format_timestamp(job.created_at));
            if let Some(started_at) = job.started_at {
                print_key_value("Started", &format_timestamp(started_at));
            }
            if let Some(finished_at) = job.finished_at {
                print_key_value("Finished", &format_timestamp(finished_at));
            }
            if !job.last_error.is_empty() {
                print_key_value("Last error", &job.last_error);
            }
            print_next_run(job.next_run);
        }
    }
}

fn print_next_run(next_run: Option<i64>) {
    let next = next_run
        .map(format_timestamp)
        .unwrap_or_else(|| "not scheduled".to_string());
    print_key_value("Next timer run", &next);
}

fn open_service(cli_args: &CliArgs) -> Result<ScanService> {
    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir.clone(),
        ..Default::default()
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    let state_store = SqliteStateStore::new(config.server_db_path())
        .with_context(|| format!("Failed to open {:?}", config.server_db_path()))?;
    let record_store = SqliteRecordStore::new(config.records_db_path())
        .with_context(|| format!("Failed to open {:?}", config.records_db_path()))?;

    Ok(ScanService::new(
        Arc::new(state_store),
        Arc::new(record_store),
        config.scan,
    ))
}

fn main() -> ExitCode {
    let cli_args = CliArgs::parse();

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init();

    let service = match open_service(&cli_args) {
        Ok(service) => service,
        Err(e) => {
            print_error(&format!("{:#}", e));
            return ExitCode::FAILURE;
        }
    };

    match cli_args.command {
        None => run_scan(&service, cli_args.types, cli_args.batch_size),
        Some(Command::Status) => match service.get_status() {
            Ok(report) => {
                print_status(&report);
                ExitCode::SUCCESS
            }
            Err(e) => {
                print_error(&e.to_string());
                ExitCode::FAILURE
            }
        },
        Some(Command::Reset) => match service.clear_job() {
            Ok(()) => {
                print_success("Scan job cleared.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                print_error(&e.to_string());
                ExitCode::FAILURE
            }
        },
    }
}
