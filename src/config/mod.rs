mod file_config;

pub use file_config::{ApiTokenConfig, FileConfig, ScanConfig};

use crate::scan::{clamp_batch_size, DEFAULT_BATCH_SIZE};
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::collections::HashMap;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,

    pub scan: ScanSettings,

    /// Accepted API tokens, mapped to the user they authenticate.
    pub api_tokens: HashMap<String, String>,
}

/// Longest accepted timer interval, one year.
pub const MAX_TIMER_INTERVAL_HOURS: u64 = 24 * 365;

/// Tunables for scan jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    pub default_batch_size: usize,
    /// Record types used when a scan names none (or none valid).
    pub default_record_types: Vec<String>,
    /// Delay before each deferred batch runs.
    pub batch_delay_secs: i64,
    pub timer_interval_secs: i64,
    pub timer_enabled: bool,
    pub audit_log_retention_days: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            default_batch_size: DEFAULT_BATCH_SIZE,
            default_record_types: vec!["post".to_string(), "page".to_string()],
            batch_delay_secs: 5,
            timer_interval_secs: 24 * 3600,
            timer_enabled: true,
            audit_log_retention_days: 90,
        }
    }
}

impl ScanSettings {
    fn from_file(file: ScanConfig) -> Self {
        let defaults = Self::default();
        Self {
            default_batch_size: file
                .default_batch_size
                .map(clamp_batch_size)
                .unwrap_or(defaults.default_batch_size),
            default_record_types: file
                .default_record_types
                .map(|types| {
                    types
                        .into_iter()
                        .map(|t| t.trim().to_lowercase())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.default_record_types),
            batch_delay_secs: file
                .batch_delay_secs
                .map(|secs| secs.max(0))
                .unwrap_or(defaults.batch_delay_secs),
            timer_interval_secs: file
                .timer_interval_hours
                .map(|hours| hours.clamp(1, MAX_TIMER_INTERVAL_HOURS) as i64 * 3600)
                .unwrap_or(defaults.timer_interval_secs),
            timer_enabled: file.timer_enabled.unwrap_or(defaults.timer_enabled),
            audit_log_retention_days: file
                .audit_log_retention_days
                .unwrap_or(defaults.audit_log_retention_days),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let scan = ScanSettings::from_file(file.scan.unwrap_or_default());

        let mut api_tokens = HashMap::new();
        for entry in file.api_tokens.unwrap_or_default() {
            if entry.token.trim().is_empty() {
                bail!("API token for user '{}' is empty", entry.user);
            }
            api_tokens.insert(entry.token, entry.user);
        }

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            scan,
            api_tokens,
        })
    }

    pub fn server_db_path(&self) -> PathBuf {
        self.db_dir.join("server.db")
    }

    pub fn records_db_path(&self) -> PathBuf {
        self.db_dir.join("records.db")
    }
}

/// Clap value parser resolving a possibly relative, possibly missing path
/// against the current directory.
pub fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) if msg.kind() == std::io::ErrorKind::NotFound => path_buf,
        Err(msg) => {
            return Err(msg).with_context(|| format!("Error resolving path: {}", s));
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

/// Parses a logging level string into RequestsLoggingLevel.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
