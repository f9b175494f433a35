use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,

    pub scan: Option<ScanConfig>,
    pub api_tokens: Option<Vec<ApiTokenConfig>>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ScanConfig {
    pub default_batch_size: Option<i64>,
    pub default_record_types: Option<Vec<String>>,
    pub batch_delay_secs: Option<i64>,
    pub timer_interval_hours: Option<u64>,
    pub timer_enabled: Option<bool>,
    pub audit_log_retention_days: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiTokenConfig {
    pub token: String,
    pub user: String,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
