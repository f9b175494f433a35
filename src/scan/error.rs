use thiserror::Error;

/// Errors reported by scan operations. Every variant carries a stable
/// machine-readable code alongside its message.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("A scan is already running. Please wait for it to finish.")]
    AlreadyRunning,

    #[error("No valid record types were provided for the scan.")]
    NoValidSelectors,

    #[error("Scan storage failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl ScanError {
    pub fn code(&self) -> &'static str {
        match self {
            ScanError::AlreadyRunning => "scan_already_running",
            ScanError::NoValidSelectors => "scan_no_record_types",
            ScanError::Store(_) => "scan_store_failure",
        }
    }
}

pub type ScanResult<T> = Result<T, ScanError>;
