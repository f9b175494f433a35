use axum::extract::FromRef;

use crate::scan::ScanService;
use std::sync::Arc;
use std::time::Instant;

use super::nonce::NonceVault;
use super::ServerConfig;

pub type GuardedScanService = Arc<ScanService>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub scan_service: GuardedScanService,
    pub nonces: NonceVault,
    pub hash: String,
}

impl ServerState {
    pub fn new(config: ServerConfig, scan_service: GuardedScanService) -> Self {
        ServerState {
            config,
            start_time: Instant::now(),
            nonces: NonceVault::new(scan_service.state_store()),
            scan_service,
            hash: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

impl FromRef<ServerState> for GuardedScanService {
    fn from_ref(input: &ServerState) -> Self {
        input.scan_service.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for NonceVault {
    fn from_ref(input: &ServerState) -> Self {
        input.nonces.clone()
    }
}
