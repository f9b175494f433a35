//! One-time request nonces for cookie sessions.
//!
//! A browser holding the session cookie sends it on every request, so state
//! changing routes also want a nonce it fetched beforehand. Nonces live as
//! ephemeral entries in the state store, bound to the session token.

use crate::state_store::StateStore;
use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

pub const NONCE_HEADER: &str = "X-Scan-Nonce";
pub const NONCE_TTL_SECS: i64 = 3600;

const NONCE_KEY_PREFIX: &str = "scan_nonce_";

fn nonce_key(nonce: &str) -> String {
    format!("{}{}", NONCE_KEY_PREFIX, nonce)
}

#[derive(Clone)]
pub struct NonceVault {
    state_store: Arc<dyn StateStore>,
}

impl NonceVault {
    pub fn new(state_store: Arc<dyn StateStore>) -> Self {
        Self { state_store }
    }

    /// Issues a nonce usable once by `token` within `NONCE_TTL_SECS`.
    pub fn issue(&self, token: &str) -> Result<String> {
        let nonce = Uuid::new_v4().simple().to_string();
        self.state_store
            .set_ephemeral(&nonce_key(&nonce), token, NONCE_TTL_SECS)?;
        Ok(nonce)
    }

    /// Consumes `nonce`. True only if it was issued to `token` and has not
    /// expired; a nonce presented with another token is burnt all the same.
    pub fn consume(&self, nonce: &str, token: &str) -> Result<bool> {
        Ok(self
            .state_store
            .take_ephemeral(&nonce_key(nonce))?
            .is_some_and(|owner| owner == token))
    }
}
