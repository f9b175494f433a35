pub mod config;
mod http_layers;
pub mod metrics;
pub mod nonce;
mod scan_routes;
#[allow(clippy::module_inception)]
pub mod server;
pub(self) mod session;
pub mod state;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
