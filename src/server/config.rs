use super::RequestsLoggingLevel;
use std::collections::HashMap;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Accepted API tokens, mapped to the user they authenticate.
    pub api_tokens: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
            api_tokens: HashMap::new(),
        }
    }
}
