//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per scan route. When routes or request
//! formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    pub base_url: String,
    token: Option<String>,
    cookie: Option<String>,
}

impl TestClient {
    /// Creates a client that sends no credentials
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            token: None,
            cookie: None,
        }
    }

    /// Creates a client sending `token` as a bearer token on every request
    pub fn with_token(base_url: String, token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            ..Self::new(base_url)
        }
    }

    /// Creates a client sending `token` in the session cookie, as a browser would
    pub fn with_cookie(base_url: String, token: &str) -> Self {
        Self {
            cookie: Some(format!("session_token={}", token)),
            ..Self::new(base_url)
        }
    }

    /// Creates a client authenticated with the test server's token
    pub fn authenticated(base_url: String) -> Self {
        Self::with_token(base_url, API_TOKEN)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        let builder = match &self.cookie {
            Some(cookie) => builder.header("Cookie", cookie),
            None => builder,
        };
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    // ========================================================================
    // Scan Endpoints
    // ========================================================================

    /// POST /v1/scan/run
    pub async fn run_scan(&self, record_types: &[&str], batch_size: Option<i64>) -> Response {
        self.request(reqwest::Method::POST, "/v1/scan/run")
            .json(&json!({
                "record_types": record_types,
                "batch_size": batch_size,
            }))
            .send()
            .await
            .expect("Run scan request failed")
    }

    /// POST /v1/scan/run with a raw body
    pub async fn run_scan_raw(&self, body: &str) -> Response {
        self.request(reqwest::Method::POST, "/v1/scan/run")
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("Run scan request failed")
    }

    /// POST /v1/scan/run with a default body and a request nonce
    pub async fn run_scan_with_nonce(&self, nonce: &str) -> Response {
        self.request(reqwest::Method::POST, "/v1/scan/run")
            .header(NONCE_HEADER, nonce)
            .send()
            .await
            .expect("Run scan request failed")
    }

    /// GET /v1/scan/nonce
    pub async fn get_nonce(&self) -> Response {
        self.request(reqwest::Method::GET, "/v1/scan/nonce")
            .send()
            .await
            .expect("Get nonce request failed")
    }

    /// GET /v1/scan/status
    pub async fn get_status(&self) -> Response {
        self.request(reqwest::Method::GET, "/v1/scan/status")
            .send()
            .await
            .expect("Get status request failed")
    }

    /// DELETE /v1/scan/job
    pub async fn clear_job(&self) -> Response {
        self.request(reqwest::Method::DELETE, "/v1/scan/job")
            .send()
            .await
            .expect("Clear job request failed")
    }

    /// DELETE /v1/scan/job with a request nonce
    pub async fn clear_job_with_nonce(&self, nonce: &str) -> Response {
        self.request(reqwest::Method::DELETE, "/v1/scan/job")
            .header(NONCE_HEADER, nonce)
            .send()
            .await
            .expect("Clear job request failed")
    }

    /// GET /v1/scan/audit
    pub async fn get_audit_log(&self, job_id: Option<&str>) -> Response {
        let path = match job_id {
            Some(job_id) => format!("/v1/scan/audit?job_id={}", job_id),
            None => "/v1/scan/audit".to_string(),
        };
        self.request(reqwest::Method::GET, &path)
            .send()
            .await
            .expect("Get audit log request failed")
    }

    /// GET /v1/scan/record-types
    pub async fn get_record_types(&self) -> Response {
        self.request(reqwest::Method::GET, "/v1/scan/record-types")
            .send()
            .await
            .expect("Get record types request failed")
    }

    /// GET /
    pub async fn get_home(&self) -> Response {
        self.request(reqwest::Method::GET, "/")
            .send()
            .await
            .expect("Get home request failed")
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Polls the status route until the job reports `completed`.
    ///
    /// # Panics
    ///
    /// Panics if the job does not complete within the timeout.
    pub async fn wait_for_completion(&self) -> Value {
        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SCAN_COMPLETION_TIMEOUT_MS);

        loop {
            let status: Value = self
                .get_status()
                .await
                .json()
                .await
                .expect("Status body is not JSON");
            if status["status"] == "completed" {
                return status;
            }
            if start.elapsed() > timeout {
                panic!("Scan did not complete in time, last status: {}", status);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
