use anyhow::{Context, Result};
use std::time::Duration;

use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::scan_routes::make_scan_routes;
use super::session::Session;
use super::{log_requests, state::*, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub user: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        user: session.map(|s| s.user),
    };
    Json(stats)
}

pub fn make_app(config: ServerConfig, scan_service: GuardedScanService) -> Router {
    let state = ServerState::new(config, scan_service);

    Router::new()
        .route("/", get(home))
        .nest("/v1/scan", make_scan_routes())
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

pub async fn run_server(
    config: ServerConfig,
    scan_service: GuardedScanService,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, scan_service);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanSettings;
    use crate::records::{SqliteRecordStore, PUBLISHED_STATUS};
    use crate::scan::ScanService;
    use crate::state_store::SqliteStateStore;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";

    fn make_test_app() -> (Router, Arc<SqliteRecordStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let state_store = Arc::new(SqliteStateStore::new(dir.path().join("server.db")).unwrap());
        let records = Arc::new(SqliteRecordStore::new(dir.path().join("records.db")).unwrap());
        records.register_record_type("post", "Posts", true).unwrap();
        records.register_record_type("page", "Pages", true).unwrap();
        let service = Arc::new(ScanService::new(
            state_store,
            records.clone(),
            ScanSettings::default(),
        ));
        let config = ServerConfig {
            requests_logging_level: crate::server::RequestsLoggingLevel::None,
            api_tokens: HashMap::from([(TOKEN.to_string(), "admin".to_string())]),
            ..ServerConfig::default()
        };
        (make_app(config, service), records, dir)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn formats_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 01:01:01");
    }

    #[tokio::test]
    async fn responds_unauthorized_on_protected_routes() {
        let (app, _records, _dir) = make_test_app();

        let protected_routes = vec![
            ("GET", "/v1/scan/status"),
            ("POST", "/v1/scan/run"),
            ("DELETE", "/v1/scan/job"),
            ("GET", "/v1/scan/audit"),
            ("GET", "/v1/scan/record-types"),
            ("GET", "/v1/scan/nonce"),
        ];

        for (method, route) in protected_routes {
            let request = Request::builder()
                .method(method)
                .uri(route)
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", route);

            let request = Request::builder()
                .method(method)
                .uri(route)
                .header("Authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", route);
        }
    }

    #[tokio::test]
    async fn home_is_public() {
        let (app, _records, _dir) = make_test_app();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert!(json["uptime"].is_string());
        assert!(json["user"].is_null());
    }

    #[tokio::test]
    async fn run_then_conflict() {
        let (app, records, _dir) = make_test_app();
        records.insert_record("post", PUBLISHED_STATUS, "p").unwrap();

        let run = || {
            Request::builder()
                .method("POST")
                .uri("/v1/scan/run")
                .header("Authorization", format!("Bearer {}", TOKEN))
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"record_types": "post", "batch_size": 10}"#))
                .unwrap()
        };

        let response = app.clone().oneshot(run()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "queued");
        assert_eq!(json["initiated_by"], "admin");

        let response = app.clone().oneshot(run()).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["code"], "scan_already_running");
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let (app, _records, _dir) = make_test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/v1/scan/run")
            .header("Authorization", TOKEN)
            .body(Body::from("{nope"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cookie_session_needs_a_fresh_nonce_to_run() {
        let (app, records, _dir) = make_test_app();
        records.insert_record("post", PUBLISHED_STATUS, "p").unwrap();
        let cookie = format!("session_token={}", TOKEN);

        let run = |nonce: Option<&str>| {
            let mut builder = Request::builder()
                .method("POST")
                .uri("/v1/scan/run")
                .header("Cookie", cookie.as_str());
            if let Some(nonce) = nonce {
                builder = builder.header("X-Scan-Nonce", nonce);
            }
            builder.body(Body::empty()).unwrap()
        };

        let response = app.clone().oneshot(run(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["code"], "invalid_nonce");

        let request = Request::builder()
            .uri("/v1/scan/nonce")
            .header("Cookie", cookie.as_str())
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let nonce = body_json(response).await["nonce"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app.clone().oneshot(run(Some(nonce.as_str()))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder()
            .method("DELETE")
            .uri("/v1/scan/job")
            .header("Cookie", cookie.as_str())
            .header("X-Scan-Nonce", nonce.as_str())
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
