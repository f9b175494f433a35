//! End-to-end tests for the scan routes
//!
//! Every test runs against a real server and a running deferred dispatcher.

mod common;

use common::{
    TestClient, TestServer, API_TOKEN, API_USER, EMPTY_TYPE, PRIVATE_TYPE, PUBLISHED_PAGES,
    PUBLISHED_POSTS,
};
use record_scan_server::scan::LAST_SCAN_META_KEY;
use record_scan_server::{RecordStore, ScanSettings};
use reqwest::StatusCode;
use serde_json::Value;

fn slow_batches() -> ScanSettings {
    ScanSettings {
        batch_delay_secs: 3600,
        timer_enabled: false,
        ..Default::default()
    }
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_scan_routes_require_token() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    assert_eq!(client.get_status().await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        client.run_scan(&[], None).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(client.clear_job().await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        client.get_audit_log(None).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_unknown_token_is_forbidden() {
    let server = TestServer::spawn().await;
    let client = TestClient::with_token(server.base_url.clone(), "not-a-token");

    assert_eq!(client.get_status().await.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        client.run_scan(&[], None).await.status(),
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn test_home_reports_user() {
    let server = TestServer::spawn().await;

    let anonymous: Value = TestClient::new(server.base_url.clone())
        .get_home()
        .await
        .json()
        .await
        .unwrap();
    assert!(anonymous["user"].is_null());

    let authenticated: Value = TestClient::authenticated(server.base_url.clone())
        .get_home()
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(authenticated["user"], API_USER);
}

#[tokio::test]
async fn test_cookie_session_runs_with_single_use_nonce() {
    let server = TestServer::spawn_with_settings(slow_batches()).await;
    let client = TestClient::with_cookie(server.base_url.clone(), API_TOKEN);

    assert_eq!(client.get_status().await.status(), StatusCode::OK);

    let response = client.run_scan(&[], None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_nonce");

    let response = client.get_nonce().await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    let nonce = body["nonce"].as_str().unwrap().to_string();
    assert!(body["expires_in"].as_i64().unwrap() > 0);

    let response = client.run_scan_with_nonce(&nonce).await;
    assert_eq!(response.status(), StatusCode::OK);
    let started: Value = response.json().await.unwrap();
    assert_eq!(started["initiated_by"], API_USER);

    let response = client.clear_job_with_nonce(&nonce).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let status: Value = client.get_status().await.json().await.unwrap();
    assert_eq!(status["id"], started["id"]);
}

#[tokio::test]
async fn test_nonce_is_bound_to_the_issuing_session() {
    let server = TestServer::spawn().await;
    let stranger = TestClient::with_cookie(server.base_url.clone(), "not-a-token");
    assert_eq!(stranger.get_nonce().await.status(), StatusCode::FORBIDDEN);

    let bearer = TestClient::authenticated(server.base_url.clone());
    let body: Value = bearer.get_nonce().await.json().await.unwrap();
    let nonce = body["nonce"].as_str().unwrap().to_string();

    // A bearer request needs no nonce, and leaves the issued one unspent.
    assert_eq!(bearer.run_scan(&[EMPTY_TYPE], None).await.status(), StatusCode::OK);

    let cookie = TestClient::with_cookie(server.base_url.clone(), API_TOKEN);
    assert_eq!(
        cookie.run_scan_with_nonce(&nonce).await.status(),
        StatusCode::OK
    );
}

// ============================================================================
// Status and record types
// ============================================================================

#[tokio::test]
async fn test_status_idle_before_any_scan() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone());

    let response = client.get_status().await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "idle");
    assert!(body["lastRun"].is_null());
    assert!(body["nextRun"].is_null());
    assert_eq!(body["record_types"], serde_json::json!(["post", "page"]));
}

#[tokio::test]
async fn test_record_types_lists_public_types_only() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone());

    let response = client.get_record_types().await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    let supported = body["supported"].as_object().unwrap();
    assert!(supported.contains_key("post"));
    assert!(supported.contains_key("page"));
    assert!(supported.contains_key(EMPTY_TYPE));
    assert!(!supported.contains_key(PRIVATE_TYPE));
    assert_eq!(body["defaults"], serde_json::json!(["post", "page"]));
}

// ============================================================================
// Running scans
// ============================================================================

#[tokio::test]
async fn test_deferred_scan_stamps_every_published_record() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone());

    let response = client.run_scan(&[], Some(10)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let started: Value = response.json().await.unwrap();
    let total = PUBLISHED_POSTS + PUBLISHED_PAGES;
    assert_eq!(started["total"], total);
    assert_eq!(started["origin"], "interactive");
    assert_eq!(started["initiated_by"], API_USER);

    let finished = client.wait_for_completion().await;
    assert_eq!(finished["processed"], total);
    assert_eq!(finished["remaining"], 0);
    assert_eq!(finished["percent"], 100);
    assert_eq!(finished["lastRun"]["total"], total);

    for id in &server.published_ids {
        let stamp = server.record_store.get_meta(*id, LAST_SCAN_META_KEY).unwrap();
        assert!(stamp.is_some(), "record {} was not stamped", id);
    }
}

#[tokio::test]
async fn test_scan_of_selected_type_only() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone());

    let response = client.run_scan(&["PAGE", "page", "unknown"], None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let started: Value = response.json().await.unwrap();
    assert_eq!(started["record_types"], serde_json::json!(["page"]));
    assert_eq!(started["total"], PUBLISHED_PAGES);

    let finished = client.wait_for_completion().await;
    assert_eq!(finished["processed"], PUBLISHED_PAGES);

    let first_post = server.published_ids[0];
    assert!(server
        .record_store
        .get_meta(first_post, LAST_SCAN_META_KEY)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_scan_with_no_matching_records_completes_immediately() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone());

    let response = client.run_scan(&[EMPTY_TYPE], None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["total"], 0);
    assert_eq!(body["percent"], 0);
    assert_eq!(body["lastRun"]["record_types"], serde_json::json!([EMPTY_TYPE]));
}

#[tokio::test]
async fn test_second_scan_conflicts_while_first_is_active() {
    let server = TestServer::spawn_with_settings(slow_batches()).await;
    let client = TestClient::authenticated(server.base_url.clone());

    let response = client.run_scan(&[], None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let first: Value = response.json().await.unwrap();
    assert_eq!(first["status"], "queued");

    let response = client.run_scan(&["page"], None).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "scan_already_running");

    let status: Value = client.get_status().await.json().await.unwrap();
    assert_eq!(status["id"], first["id"]);
}

#[tokio::test]
async fn test_clear_job_allows_a_new_scan() {
    let server = TestServer::spawn_with_settings(slow_batches()).await;
    let client = TestClient::authenticated(server.base_url.clone());

    assert_eq!(client.run_scan(&[], None).await.status(), StatusCode::OK);

    let response = client.clear_job().await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let status: Value = client.get_status().await.json().await.unwrap();
    assert_eq!(status["status"], "idle");

    assert_eq!(client.run_scan(&[], None).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone());

    let response = client.run_scan_raw("{not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_request");
}

#[tokio::test]
async fn test_empty_body_runs_default_scan() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone());

    let response = client.run_scan_raw("").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["record_types"], serde_json::json!(["post", "page"]));
}

#[tokio::test]
async fn test_comma_separated_types_are_accepted() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone());

    let response = client
        .run_scan_raw(r#"{"record_types": "page, product", "batch_size": 1000}"#)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["record_types"], serde_json::json!(["page", "product"]));
    assert_eq!(body["batch_size"], 200);
}

#[tokio::test]
async fn test_no_supported_default_types_is_unprocessable() {
    let server = TestServer::spawn_with_settings(ScanSettings {
        default_record_types: vec!["nothing".to_string()],
        timer_enabled: false,
        ..Default::default()
    })
    .await;
    let client = TestClient::authenticated(server.base_url.clone());

    let response = client.run_scan(&[], None).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "scan_no_record_types");
}

// ============================================================================
// Audit log and timer
// ============================================================================

#[tokio::test]
async fn test_audit_log_records_scan_lifecycle() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone());

    let started: Value = client.run_scan(&["post"], Some(10)).await.json().await.unwrap();
    let job_id = started["id"].as_str().unwrap().to_string();
    client.wait_for_completion().await;

    let response = client.get_audit_log(Some(&job_id)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    let events: Vec<&str> = body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["event_type"].as_str().unwrap())
        .collect();
    assert!(events.contains(&"started"));
    assert!(events.contains(&"completed"));
    assert_eq!(events.iter().filter(|e| **e == "progress").count(), 2);
}

#[tokio::test]
async fn test_enabled_timer_reports_next_run() {
    let server = TestServer::spawn_with_settings(ScanSettings {
        timer_enabled: true,
        ..Default::default()
    })
    .await;
    let client = TestClient::authenticated(server.base_url.clone());

    let body: Value = client.get_status().await.json().await.unwrap();
    assert_eq!(body["status"], "idle");
    assert!(body["nextRun"].as_i64().is_some());
    assert_eq!(server.scan_service.next_timer_run().unwrap(), body["nextRun"].as_i64());
}
