//! Scan HTTP routes.
//!
//! Provides endpoints for:
//! - Starting a scan and reading its status
//! - Resetting the current job
//! - Reading the scan audit log and the scannable record types
//! - Issuing nonces for cookie sessions

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

use crate::scan::{ScanError, ScanMode, ScanOrigin, ScanRequest};
use crate::server::nonce::{NonceVault, NONCE_HEADER, NONCE_TTL_SECS};
use crate::server::session::Session;
use crate::server::state::{GuardedScanService, ServerState};
use crate::state_store::ScanAuditEntry;

const MAX_AUDIT_PAGE: usize = 500;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    pub job_id: Option<String>,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct AuditLogResponse {
    pub entries: Vec<ScanAuditEntry>,
}

#[derive(Debug, Serialize)]
pub struct NonceResponse {
    pub nonce: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct RecordTypesResponse {
    pub supported: BTreeMap<String, String>,
    pub defaults: Vec<String>,
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let status = match &self {
            ScanError::AlreadyRunning => StatusCode::CONFLICT,
            ScanError::NoValidSelectors => StatusCode::UNPROCESSABLE_ENTITY,
            ScanError::Store(e) => {
                error!("Scan store failure: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error_response(status, self.code(), &self.to_string())
    }
}

fn error_response(status: StatusCode, code: &'static str, message: &str) -> Response {
    let body = ErrorBody {
        code,
        message: message.to_string(),
    };
    (status, Json(body)).into_response()
}

/// Consumes the request nonce of a cookie session, returning the rejection
/// when it is missing or invalid. Header sessions always pass.
fn reject_without_nonce(
    session: &Session,
    headers: &HeaderMap,
    nonces: &NonceVault,
) -> Option<Response> {
    if !session.requires_nonce() {
        return None;
    }
    let Some(nonce) = headers.get(NONCE_HEADER).and_then(|v| v.to_str().ok()) else {
        debug!("Cookie session of {} sent no nonce", session.user);
        return Some(error_response(
            StatusCode::FORBIDDEN,
            "invalid_nonce",
            "Missing request nonce",
        ));
    };
    match nonces.consume(nonce, &session.token) {
        Ok(true) => None,
        Ok(false) => Some(error_response(
            StatusCode::FORBIDDEN,
            "invalid_nonce",
            "Invalid or expired request nonce",
        )),
        Err(e) => Some(ScanError::Store(e).into_response()),
    }
}

/// GET /nonce - Issue a one-time nonce for the caller's session
async fn issue_nonce(session: Session, State(nonces): State<NonceVault>) -> Response {
    match nonces.issue(&session.token) {
        Ok(nonce) => Json(NonceResponse {
            nonce,
            expires_in: NONCE_TTL_SECS,
        })
        .into_response(),
        Err(e) => ScanError::Store(e).into_response(),
    }
}

/// POST /run - Start an asynchronous scan
async fn run_scan(
    session: Session,
    State(scan_service): State<GuardedScanService>,
    State(nonces): State<NonceVault>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(rejection) = reject_without_nonce(&session, &headers, &nonces) {
        return rejection;
    }

    let request: ScanRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ScanRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejected malformed scan request: {}", e);
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "invalid_request",
                    &format!("Invalid request body: {}", e),
                );
            }
        }
    };

    info!(
        "User {} requested a scan of [{}]",
        session.user,
        request.record_types.join(", ")
    );
    match scan_service.start(
        &request,
        ScanOrigin::Interactive,
        Some(&session.user),
        ScanMode::Async,
        None,
    ) {
        Ok(status) => Json(status).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /status - Current job or idle status
async fn get_status(_session: Session, State(scan_service): State<GuardedScanService>) -> Response {
    match scan_service.get_status() {
        Ok(status) => Json(status).into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /job - Reset the current job
async fn clear_job(
    session: Session,
    State(scan_service): State<GuardedScanService>,
    State(nonces): State<NonceVault>,
    headers: HeaderMap,
) -> Response {
    if let Some(rejection) = reject_without_nonce(&session, &headers, &nonces) {
        return rejection;
    }
    info!("User {} cleared the scan job", session.user);
    match scan_service.clear_job() {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /audit - Scan audit log, newest first
async fn get_audit_log(
    _session: Session,
    State(scan_service): State<GuardedScanService>,
    Query(query): Query<AuditLogQuery>,
) -> Response {
    let limit = query.limit.min(MAX_AUDIT_PAGE);
    let entries = match &query.job_id {
        Some(job_id) => scan_service.audit_log_for_job(job_id, limit, query.offset),
        None => scan_service.audit_log(limit, query.offset),
    };
    match entries {
        Ok(entries) => Json(AuditLogResponse { entries }).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /record-types - Scannable record types and the defaults
async fn get_record_types(
    _session: Session,
    State(scan_service): State<GuardedScanService>,
) -> Response {
    let supported = match scan_service.supported_record_types() {
        Ok(supported) => supported,
        Err(e) => return e.into_response(),
    };
    match scan_service.default_record_types() {
        Ok(defaults) => Json(RecordTypesResponse {
            supported,
            defaults,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub fn make_scan_routes() -> Router<ServerState> {
    Router::new()
        .route("/run", post(run_scan))
        .route("/status", get(get_status))
        .route("/job", delete(clear_job))
        .route("/audit", get(get_audit_log))
        .route("/record-types", get(get_record_types))
        .route("/nonce", get(issue_nonce))
}
