use super::state::ServerState;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::debug;

/// Where the session token was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Header,
    Cookie,
}

/// An authenticated caller, resolved from a configured API token.
#[derive(Debug)]
pub struct Session {
    pub user: String,
    pub token: String,
    pub source: TokenSource,
}

impl Session {
    /// Cookie sessions must present a nonce on state changing routes.
    pub fn requires_nonce(&self) -> bool {
        self.source == TokenSource::Cookie
    }
}

pub const COOKIE_SESSION_TOKEN_KEY: &str = "session_token";
pub const HEADER_SESSION_TOKEN_KEY: &str = "Authorization";

#[derive(Debug)]
pub enum SessionExtractionError {
    MissingToken,
    AccessDenied,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SessionExtractionError::MissingToken => StatusCode::UNAUTHORIZED.into_response(),
            SessionExtractionError::AccessDenied => StatusCode::FORBIDDEN.into_response(),
        }
    }
}

fn extract_session_token_from_cookies(parts: &Parts) -> Option<String> {
    CookieJar::from_headers(&parts.headers)
        .get(COOKIE_SESSION_TOKEN_KEY)
        .map(Cookie::value)
        .map(|s| s.to_string())
}

fn extract_session_token_from_headers(parts: &Parts) -> Option<String> {
    let raw = parts.headers.get(HEADER_SESSION_TOKEN_KEY)?.to_str().ok()?.trim();
    let token = if raw.eq_ignore_ascii_case("bearer") {
        ""
    } else {
        raw.strip_prefix("Bearer ").unwrap_or(raw).trim()
    };
    (!token.is_empty()).then(|| token.to_string())
}

fn extract_session_from_request_parts(
    parts: &Parts,
    ctx: &ServerState,
) -> Result<Session, SessionExtractionError> {
    let Some((token, source)) = extract_session_token_from_headers(parts)
        .map(|token| (token, TokenSource::Header))
        .or_else(|| {
            extract_session_token_from_cookies(parts).map(|token| (token, TokenSource::Cookie))
        })
    else {
        debug!("No token in headers nor cookies.");
        return Err(SessionExtractionError::MissingToken);
    };

    match ctx.config.api_tokens.get(&token) {
        Some(user) => Ok(Session {
            user: user.clone(),
            token,
            source,
        }),
        None => {
            debug!("Rejected unknown API token");
            Err(SessionExtractionError::AccessDenied)
        }
    }
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_session_from_request_parts(parts, ctx)
    }
}

impl FromRequestParts<ServerState> for Option<Session> {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        Ok(extract_session_from_request_parts(parts, ctx).ok())
    }
}
