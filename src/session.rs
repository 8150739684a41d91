//! Admin sessions.
//!
//! A single shared password unlocks the back office. Logging in mints a random
//! token kept in a TTL cache; the token travels back as the `admin_session`
//! cookie (or an `Authorization: Bearer` header for scripts).

use crate::errors::AppError;
use crate::handlers::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Form, Json,
};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "admin_session";

#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<String, ()>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        let sessions = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(1_000)
            .build();
        Self { sessions, ttl }
    }

    pub async fn create(&self) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions.insert(token.clone(), ()).await;
        token
    }

    pub async fn is_valid(&self, token: &str) -> bool {
        self.sessions.get(token).await.is_some()
    }

    pub async fn revoke(&self, token: &str) {
        self.sessions.invalidate(token).await;
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub password: String,
}

/// Compares SHA-256 digests in constant time, so neither the length nor the
/// content of the configured password leaks through timing.
pub fn password_matches(candidate: &str, expected: &str) -> bool {
    let a = Sha256::digest(candidate.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Session token from the cookie, falling back to a bearer token.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
    })
    .filter(|t| !t.is_empty())
}

fn session_cookie(token: &str, max_age: u64) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age
    ))
    .map_err(|e| AppError::InternalError(format!("Invalid session cookie: {}", e)))
}

/// POST /admin/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    if !password_matches(&form.password, &state.config.admin_password) {
        tracing::warn!("Rejected admin login attempt");
        return Err(AppError::Unauthorized("Invalid password".to_string()));
    }

    let token = state.sessions.create().await;
    let cookie = session_cookie(&token, state.sessions.ttl().as_secs())?;
    tracing::info!("Admin session opened");

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "success": true, "token": token })),
    )
        .into_response())
}

/// POST /admin/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(token) = session_token(&headers) {
        state.sessions.revoke(&token).await;
    }
    let cookie = session_cookie("", 0)?;
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "success": true })),
    )
        .into_response())
}

/// Gate for every `/admin` route except login and logout.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(token) = session_token(request.headers()) else {
        return Err(AppError::Unauthorized("Missing admin session".to_string()));
    };
    if !state.sessions.is_valid(&token).await {
        return Err(AppError::Unauthorized("Expired or unknown admin session".to_string()));
    }
    Ok(next.run(request).await)
}
