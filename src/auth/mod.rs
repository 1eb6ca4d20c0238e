mod jwt;

pub use jwt::{decode_session, encode_session, Claims};

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
    Json,
};
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::state::AppState;

const SESSION_COOKIE: &str = "pixellog_session";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Resolve the cookie-signing secret. Falls back to a random per-process
/// secret when none is configured, so existing sessions die on restart.
pub fn resolve_session_secret(settings: &Settings) -> String {
    match &settings.session_secret {
        Some(secret) if !secret.is_empty() => secret.clone(),
        _ => {
            warn!("PIXELLOG__SESSION_SECRET not set; sessions will not survive a restart");
            let bytes: [u8; 32] = rand::rng().random();
            hex::encode(bytes)
        }
    }
}

fn build_session_cookie(token: &str, session_days: u32) -> String {
    let max_age = session_days as u64 * 24 * 60 * 60;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        SESSION_COOKIE, token, max_age
    )
}

fn session_token_from_headers(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookie_str| {
            cookie_str
                .split(';')
                .find_map(|c| {
                    c.trim()
                        .strip_prefix(SESSION_COOKIE)
                        .and_then(|rest| rest.strip_prefix('='))
                })
                .map(|t| t.to_string())
        })
}

/// POST /stats/login
///
/// Credential check is against the configured admin account only.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<([(header::HeaderName, String); 1], Json<Value>)> {
    if state.settings.admin_password.is_empty() {
        return Err(Error::InvalidCredentials);
    }
    if req.username != state.settings.admin_username
        || req.password != state.settings.admin_password
    {
        return Err(Error::InvalidCredentials);
    }

    let token = encode_session(&state.session_secret, &req.username, state.settings.session_days)?;
    let cookie = build_session_cookie(&token, state.settings.session_days);

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "ok": true })),
    ))
}

/// Middleware guarding the stats routes. Valid session cookie or 401.
pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let token = session_token_from_headers(request.headers()).ok_or(Error::Unauthorized)?;
    decode_session(&token, &state.session_secret).map_err(|_| Error::Unauthorized)?;
    Ok(next.run(request).await)
}
