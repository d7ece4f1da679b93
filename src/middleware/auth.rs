//! Cookie-based authorization gate for the protected API.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::COOKIE;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};

use crate::auth::IssuedToken;
use crate::errors::AppError;
use crate::state::AppState;

pub const AUTH_COOKIE: &str = "auth-token";

const COOKIE_ATTRIBUTES: &str = "Path=/; HttpOnly; SameSite=Strict";

/// Reject the request unless it carries a valid `auth-token` cookie. On
/// success the [`crate::auth::Principal`] is stored in the request
/// extensions.
pub async fn require_principal(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = token_from_headers(req.headers())?
        .ok_or(AppError::Unauthorized("missing auth-token cookie"))?;

    match state.authorizer.validate(&token).await? {
        Some(principal) => {
            tracing::debug!(principal = %principal, "request authorized");
            req.extensions_mut().insert(principal);
            Ok(next.run(req).await)
        }
        None => {
            tracing::debug!(token = %mask(&token), "rejected invalid or expired token");
            Err(AppError::Unauthorized("invalid or expired token"))
        }
    }
}

/// `Ok(None)` when no `auth-token` cookie is present.
pub fn token_from_headers(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    for header in headers.get_all(COOKIE) {
        let raw = header
            .to_str()
            .map_err(|_| AppError::Validation("cookie header is not valid ASCII".into()))?;

        for pair in raw.split(';') {
            let Some((name, value)) = pair.trim().split_once('=') else {
                continue;
            };
            if name.trim() != AUTH_COOKIE {
                continue;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            if value.is_empty() || !value.chars().all(is_cookie_octet) {
                return Err(AppError::Validation("malformed auth-token cookie".into()));
            }
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

fn is_cookie_octet(c: char) -> bool {
    c.is_ascii_graphic() && !matches!(c, '"' | ',' | ';' | '\\')
}

/// `Set-Cookie` value carrying a freshly issued token.
pub fn auth_cookie(issued: &IssuedToken) -> Result<HeaderValue, AppError> {
    let value = format!(
        "{}={}; Expires={}; {}",
        AUTH_COOKIE,
        issued.token,
        http_date(issued.expires_at),
        COOKIE_ATTRIBUTES
    );
    HeaderValue::from_str(&value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("unencodable auth cookie: {}", e)))
}

/// `Set-Cookie` value that removes the token from the client.
pub fn cleared_cookie() -> HeaderValue {
    HeaderValue::from_static(
        "auth-token=; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; Path=/; HttpOnly; SameSite=Strict",
    )
}

fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Never log a full token.
fn mask(token: &str) -> String {
    match token.get(..6) {
        Some(prefix) if token.len() > 12 => format!("{}…", prefix),
        _ => "****".to_string(),
    }
}
