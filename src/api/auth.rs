use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::password;
use crate::errors::AppError;
use crate::middleware::auth::{auth_cookie, cleared_cookie, token_from_headers};
use crate::state::AppState;

const BAD_CREDENTIALS: &str = "invalid username or password";

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

/// POST /api/v1/login
///
/// Sets the `auth-token` cookie on success. Unknown users and wrong
/// passwords get the same 401.
pub async fn login(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(creds) =
        body.map_err(|e| AppError::Validation(format!("invalid login body: {}", e.body_text())))?;
    if creds.username.is_empty() || creds.password.is_empty() {
        return Err(AppError::Validation(
            "username and password are mandatory parameters".into(),
        ));
    }

    let stored = state
        .bounded(state.users.password_hash(&creds.username))
        .await?;
    let Some(stored) = stored else {
        tracing::info!(username = %creds.username, "login rejected: unknown user");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS));
    };

    let candidate = creds.password;
    let matches =
        tokio::task::spawn_blocking(move || password::verify_password(&stored, &candidate))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("password check panicked: {}", e)))?;
    if !matches {
        tracing::info!(username = %creds.username, "login rejected: wrong password");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS));
    }

    let issued = state.authorizer.generate(&creds.username).await?;
    let cookie = auth_cookie(&issued)?;
    tracing::info!(
        username = %creds.username,
        scheme = state.authorizer.scheme(),
        "login succeeded"
    );

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    let body = LoginResponse {
        username: creds.username,
        expires_at: issued.expires_at,
    };
    Ok((StatusCode::OK, headers, Json(body)).into_response())
}

/// POST /api/v1/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = token_from_headers(&headers)?
        .ok_or(AppError::Unauthorized("missing auth-token cookie"))?;
    state.authorizer.invalidate(&token).await?;
    tracing::debug!("token invalidated on logout");

    let mut out = HeaderMap::new();
    out.insert(SET_COOKIE, cleared_cookie());
    Ok((StatusCode::OK, out).into_response())
}
