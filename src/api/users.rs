use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::auth::{password, Principal};
use crate::errors::AppError;
use crate::models::user::{NewUser, UserView};
use crate::state::AppState;

/// POST /api/v1/admin/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<UserView>), AppError> {
    let Json(user) =
        body.map_err(|e| AppError::Validation(format!("invalid user body: {}", e.body_text())))?;
    user.validate()?;

    let plain = user.password.clone();
    let hash = tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing panicked: {}", e)))??;

    state.bounded(state.users.create_user(&user, &hash)).await?;
    tracing::info!(username = %user.username, created_by = %principal, "user created");
    Ok((StatusCode::CREATED, Json(UserView::from(&user))))
}

/// GET /api/v1/admin/users/:username
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<UserView>, AppError> {
    let user = state.bounded(state.users.get_user(&username)).await?;
    Ok(Json(user))
}
