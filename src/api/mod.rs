use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::auth::require_principal;
use crate::models::execution::Execution;
use crate::models::project::Project;
use crate::models::scenario::Scenario;
use crate::models::testplan::TestPlan;
use crate::state::AppState;

pub mod auth;
pub mod health;
pub mod resources;
pub mod users;

const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Build the management API router.
/// Routes are relative; [`app`] mounts them under `/api/v1`.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let protected = Router::new()
        .route(
            "/projects",
            get(resources::list::<Project>).post(resources::create_project),
        )
        .route(
            "/projects/:id",
            get(resources::get::<Project>)
                .put(resources::update_project)
                .delete(resources::delete::<Project>),
        )
        .route(
            "/scenarios",
            get(resources::list::<Scenario>).post(resources::create_scenario),
        )
        .route(
            "/scenarios/:id",
            get(resources::get::<Scenario>)
                .put(resources::update_scenario)
                .delete(resources::delete::<Scenario>),
        )
        .route(
            "/testplans",
            get(resources::list::<TestPlan>).post(resources::create_testplan),
        )
        .route(
            "/testplans/:id",
            get(resources::get::<TestPlan>)
                .put(resources::update_testplan)
                .delete(resources::delete::<TestPlan>),
        )
        .route(
            "/executions",
            get(resources::list::<Execution>).post(resources::create_execution),
        )
        .route(
            "/executions/:id",
            get(resources::get::<Execution>).put(resources::update_execution),
        )
        .route("/admin/users", post(users::create_user))
        .route("/admin/users/:username", get(users::get_user))
        .layer(middleware::from_fn_with_state(state, require_principal));

    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .merge(protected)
        .fallback(fallback_404)
}

/// The full service: health endpoints plus the API under `/api/v1`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints (no auth)
        .route("/healthz", get(health::liveness))
        .route("/readyz", get(health::readiness))
        .nest("/api/v1", api_router(state.clone()))
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Stamps a fresh `x-request-id` on every response.
async fn request_id_middleware(req: Request, next: Next) -> Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    // Responses carry session state; never cache them.
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
    );
    headers.remove(header::SERVER);

    resp
}
