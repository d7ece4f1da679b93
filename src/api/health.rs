//! `/healthz` and `/readyz`: a status document naming the build, the host
//! and the outcome of every checked condition.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct AppInfo {
    pub name: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceInfo {
    pub name: String,
    pub os: &'static str,
    pub arch: &'static str,
}

impl InstanceInfo {
    fn current() -> Self {
        let name = match hostname::get() {
            Ok(name) => name.to_string_lossy().into_owned(),
            Err(e) => {
                tracing::warn!("hostname unavailable: {}", e);
                String::new()
            }
        };
        Self {
            name,
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        }
    }
}

static APP: AppInfo = AppInfo {
    name: env!("CARGO_PKG_NAME"),
    version: env!("CARGO_PKG_VERSION"),
};

static INSTANCE: Lazy<InstanceInfo> = Lazy::new(InstanceInfo::current);

/// Outcome of one check.
#[derive(Debug, Clone, Serialize)]
pub struct Condition {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub name: &'static str,
}

impl Condition {
    fn ok(name: &'static str) -> Self {
        Self {
            ready: true,
            message: None,
            name,
        }
    }

    fn failed(name: &'static str, message: String) -> Self {
        Self {
            ready: false,
            message: Some(message),
            name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Status {
    pub app: AppInfo,
    pub instance: InstanceInfo,
    pub status: Vec<Condition>,
}

/// 200 when every condition holds, 503 otherwise. The body is the same
/// either way.
pub fn report(conditions: Vec<Condition>) -> (StatusCode, Json<Status>) {
    let code = if conditions.iter().all(|c| c.ready) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = Status {
        app: APP.clone(),
        instance: INSTANCE.clone(),
        status: conditions,
    };
    (code, Json(body))
}

/// GET /healthz
pub async fn liveness() -> (StatusCode, Json<Status>) {
    report(vec![Condition::ok("Default")])
}

/// GET /readyz
pub async fn readiness(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Status>) {
    let mut conditions = vec![Condition::ok("Default")];
    if let Some(db) = &state.db {
        conditions.push(
            match tokio::time::timeout(state.config.request_timeout, db.ping()).await {
                Ok(Ok(())) => Condition::ok("database"),
                Ok(Err(e)) => {
                    tracing::warn!("readiness: database ping failed: {}", e);
                    Condition::failed("database", "database ping failed".into())
                }
                Err(_) => {
                    tracing::warn!("readiness: database ping timed out");
                    Condition::failed("database", "database ping timed out".into())
                }
            },
        );
    }
    report(conditions)
}
