//! CRUD handlers for the document-backed resources.
//!
//! List, get and delete are generic over [`Stored`]; create and update are
//! per resource because each validates a different set of references.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::auth::Principal;
use crate::errors::AppError;
use crate::models::execution::Execution;
use crate::models::project::Project;
use crate::models::scenario::Scenario;
use crate::models::testplan::TestPlan;
use crate::models::Resource;
use crate::query::{self, ListParams};
use crate::state::AppState;
use crate::store::{Collection, StoreError};

/// A resource with a collection in [`AppState`].
pub trait Stored: Resource + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn collection(state: &AppState) -> &Collection<Self>;
}

impl Stored for Project {
    fn collection(state: &AppState) -> &Collection<Self> {
        &state.projects
    }
}

impl Stored for Scenario {
    fn collection(state: &AppState) -> &Collection<Self> {
        &state.scenarios
    }
}

impl Stored for TestPlan {
    fn collection(state: &AppState) -> &Collection<Self> {
        &state.testplans
    }
}

impl Stored for Execution {
    fn collection(state: &AppState) -> &Collection<Self> {
        &state.executions
    }
}

/// Collection response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemList<T> {
    pub count: usize,
    pub total_count: usize,
    pub start_index: usize,
    /// `-1` for an empty page.
    pub end_index: i64,
    pub items: Vec<T>,
}

impl<T> ItemList<T> {
    pub fn new(items: Vec<T>) -> Self {
        let count = items.len();
        Self {
            count,
            total_count: count,
            start_index: 0,
            end_index: count as i64 - 1,
            items,
        }
    }
}

fn decode<T: Resource>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    match body {
        Ok(Json(item)) => Ok(item),
        Err(rejection) => Err(AppError::Validation(format!(
            "invalid {} body: {}",
            T::KIND,
            rejection.body_text()
        ))),
    }
}

/// Fetch a referenced resource, turning a miss into a client error.
async fn referenced<T: Stored>(state: &AppState, id: &str) -> Result<T, AppError> {
    match T::collection(state).get(id).await {
        Ok(item) => Ok(item),
        Err(StoreError::NotFound) => Err(AppError::Validation(format!(
            "a {} with the provided ID does not exist",
            T::KIND
        ))),
        Err(e) => Err(e.into()),
    }
}

async fn insert<T: Stored>(
    state: &AppState,
    principal: &Principal,
    mut item: T,
) -> Result<(StatusCode, Json<T>), AppError> {
    let identity = state.identities.new_identity(principal.as_str(), T::KIND);
    let id = identity.id.clone();
    item.set_identity(identity);
    T::collection(state).add(&item).await?;
    tracing::info!(kind = T::KIND, id = %id, created_by = %principal, "resource created");
    Ok((StatusCode::CREATED, Json(item)))
}

/// Store `item` in place of `id`, carrying the existing identity forward.
async fn replace<T: Stored>(
    state: &AppState,
    principal: &Principal,
    id: &str,
    mut item: T,
) -> Result<Json<T>, AppError> {
    let existing = T::collection(state).get(id).await?;
    let mut identity = existing.identity().cloned().ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("stored {} {} has no identity", T::KIND, id))
    })?;
    state.identities.touch(principal.as_str(), &mut identity);
    item.set_identity(identity);
    T::collection(state).update(&item).await?;
    tracing::info!(kind = T::KIND, id = %id, updated_by = %principal, "resource updated");
    Ok(Json(item))
}

/// GET /api/v1/{collection}
pub async fn list<T: Stored>(
    State(state): State<Arc<AppState>>,
    params: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<ItemList<T>>, AppError> {
    let Query(pairs) = params.map_err(|e| AppError::Validation(e.body_text()))?;
    let query = query::compile(&ListParams::from_pairs(pairs))?;
    let items = T::collection(&state).list(&query).await?;
    Ok(Json(ItemList::new(items)))
}

/// GET /api/v1/{collection}/:id
pub async fn get<T: Stored>(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<T>, AppError> {
    Ok(Json(T::collection(&state).get(&id).await?))
}

/// DELETE /api/v1/{collection}/:id
pub async fn delete<T: Stored>(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    T::collection(&state).delete(&id).await?;
    tracing::info!(kind = T::KIND, id = %id, deleted_by = %principal, "resource deleted");
    Ok(Json(json!({ "item": id })))
}

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<Project>, JsonRejection>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    let project = decode(body)?;
    project.validate()?;
    insert(&state, &principal, project).await
}

pub async fn update_project(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Result<Json<Project>, JsonRejection>,
) -> Result<Json<Project>, AppError> {
    let project = decode(body)?;
    project.validate()?;
    replace(&state, &principal, &id, project).await
}

pub async fn create_scenario(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<Scenario>, JsonRejection>,
) -> Result<(StatusCode, Json<Scenario>), AppError> {
    let scenario = decode(body)?;
    scenario.validate()?;
    referenced::<Project>(&state, &scenario.project_id).await?;
    insert(&state, &principal, scenario).await
}

pub async fn update_scenario(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Result<Json<Scenario>, JsonRejection>,
) -> Result<Json<Scenario>, AppError> {
    let scenario = decode(body)?;
    scenario.validate()?;
    referenced::<Project>(&state, &scenario.project_id).await?;
    replace(&state, &principal, &id, scenario).await
}

pub async fn create_testplan(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<TestPlan>, JsonRejection>,
) -> Result<(StatusCode, Json<TestPlan>), AppError> {
    let testplan = decode(body)?;
    testplan.validate()?;
    referenced::<Project>(&state, &testplan.project_id).await?;
    insert(&state, &principal, testplan).await
}

pub async fn update_testplan(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Result<Json<TestPlan>, JsonRejection>,
) -> Result<Json<TestPlan>, AppError> {
    let testplan = decode(body)?;
    testplan.validate()?;
    referenced::<Project>(&state, &testplan.project_id).await?;
    replace(&state, &principal, &id, testplan).await
}

/// Steps are copied from the scenario and start out pending.
pub async fn create_execution(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<Execution>, JsonRejection>,
) -> Result<(StatusCode, Json<Execution>), AppError> {
    let mut execution = decode(body)?;
    execution.validate()?;
    referenced::<Project>(&state, &execution.project_id).await?;
    referenced::<TestPlan>(&state, &execution.testplan_id).await?;
    let scenario = referenced::<Scenario>(&state, &execution.scenario_id).await?;

    if execution.name.is_empty() {
        execution.name = scenario.name.clone();
    }
    execution.populate_steps(&scenario.steps);
    insert(&state, &principal, execution).await
}

/// Merge reported results into the stored run.
pub async fn update_execution(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Result<Json<Execution>, JsonRejection>,
) -> Result<Json<Execution>, AppError> {
    let report = decode(body)?;
    report.validate()?;
    referenced::<Project>(&state, &report.project_id).await?;
    referenced::<Scenario>(&state, &report.scenario_id).await?;
    referenced::<TestPlan>(&state, &report.testplan_id).await?;

    let mut execution = state.executions.get(&id).await?;
    execution.apply_results(&report);
    replace(&state, &principal, &id, execution).await
}
