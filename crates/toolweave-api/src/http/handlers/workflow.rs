//! Workflow definition CRUD and execution trigger handlers.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use toolweave_types::workflow::{ExecutionRequest, WorkflowDefinition, WorkflowState};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Body of `POST /workflows/{id}/execute`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteBody {
    #[serde(default)]
    pub variables: Option<Value>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteQuery {
    /// Block until the execution finishes and return its record.
    #[serde(default)]
    pub wait: bool,
}

fn workflow_link(id: &Uuid) -> String {
    format!("/api/v1/workflows/{id}")
}

/// POST /api/v1/workflows
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<WorkflowDefinition>,
) -> Result<ApiResponse<WorkflowDefinition>, AppError> {
    let timer = RequestTimer::start();
    let def = state.orchestrator.register(body).await?;
    let link = workflow_link(&def.id);
    Ok(timer
        .ok(def)
        .with_status(StatusCode::CREATED)
        .with_link("self", &link))
}

/// GET /api/v1/workflows
pub async fn list_workflows(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<WorkflowDefinition>>, AppError> {
    let timer = RequestTimer::start();
    let defs = state.orchestrator.list().await?;
    Ok(timer.ok(defs).with_link("self", "/api/v1/workflows"))
}

/// GET /api/v1/workflows/{id}
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<WorkflowDefinition>, AppError> {
    let timer = RequestTimer::start();
    let def = state.orchestrator.get(id).await?;
    Ok(timer
        .ok(def)
        .with_link("self", &workflow_link(&id))
        .with_link("executions", &format!("/api/v1/executions?workflow_id={id}")))
}

/// PUT /api/v1/workflows/{id}
pub async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<WorkflowDefinition>,
) -> Result<ApiResponse<WorkflowDefinition>, AppError> {
    let timer = RequestTimer::start();
    let def = state.orchestrator.update(id, body).await?;
    Ok(timer.ok(def).with_link("self", &workflow_link(&id)))
}

/// DELETE /api/v1/workflows/{id}
pub async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    let timer = RequestTimer::start();
    state.orchestrator.delete(id).await?;
    Ok(timer.ok(json!({ "deleted": true, "id": id })))
}

/// POST /api/v1/workflows/{id}/execute
///
/// Starts the execution in the background and answers 202 with its ID,
/// or with `?wait=true` answers 200 with the finished record.
pub async fn execute_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ExecuteQuery>,
    body: Option<Json<ExecuteBody>>,
) -> Result<Response, AppError> {
    let timer = RequestTimer::start();
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let mut request = ExecutionRequest::new(id, body.variables.unwrap_or_else(|| json!({})));
    request.timeout_secs = body.timeout_secs;
    request.metadata = body.metadata;

    if query.wait {
        let record: WorkflowState = state.orchestrator.execute(request).await?;
        let link = format!("/api/v1/executions/{}", record.execution_id);
        return Ok(timer.ok(record).with_link("self", &link).into_response());
    }

    let execution_id = state.orchestrator.start(request).await?;
    let link = format!("/api/v1/executions/{execution_id}");
    Ok(timer
        .ok(json!({ "execution_id": execution_id, "workflow_id": id, "status": "running" }))
        .with_status(StatusCode::ACCEPTED)
        .with_link("self", &link)
        .with_link("cancel", &format!("{link}/cancel"))
        .into_response())
}
