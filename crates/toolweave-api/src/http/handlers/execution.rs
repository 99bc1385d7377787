//! Execution status, cancellation, and history handlers.

use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use toolweave_types::workflow::WorkflowState;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

const MAX_HISTORY_LIMIT: u32 = 1000;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub workflow_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    20
}

fn execution_link(id: &Uuid) -> String {
    format!("/api/v1/executions/{id}")
}

/// GET /api/v1/executions/{id}
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<WorkflowState>, AppError> {
    let timer = RequestTimer::start();
    let record = state.orchestrator.get_status(id).await?;
    let workflow_link = format!("/api/v1/workflows/{}", record.workflow_id);
    Ok(timer
        .ok(record)
        .with_link("self", &execution_link(&id))
        .with_link("workflow", &workflow_link))
}

/// POST /api/v1/executions/{id}/cancel
pub async fn cancel_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<WorkflowState>, AppError> {
    let timer = RequestTimer::start();
    let record = state.orchestrator.cancel(id).await?;
    Ok(timer.ok(record).with_link("self", &execution_link(&id)))
}

/// GET /api/v1/executions?workflow_id=&limit=
pub async fn list_executions(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<ApiResponse<Vec<WorkflowState>>, AppError> {
    let timer = RequestTimer::start();
    if query.limit == 0 || query.limit > MAX_HISTORY_LIMIT {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_HISTORY_LIMIT}"
        )));
    }
    let records = state
        .orchestrator
        .history(query.workflow_id, query.limit)
        .await?;
    Ok(timer.ok(records).with_link("self", "/api/v1/executions"))
}

/// GET /api/v1/executions/active
pub async fn list_active(State(state): State<AppState>) -> ApiResponse<Vec<WorkflowState>> {
    RequestTimer::start()
        .ok(state.orchestrator.active())
        .with_link("self", "/api/v1/executions/active")
}
