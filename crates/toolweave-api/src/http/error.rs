//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use toolweave_core::workflow::OrchestratorError;

use super::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Orchestrator(OrchestratorError),
    /// Malformed request input caught before reaching the orchestrator.
    Validation(String),
}

impl From<OrchestratorError> for AppError {
    fn from(e: OrchestratorError) -> Self {
        AppError::Orchestrator(e)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Orchestrator(e) => {
                let (status, code) = match e {
                    OrchestratorError::WorkflowNotFound(_) => {
                        (StatusCode::NOT_FOUND, "WORKFLOW_NOT_FOUND")
                    }
                    OrchestratorError::ExecutionNotFound(_) => {
                        (StatusCode::NOT_FOUND, "EXECUTION_NOT_FOUND")
                    }
                    OrchestratorError::AlreadyExists(_) => (StatusCode::CONFLICT, "CONFLICT"),
                    OrchestratorError::InvalidRequest(_) => {
                        (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
                    }
                    OrchestratorError::Workflow(_) => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_WORKFLOW")
                    }
                    OrchestratorError::Repository(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
                    }
                };
                (status, code, e.to_string())
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        }

        ApiResponse::error(code, &message, uuid::Uuid::now_v7().to_string(), 0)
            .with_status(status)
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolweave_core::workflow::WorkflowError;
    use toolweave_types::error::RepositoryError;
    use uuid::Uuid;

    fn status_of(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn orchestrator_errors_map_to_status_codes() {
        let id = Uuid::now_v7();
        assert_eq!(status_of(OrchestratorError::WorkflowNotFound(id)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(OrchestratorError::ExecutionNotFound(id)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(OrchestratorError::AlreadyExists(id)), StatusCode::CONFLICT);
        assert_eq!(
            status_of(OrchestratorError::InvalidRequest("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(OrchestratorError::Workflow(WorkflowError::CycleDetected(
                "a -> b -> a".into()
            ))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(OrchestratorError::Repository(RepositoryError::Connection)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validation_error_is_bad_request() {
        assert_eq!(
            AppError::Validation("limit too large".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
