//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`; `/health` is also served at the root.
//! Middleware: CORS, request tracing.

use axum::routing::{get, post};
use axum::{Json, Router};
use axum::extract::State;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers::{execution, workflow};
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/workflows",
            post(workflow::create_workflow).get(workflow::list_workflows),
        )
        .route(
            "/workflows/{id}",
            get(workflow::get_workflow)
                .put(workflow::update_workflow)
                .delete(workflow::delete_workflow),
        )
        .route("/workflows/{id}/execute", post(workflow::execute_workflow))
        .route("/executions", get(execution::list_executions))
        .route("/executions/active", get(execution::list_active))
        .route("/executions/{id}", get(execution::get_execution))
        .route("/executions/{id}/cancel", post(execution::cancel_execution))
        .route("/health", get(health_check));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_executions": state.orchestrator.active().len(),
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use toolweave_infra::sqlite::DatabasePool;
    use toolweave_types::config::GlobalConfig;

    use super::*;

    async fn test_app(dir: &tempfile::TempDir) -> Router {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("api.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        build_router(AppState::with_pool(pool, GlobalConfig::default()).unwrap())
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn delay_workflow() -> Value {
        json!({
            "name": "two-delays",
            "entry_point": "first",
            "steps": [
                { "id": "first", "name": "First", "type": "delay", "config": { "delay_seconds": 0 } },
                { "id": "second", "name": "Second", "type": "delay",
                  "config": { "delay_seconds": 0 }, "depends_on": ["first"] }
            ]
        })
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir).await;
        for uri in ["/health", "/api/v1/health"] {
            let (status, body) = call(&app, "GET", uri, None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "ok");
            assert_eq!(body["active_executions"], 0);
        }
    }

    #[tokio::test]
    async fn workflow_crud_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir).await;

        let (status, created) = call(&app, "POST", "/api/v1/workflows", Some(delay_workflow())).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(created["_links"]["self"], format!("/api/v1/workflows/{id}"));

        let (status, listed) = call(&app, "GET", "/api/v1/workflows", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["data"].as_array().unwrap().len(), 1);

        let mut updated = delay_workflow();
        updated["version"] = json!("2.0.0");
        let (status, body) = call(&app, "PUT", &format!("/api/v1/workflows/{id}"), Some(updated)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["version"], "2.0.0");

        let (status, _) = call(&app, "DELETE", &format!("/api/v1/workflows/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, listed) = call(&app, "GET", "/api/v1/workflows", None).await;
        assert!(listed["data"].as_array().unwrap().is_empty());

        let (status, body) = call(&app, "DELETE", &format!("/api/v1/workflows/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"][0]["code"], "WORKFLOW_NOT_FOUND");
    }

    #[tokio::test]
    async fn invalid_workflow_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir).await;

        let cyclic = json!({
            "name": "cyclic",
            "entry_point": "a",
            "steps": [
                { "id": "a", "name": "A", "type": "delay", "config": {}, "depends_on": ["b"] },
                { "id": "b", "name": "B", "type": "delay", "config": {}, "depends_on": ["a"] }
            ]
        });
        let (status, body) = call(&app, "POST", "/api/v1/workflows", Some(cyclic)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"][0]["code"], "INVALID_WORKFLOW");
    }

    #[tokio::test]
    async fn execute_and_wait_returns_record() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir).await;

        let (_, created) = call(&app, "POST", "/api/v1/workflows", Some(delay_workflow())).await;
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/v1/workflows/{id}/execute?wait=true"),
            Some(json!({ "variables": { "who": "api" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "completed");
        assert_eq!(body["data"]["step_statuses"]["second"], "completed");
        let execution_id = body["data"]["execution_id"].as_str().unwrap().to_string();

        let (status, fetched) = call(&app, "GET", &format!("/api/v1/executions/{execution_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["data"]["variables"]["who"], "api");

        let (status, history) = call(
            &app,
            "GET",
            &format!("/api/v1/executions?workflow_id={id}&limit=5"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn execute_in_background_returns_handle() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir).await;

        let (_, created) = call(&app, "POST", "/api/v1/workflows", Some(delay_workflow())).await;
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(&app, "POST", &format!("/api/v1/workflows/{id}/execute"), None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let execution_id = body["data"]["execution_id"].as_str().unwrap().to_string();

        let mut final_status = Value::Null;
        for _ in 0..100 {
            let (_, record) = call(&app, "GET", &format!("/api/v1/executions/{execution_id}"), None).await;
            final_status = record["data"]["status"].clone();
            if final_status == "completed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(final_status, "completed");

        let (status, active) = call(&app, "GET", "/api/v1/executions/active", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(active["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_execution_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir).await;
        let missing = uuid::Uuid::now_v7();

        let (status, body) = call(&app, "GET", &format!("/api/v1/executions/{missing}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"][0]["code"], "EXECUTION_NOT_FOUND");

        let (status, _) = call(&app, "POST", &format!("/api/v1/executions/{missing}/cancel"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_limit_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir).await;
        let (status, body) = call(&app, "GET", "/api/v1/executions?limit=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");
    }
}
