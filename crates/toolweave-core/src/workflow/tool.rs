//! Outbound capabilities consumed by the step executor.
//!
//! The engine never talks to tools or the network directly. Callers inject
//! a `ToolExecutor` (typically backed by the tool registry) and an
//! `HttpClient`; both are object-safe so they can be shared as `Arc<dyn _>`
//! across spawned tasks.

use std::collections::BTreeMap;

use futures_util::future::BoxFuture;
use serde_json::Value;

use super::step_executor::StepError;

/// Executes a named tool with JSON arguments.
pub trait ToolExecutor: Send + Sync {
    fn execute_tool<'a>(
        &'a self,
        tool_name: &'a str,
        arguments: Value,
    ) -> BoxFuture<'a, Result<Value, StepError>>;
}

/// A fully resolved outbound HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Upper-case method name (`GET`, `POST`, ...).
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// JSON body, sent only when present.
    pub body: Option<Value>,
}

/// Raw response from an `HttpClient`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body as JSON, or as a JSON string when it is not valid JSON.
    /// An empty body is `null`.
    pub fn json_body(&self) -> Value {
        if self.body.trim().is_empty() {
            return Value::Null;
        }
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }
}

/// Issues outbound HTTP requests.
///
/// Transport failures map to `StepError::HttpFailed`; non-2xx statuses are
/// returned as responses and judged by the caller.
pub trait HttpClient: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, StepError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_success_range() {
        assert!(response(200, "").is_success());
        assert!(response(204, "").is_success());
        assert!(!response(302, "").is_success());
        assert!(!response(500, "").is_success());
    }

    #[test]
    fn test_json_body_parsing() {
        assert_eq!(response(200, r#"{"ok":true}"#).json_body(), json!({"ok": true}));
        assert_eq!(response(200, "plain text").json_body(), json!("plain text"));
        assert_eq!(response(204, "  ").json_body(), Value::Null);
    }
}
