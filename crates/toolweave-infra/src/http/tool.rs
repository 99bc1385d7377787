//! Tool executor that forwards calls to HTTP tool endpoints.
//!
//! Each tool name maps to an endpoint URL (the `[tools]` table of
//! `config.toml`). A call POSTs `{"arguments": ...}` and takes the JSON
//! response body as the tool's result.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use toolweave_core::workflow::{StepError, ToolExecutor};

/// Routes `tool_call` steps to configured HTTP endpoints.
pub struct HttpToolExecutor {
    client: reqwest::Client,
    endpoints: HashMap<String, String>,
}

impl HttpToolExecutor {
    pub fn new(client: reqwest::Client, endpoints: HashMap<String, String>) -> Self {
        Self { client, endpoints }
    }

    /// Names of every tool with a configured endpoint, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.endpoints.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ToolExecutor for HttpToolExecutor {
    fn execute_tool<'a>(
        &'a self,
        tool_name: &'a str,
        arguments: Value,
    ) -> BoxFuture<'a, Result<Value, StepError>> {
        Box::pin(async move {
            let fail = |message: String| StepError::ToolFailed {
                tool: tool_name.to_string(),
                message,
            };

            let endpoint = self
                .endpoints
                .get(tool_name)
                .ok_or_else(|| fail("no endpoint configured".to_string()))?;

            let response = self
                .client
                .post(endpoint)
                .json(&json!({ "arguments": arguments }))
                .send()
                .await
                .map_err(|e| fail(format!("request failed: {e}")))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| fail(format!("failed to read response: {e}")))?;

            if !status.is_success() {
                tracing::warn!(tool = tool_name, status = status.as_u16(), "tool endpoint returned error");
                return Err(fail(format!("endpoint returned {}: {body}", status.as_u16())));
            }

            tracing::debug!(tool = tool_name, body_len = body.len(), "tool call completed");
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn executor(endpoints: &[(&str, String)]) -> HttpToolExecutor {
        HttpToolExecutor::new(
            reqwest::Client::new(),
            endpoints
                .iter()
                .map(|(name, url)| (name.to_string(), url.clone()))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_posts_arguments_and_returns_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/search"))
            .and(body_json(json!({"arguments": {"query": "rust"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hits": 3})))
            .expect(1)
            .mount(&server)
            .await;
        let tools = executor(&[("search", format!("{}/tools/search", server.uri()))]);

        let result = tools
            .execute_tool("search", json!({"query": "rust"}))
            .await
            .unwrap();
        assert_eq!(result, json!({"hits": 3}));
    }

    #[tokio::test]
    async fn test_plain_text_and_empty_bodies() {
        let server = MockServer::start().await;
        Mock::given(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("done"))
            .mount(&server)
            .await;
        Mock::given(path("/empty"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        let tools = executor(&[
            ("text", format!("{}/text", server.uri())),
            ("empty", format!("{}/empty", server.uri())),
        ]);

        assert_eq!(tools.execute_tool("text", json!({})).await.unwrap(), json!("done"));
        assert_eq!(tools.execute_tool("empty", json!({})).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_error_status_is_tool_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string(r#"{"error":"boom"}"#))
            .expect(1)
            .mount(&server)
            .await;
        let tools = executor(&[("flaky", server.uri())]);

        let err = tools.execute_tool("flaky", json!({})).await.unwrap_err();
        match err {
            StepError::ToolFailed { tool, message } => {
                assert_eq!(tool, "flaky");
                assert!(message.contains("500"));
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_tool_failure() {
        let tools = executor(&[]);
        let err = tools.execute_tool("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, StepError::ToolFailed { ref tool, .. } if tool == "missing"));
        assert_eq!(err.kind(), "tool");
    }

    #[test]
    fn test_tool_names_sorted() {
        let tools = executor(&[
            ("b", "http://b".to_string()),
            ("a", "http://a".to_string()),
        ]);
        assert_eq!(tools.tool_names(), vec!["a", "b"]);
    }
}
