//! Builders and mock capabilities shared by the workflow unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use toolweave_types::workflow::{SecurityLevel, StepType, WorkflowDefinition, WorkflowStep};
use uuid::Uuid;

use super::step_executor::StepError;
use super::tool::{HttpClient, HttpRequest, HttpResponse, ToolExecutor};

pub(crate) fn workflow(steps: Vec<WorkflowStep>) -> WorkflowDefinition {
    let entry_point = steps.first().map(|s| s.id.clone()).unwrap_or_default();
    WorkflowDefinition {
        id: Uuid::now_v7(),
        name: "test-wf".to_string(),
        description: None,
        version: "1.0.0".to_string(),
        steps,
        entry_point,
        timeout_secs: None,
        retry_config: None,
        parallel_execution: false,
        tags: vec![],
        categories: vec![],
        required_permissions: vec![],
        security_level: SecurityLevel::Internal,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        deleted_at: None,
        metadata: HashMap::new(),
    }
}

pub(crate) fn step(id: &str, step_type: StepType, config: Value, deps: &[&str]) -> WorkflowStep {
    WorkflowStep {
        id: id.to_string(),
        name: id.to_string(),
        step_type,
        config,
        depends_on: deps.iter().map(|d| d.to_string()).collect(),
        condition: None,
        retry_config: None,
        timeout_secs: None,
    }
}

pub(crate) fn delay_step(id: &str, deps: &[&str]) -> WorkflowStep {
    step(id, StepType::Delay, json!({ "delay_seconds": 0 }), deps)
}

pub(crate) fn tool_step(id: &str, tool: &str, deps: &[&str]) -> WorkflowStep {
    step(
        id,
        StepType::ToolCall,
        json!({ "tool_name": tool, "arguments": {} }),
        deps,
    )
}

type ToolHandler = dyn Fn(&str, &Value, u32) -> Result<Value, StepError> + Send + Sync;

/// Scripted tool executor. The handler receives the tool name, the
/// substituted arguments, and the 0-based index of the call.
pub(crate) struct MockTools {
    handler: Box<ToolHandler>,
    latency: HashMap<String, Duration>,
    calls: AtomicU32,
    log: Mutex<Vec<(String, Value)>>,
}

impl MockTools {
    pub(crate) fn new(
        handler: impl Fn(&str, &Value, u32) -> Result<Value, StepError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            latency: HashMap::new(),
            calls: AtomicU32::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Returns `{"tool": name, "arguments": args}` for every call.
    pub(crate) fn echo() -> Self {
        Self::new(|name, args, _| Ok(json!({ "tool": name, "arguments": args })))
    }

    pub(crate) fn with_latency(mut self, tool: &str, latency: Duration) -> Self {
        self.latency.insert(tool.to_string(), latency);
        self
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn calls_for(&self, tool: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == tool)
            .count()
    }

    pub(crate) fn log(&self) -> Vec<(String, Value)> {
        self.log.lock().unwrap().clone()
    }
}

impl ToolExecutor for MockTools {
    fn execute_tool<'a>(
        &'a self,
        tool_name: &'a str,
        arguments: Value,
    ) -> BoxFuture<'a, Result<Value, StepError>> {
        Box::pin(async move {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            self.log
                .lock()
                .unwrap()
                .push((tool_name.to_string(), arguments.clone()));
            if let Some(latency) = self.latency.get(tool_name) {
                tokio::time::sleep(*latency).await;
            }
            (self.handler)(tool_name, &arguments, index)
        })
    }
}

pub(crate) fn tool_failure(tool: &str, message: &str) -> StepError {
    StepError::ToolFailed {
        tool: tool.to_string(),
        message: message.to_string(),
    }
}

/// HTTP client that replays queued responses, then answers `200 {}`.
#[derive(Default)]
pub(crate) struct MockHttp {
    responses: Mutex<VecDeque<Result<HttpResponse, StepError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttp {
    pub(crate) fn with_responses(responses: Vec<Result<HttpResponse, StepError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpClient for MockHttp {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, StepError>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(HttpResponse {
                    status: 200,
                    body: "{}".to_string(),
                })
            })
        })
    }
}
