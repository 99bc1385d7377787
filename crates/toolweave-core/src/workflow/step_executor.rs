//! Step dispatch for all six step types.
//!
//! A step's JSON `config` is parsed into a `StepAction` at dispatch time and
//! handled by a single `match`. Tool and HTTP calls run inside the retry
//! loop; `parallel` and `loop` recurse into `execute` for their children.
//!
//! The variable scope is passed as `Arc<Value>` and never mutated: loop
//! iterations get their own copy with `loop_item`/`loop_index` injected, and
//! parallel children share the parent's scope read-only.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::task::JoinSet;
use toolweave_types::workflow::{ConditionExpr, RetryConfig, StepType, WorkflowStep};

use super::condition;
use super::retry::RetryHandler;
use super::tool::{HttpClient, HttpRequest, ToolExecutor};
use super::variables::{resolve_operand, substitute, value_to_string};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a single step failed.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    /// Missing or ill-typed step configuration. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A condition could not be evaluated (e.g. ordering a string and a number).
    #[error("condition error: {0}")]
    Condition(String),

    #[error("tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("HTTP request failed: {0}")]
    HttpFailed(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("cancelled")]
    Cancelled,
}

impl StepError {
    /// Kind name matched against `RetryConfig::retry_on_exceptions`.
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::Configuration(_) => "configuration",
            StepError::Condition(_) => "condition",
            StepError::ToolFailed { .. } => "tool",
            StepError::HttpFailed(_) => "http",
            StepError::Timeout(_) => "timeout",
            StepError::Execution(_) => "execution",
            StepError::Cancelled => "cancelled",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StepError::ToolFailed { .. }
                | StepError::HttpFailed(_)
                | StepError::Timeout(_)
                | StepError::Execution(_)
        )
    }
}

/// A step failure together with the number of times its action was invoked.
///
/// `attempts` is 0 when the step failed before anything ran (bad config).
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct StepFailure {
    pub error: StepError,
    pub attempts: u32,
}

impl StepFailure {
    pub fn new(error: StepError, attempts: u32) -> Self {
        Self { error, attempts }
    }
}

impl From<StepError> for StepFailure {
    fn from(error: StepError) -> Self {
        Self::new(error, 0)
    }
}

// ---------------------------------------------------------------------------
// Typed step configuration
// ---------------------------------------------------------------------------

const DEFAULT_MAX_ITERATIONS: usize = 100;

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_inline_type() -> StepType {
    StepType::ToolCall
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Deserialize)]
struct ToolCallConfig {
    tool_name: Value,
    #[serde(default = "empty_object")]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ParallelConfig {
    steps: Vec<InlineStep>,
}

#[derive(Debug, Deserialize)]
struct LoopConfig {
    #[serde(rename = "loop")]
    spec: LoopSpec,
}

#[derive(Debug, Deserialize)]
struct LoopSpec {
    items: Value,
    #[serde(default = "default_max_iterations")]
    max_iterations: usize,
    body: InlineStep,
    #[serde(default)]
    continue_on_error: bool,
}

#[derive(Debug, Deserialize)]
struct DelayConfig {
    delay_seconds: Value,
}

#[derive(Debug, Deserialize)]
struct HttpRequestConfig {
    url: Value,
    #[serde(default)]
    method: Option<Value>,
    #[serde(default)]
    headers: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

/// A step declared inside a `parallel` or `loop` step.
#[derive(Debug, Clone, Deserialize)]
struct InlineStep {
    #[serde(rename = "type", default = "default_inline_type")]
    step_type: StepType,
    #[serde(default = "empty_object")]
    config: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    retry_config: Option<RetryConfig>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl InlineStep {
    fn into_step(self, id: String) -> WorkflowStep {
        WorkflowStep {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            step_type: self.step_type,
            config: self.config,
            depends_on: Vec::new(),
            condition: None,
            retry_config: self.retry_config,
            timeout_secs: self.timeout_secs,
        }
    }
}

/// Parsed, typed form of a step's configuration.
#[derive(Debug)]
enum StepAction {
    ToolCall(ToolCallConfig),
    Condition(ConditionExpr),
    Parallel(ParallelConfig),
    Loop(LoopSpec),
    Delay(DelayConfig),
    HttpRequest(HttpRequestConfig),
}

impl StepAction {
    fn parse(step: &WorkflowStep) -> Result<Self, StepError> {
        let config = step.config.clone();
        let parsed = match step.step_type {
            StepType::ToolCall => serde_json::from_value(config).map(StepAction::ToolCall),
            StepType::Condition => serde_json::from_value(config).map(StepAction::Condition),
            StepType::Parallel => serde_json::from_value(config).map(StepAction::Parallel),
            StepType::Loop => {
                serde_json::from_value::<LoopConfig>(config).map(|c| StepAction::Loop(c.spec))
            }
            StepType::Delay => serde_json::from_value(config).map(StepAction::Delay),
            StepType::HttpRequest => serde_json::from_value(config).map(StepAction::HttpRequest),
        };
        parsed.map_err(|e| {
            StepError::Configuration(format!(
                "invalid {} config for step '{}': {e}",
                step.step_type, step.id
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// StepExecutor
// ---------------------------------------------------------------------------

/// The value a step produced and how many attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub result: Value,
    pub attempts: u32,
}

impl StepOutcome {
    fn once(result: Value) -> Self {
        Self {
            result,
            attempts: 1,
        }
    }
}

/// Executes individual steps against injected tool and HTTP capabilities.
///
/// Cheap to clone; clones share the same capabilities.
#[derive(Clone)]
pub struct StepExecutor {
    tools: Arc<dyn ToolExecutor>,
    http: Arc<dyn HttpClient>,
}

impl StepExecutor {
    pub fn new(tools: Arc<dyn ToolExecutor>, http: Arc<dyn HttpClient>) -> Self {
        Self { tools, http }
    }

    /// Execute one step against `scope`.
    ///
    /// `workflow_retry` is the workflow-level policy used when the step has
    /// none of its own. Boxed so that `parallel` and `loop` can recurse.
    pub fn execute<'a>(
        &'a self,
        step: &'a WorkflowStep,
        scope: Arc<Value>,
        workflow_retry: Option<&'a RetryConfig>,
    ) -> BoxFuture<'a, Result<StepOutcome, StepFailure>> {
        Box::pin(async move {
            let action = StepAction::parse(step)?;
            tracing::debug!(step_id = %step.id, step_type = %step.step_type, "dispatching step");

            match action {
                StepAction::ToolCall(config) => {
                    self.run_tool_call(step, config, &scope, workflow_retry).await
                }
                StepAction::Condition(expr) => condition::evaluate(&expr, &scope)
                    .map(|b| StepOutcome::once(Value::Bool(b)))
                    .map_err(|e| StepFailure::new(e, 1)),
                StepAction::Parallel(config) => {
                    self.run_parallel(step, config, scope, workflow_retry).await
                }
                StepAction::Loop(spec) => self.run_loop(step, spec, &scope, workflow_retry).await,
                StepAction::Delay(config) => run_delay(config, &scope).await.map_err(StepFailure::from),
                StepAction::HttpRequest(config) => {
                    self.run_http(step, config, &scope, workflow_retry).await
                }
            }
        })
    }

    async fn run_tool_call(
        &self,
        step: &WorkflowStep,
        config: ToolCallConfig,
        scope: &Value,
        workflow_retry: Option<&RetryConfig>,
    ) -> Result<StepOutcome, StepFailure> {
        let tool_name = match substitute(&config.tool_name, scope) {
            Value::String(name) if !name.is_empty() => name,
            other => {
                return Err(StepError::Configuration(format!(
                    "step '{}': tool_name must resolve to a non-empty string, got {other}",
                    step.id
                ))
                .into());
            }
        };
        let arguments = substitute(&config.arguments, scope);
        if !arguments.is_object() {
            return Err(StepError::Configuration(format!(
                "step '{}': arguments must be an object",
                step.id
            ))
            .into());
        }

        let policy = RetryHandler::effective_policy(step.retry_config.as_ref(), workflow_retry);
        let attempted = RetryHandler::run(&policy, step_timeout(step), &step.id, |attempt| {
            tracing::debug!(step_id = %step.id, tool = %tool_name, attempt, "calling tool");
            self.tools.execute_tool(&tool_name, arguments.clone())
        })
        .await;

        attempted.into_outcome()
    }

    async fn run_http(
        &self,
        step: &WorkflowStep,
        config: HttpRequestConfig,
        scope: &Value,
        workflow_retry: Option<&RetryConfig>,
    ) -> Result<StepOutcome, StepFailure> {
        let request = build_http_request(step, config, scope)?;
        let policy = RetryHandler::effective_policy(step.retry_config.as_ref(), workflow_retry);

        let attempted = RetryHandler::run(&policy, step_timeout(step), &step.id, |attempt| {
            let request = request.clone();
            async move {
                tracing::debug!(method = %request.method, url = %request.url, attempt, "sending HTTP request");
                let (method, url) = (request.method.clone(), request.url.clone());
                let response = self.http.send(request).await?;
                if !response.is_success() {
                    return Err(StepError::HttpFailed(format!(
                        "{method} {url} returned status {}",
                        response.status
                    )));
                }
                Ok(response.json_body())
            }
        })
        .await;

        attempted.into_outcome()
    }

    /// Run all children concurrently. The first failure fails the parent;
    /// siblings still in flight are detached and their results dropped.
    async fn run_parallel(
        &self,
        step: &WorkflowStep,
        config: ParallelConfig,
        scope: Arc<Value>,
        workflow_retry: Option<&RetryConfig>,
    ) -> Result<StepOutcome, StepFailure> {
        let mut join_set = JoinSet::new();
        let mut order = Vec::with_capacity(config.steps.len());

        for (n, inline) in config.steps.into_iter().enumerate() {
            let child = inline.into_step(format!("{}_sub_{n}", step.id));
            order.push(child.id.clone());

            let executor = self.clone();
            let scope = scope.clone();
            let retry = workflow_retry.cloned();
            join_set.spawn(async move {
                let outcome = executor.execute(&child, scope, retry.as_ref()).await;
                (child.id, outcome)
            });
        }

        let mut results: BTreeMap<String, Value> = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            let failure = match joined {
                Ok((child_id, Ok(outcome))) => {
                    results.insert(child_id, outcome.result);
                    continue;
                }
                Ok((child_id, Err(e))) => format!("sub-step '{child_id}' failed: {e}"),
                Err(e) => format!("sub-step task failed: {e}"),
            };
            join_set.detach_all();
            tracing::warn!(step_id = %step.id, error = %failure, "parallel step failed fast");
            return Err(StepFailure::new(StepError::Execution(failure), 1));
        }

        let mut merged = Map::new();
        for id in order {
            if let Some(value) = results.remove(&id) {
                merged.insert(id, value);
            }
        }
        Ok(StepOutcome::once(Value::Object(merged)))
    }

    /// Iterate the body over `items`, each iteration against its own scope copy.
    async fn run_loop(
        &self,
        step: &WorkflowStep,
        spec: LoopSpec,
        scope: &Value,
        workflow_retry: Option<&RetryConfig>,
    ) -> Result<StepOutcome, StepFailure> {
        let items = match resolve_operand(&spec.items, scope) {
            Value::Array(items) => items,
            other => {
                return Err(StepError::Configuration(format!(
                    "step '{}': loop items must be an array, got {other}",
                    step.id
                ))
                .into());
            }
        };

        let mut body = spec.body.into_step(format!("{}_body", step.id));
        body.retry_config = body.retry_config.or_else(|| step.retry_config.clone());
        body.timeout_secs = body.timeout_secs.or(step.timeout_secs);

        let mut results = Vec::new();
        for (index, item) in items.into_iter().take(spec.max_iterations).enumerate() {
            let iteration_scope = Arc::new(iteration_scope(scope, item, index));
            match self.execute(&body, iteration_scope, workflow_retry).await {
                Ok(outcome) => results.push(outcome.result),
                Err(e) if spec.continue_on_error => {
                    tracing::warn!(step_id = %step.id, index, error = %e, "loop iteration failed, continuing");
                }
                Err(e) => {
                    return Err(StepFailure::new(
                        StepError::Execution(format!("loop iteration {index} failed: {e}")),
                        1,
                    ));
                }
            }
        }
        Ok(StepOutcome::once(Value::Array(results)))
    }
}

fn step_timeout(step: &WorkflowStep) -> Option<Duration> {
    step.timeout_secs.map(Duration::from_secs)
}

/// Copy of `scope` with the loop variables injected.
fn iteration_scope(scope: &Value, item: Value, index: usize) -> Value {
    let mut vars = match scope {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    vars.insert("loop_item".to_string(), item);
    vars.insert("loop_index".to_string(), json!(index));
    Value::Object(vars)
}

async fn run_delay(config: DelayConfig, scope: &Value) -> Result<StepOutcome, StepError> {
    let seconds = resolve_operand(&config.delay_seconds, scope);
    let delay = seconds
        .as_f64()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .ok_or_else(|| {
            StepError::Configuration(format!(
                "delay_seconds must be a non-negative number of seconds, got {seconds}"
            ))
        })?;
    tokio::time::sleep(delay).await;
    Ok(StepOutcome::once(json!({ "delayed_seconds": seconds })))
}

fn build_http_request(
    step: &WorkflowStep,
    config: HttpRequestConfig,
    scope: &Value,
) -> Result<HttpRequest, StepError> {
    let url = match substitute(&config.url, scope) {
        Value::String(url) if !url.is_empty() => url,
        other => {
            return Err(StepError::Configuration(format!(
                "step '{}': url must resolve to a non-empty string, got {other}",
                step.id
            )));
        }
    };

    let method = match config.method.map(|m| substitute(&m, scope)) {
        None | Some(Value::Null) => "GET".to_string(),
        Some(Value::String(m)) => m.to_ascii_uppercase(),
        Some(other) => {
            return Err(StepError::Configuration(format!(
                "step '{}': method must be a string, got {other}",
                step.id
            )));
        }
    };

    let headers = match config.headers.map(|h| substitute(&h, scope)) {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(k, v)| (k, value_to_string(&v)))
            .collect(),
        Some(other) => {
            return Err(StepError::Configuration(format!(
                "step '{}': headers must be an object, got {other}",
                step.id
            )));
        }
    };

    let body = config
        .data
        .map(|d| substitute(&d, scope))
        .filter(|d| !d.is_null());

    Ok(HttpRequest {
        method,
        url,
        headers,
        body,
    })
}
