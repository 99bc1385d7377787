//! Workflow domain types for toolweave.
//!
//! Defines the declarative workflow graph (`WorkflowDefinition`,
//! `WorkflowStep`, `RetryConfig`), the execution request accepted by the
//! orchestrator, and the execution tracking types (`WorkflowState`,
//! `StepExecutionResult`) that record what a run actually did.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A registered workflow: an ordered list of steps forming a dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// UUIDv7 assigned on registration (or supplied by the caller).
    #[serde(default = "Uuid::now_v7")]
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Version string (e.g. "1.0.0").
    #[serde(default = "default_version")]
    pub version: String,
    /// Ordered list of steps. Definition order is the tie-break order for
    /// sequential execution within a wave.
    pub steps: Vec<WorkflowStep>,
    /// The step the workflow is considered to start from.
    pub entry_point: String,
    /// Overall execution timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Retry policy applied to steps that do not carry their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_config: Option<RetryConfig>,
    /// Run each ready wave concurrently instead of one step at a time.
    #[serde(default)]
    pub parallel_execution: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Permissions a caller must hold to run this workflow (checked by the
    /// policy layer, carried here for it).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_permissions: Vec<String>,
    #[serde(default)]
    pub security_level: SecurityLevel,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Set when the workflow is soft-deleted. Deleted workflows stay
    /// readable but are excluded from listing and execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Extensible metadata for integrations.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl WorkflowDefinition {
    /// Look up a step by ID.
    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Security classification of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Public,
    #[default]
    Internal,
    Restricted,
    Confidential,
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// A single node in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step ID, unique within its workflow.
    pub id: String,
    /// Human-readable step name.
    #[serde(default)]
    pub name: String,
    /// The kind of step.
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Type-specific configuration payload. Parsed into a typed action at
    /// dispatch time; missing keys fail the step with a configuration error.
    #[serde(default = "empty_object")]
    pub config: Value,
    /// Step IDs that must be executed before this one.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Gate: the step is skipped when this evaluates false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionExpr>,
    /// Retry policy overriding the workflow-level one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_config: Option<RetryConfig>,
    /// Per-attempt timeout in seconds for tool and HTTP calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

pub(crate) fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// The kind of step in a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    ToolCall,
    Condition,
    Parallel,
    Loop,
    Delay,
    HttpRequest,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::ToolCall => "tool_call",
            StepType::Condition => "condition",
            StepType::Parallel => "parallel",
            StepType::Loop => "loop",
            StepType::Delay => "delay",
            StepType::HttpRequest => "http_request",
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A two-operand comparison evaluated against the variable scope.
///
/// Operands that are strings starting with `$` are resolved as dotted paths;
/// everything else is taken literally. The operator is kept as a string so
/// that an unsupported operator surfaces as a step configuration error rather
/// than a registration failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionExpr {
    pub operator: String,
    pub left_operand: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_operand: Option<Value>,
}

// ---------------------------------------------------------------------------
// Retry Configuration
// ---------------------------------------------------------------------------

/// Exponential backoff policy for tool and HTTP calls.
///
/// Delays are expressed in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay")]
    pub initial_delay: f64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<f64>,
    /// Error kinds eligible for retry (`tool`, `http`, `timeout`,
    /// `execution`). `None` retries every retryable kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_on_exceptions: Option<Vec<String>>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> f64 {
    1.0
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            backoff_factor: default_backoff_factor(),
            max_delay: None,
            retry_on_exceptions: None,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: 0.0,
            backoff_factor: 1.0,
            max_delay: None,
            retry_on_exceptions: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Execution request
// ---------------------------------------------------------------------------

/// A request to run a registered workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub workflow_id: Uuid,
    /// Initial variable scope. Must be a JSON object.
    #[serde(default = "empty_object")]
    pub variables: Value,
    /// Wall-clock bound for the whole run, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl ExecutionRequest {
    pub fn new(workflow_id: Uuid, variables: Value) -> Self {
        Self {
            workflow_id,
            variables,
            timeout_secs: None,
            metadata: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution status
// ---------------------------------------------------------------------------

/// Overall status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether the execution has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Status of a single step within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Rank used to enforce monotonic transitions.
    fn rank(&self) -> u8 {
        match self {
            StepStatus::Pending => 0,
            StepStatus::Running => 1,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped => 2,
        }
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        next.rank() > self.rank()
    }
}

// ---------------------------------------------------------------------------
// Execution records
// ---------------------------------------------------------------------------

/// The recorded outcome of one step in one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecutionResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock execution time in milliseconds.
    pub execution_time_ms: u64,
    /// Number of attempts made (0 for skipped steps).
    #[serde(default)]
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Full state of a workflow execution.
///
/// Owned by the running engine until the run ends, then handed to the
/// orchestrator which keeps it as a history record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default)]
    pub step_statuses: HashMap<String, StepStatus>,
    #[serde(default)]
    pub step_results: HashMap<String, StepExecutionResult>,
    /// Variable scope seeded from the execution request.
    #[serde(default = "empty_object")]
    pub variables: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl WorkflowState {
    /// Create a pending execution for `workflow_id` with the given scope.
    pub fn new(workflow_id: Uuid, variables: Value) -> Self {
        Self {
            execution_id: Uuid::now_v7(),
            workflow_id,
            status: ExecutionStatus::Pending,
            current_step: None,
            step_statuses: HashMap::new(),
            step_results: HashMap::new(),
            variables,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            metadata: HashMap::new(),
        }
    }

    /// Move a step to `status`, ignoring transitions that would go backwards.
    ///
    /// Returns `false` when the transition was rejected.
    pub fn set_step_status(&mut self, step_id: &str, status: StepStatus) -> bool {
        match self.step_statuses.get(step_id) {
            Some(current) if !current.can_transition_to(status) => false,
            _ => {
                self.step_statuses.insert(step_id.to_string(), status);
                true
            }
        }
    }

    /// Record a step's final result. A step is recorded at most once.
    pub fn record_result(&mut self, result: StepExecutionResult) -> bool {
        if self.step_results.contains_key(&result.step_id) {
            return false;
        }
        self.set_step_status(&result.step_id, result.status);
        self.step_results.insert(result.step_id.clone(), result);
        true
    }

    /// Result values keyed by step ID (skipped and failed steps omitted).
    pub fn result_map(&self) -> HashMap<String, Value> {
        self.step_results
            .iter()
            .filter_map(|(id, r)| r.result.clone().map(|v| (id.clone(), v)))
            .collect()
    }

    /// Finish the execution with a terminal status.
    pub fn finish(&mut self, status: ExecutionStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.current_step = None;
        self.completed_at = Some(Utc::now());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_workflow() -> WorkflowDefinition {
        serde_json::from_value(json!({
            "name": "enrich-ticket",
            "entry_point": "lookup",
            "parallel_execution": true,
            "retry_config": { "max_attempts": 2, "initial_delay": 0.5 },
            "steps": [
                {
                    "id": "lookup",
                    "type": "tool_call",
                    "config": { "tool_name": "crm.lookup", "arguments": { "id": "$ticket.id" } }
                },
                {
                    "id": "notify",
                    "type": "http_request",
                    "depends_on": ["lookup"],
                    "condition": { "operator": "exists", "left_operand": "$ticket.owner" },
                    "config": { "url": "https://hooks.example.com", "method": "POST" },
                    "timeout_secs": 10
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_definition_defaults_applied() {
        let def = sample_workflow();
        assert_eq!(def.version, "1.0.0");
        assert_eq!(def.security_level, SecurityLevel::Internal);
        assert!(def.parallel_execution);
        assert!(def.tags.is_empty());
        assert!(!def.is_deleted());

        let retry = def.retry_config.unwrap();
        assert_eq!(retry.max_attempts, 2);
        assert_eq!(retry.backoff_factor, 2.0);
        assert!(retry.max_delay.is_none());
    }

    #[test]
    fn test_step_type_serde_names() {
        let def = sample_workflow();
        assert_eq!(def.steps[0].step_type, StepType::ToolCall);
        assert_eq!(def.steps[1].step_type, StepType::HttpRequest);
        assert_eq!(
            serde_json::to_value(StepType::HttpRequest).unwrap(),
            json!("http_request")
        );
        assert_eq!(StepType::Loop.to_string(), "loop");
    }

    #[test]
    fn test_step_lookup() {
        let def = sample_workflow();
        assert!(def.step("notify").is_some());
        assert!(def.step("missing").is_none());
        let notify = def.step("notify").unwrap();
        assert_eq!(notify.depends_on, vec!["lookup"]);
        assert_eq!(notify.condition.as_ref().unwrap().operator, "exists");
        assert!(notify.condition.as_ref().unwrap().right_operand.is_none());
    }

    #[test]
    fn test_execution_status_terminal() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_step_status_is_monotonic() {
        let mut state = WorkflowState::new(Uuid::now_v7(), json!({}));
        assert!(state.set_step_status("a", StepStatus::Pending));
        assert!(state.set_step_status("a", StepStatus::Running));
        assert!(!state.set_step_status("a", StepStatus::Pending));
        assert!(state.set_step_status("a", StepStatus::Completed));
        assert!(!state.set_step_status("a", StepStatus::Running));
        assert_eq!(state.step_statuses["a"], StepStatus::Completed);
    }

    #[test]
    fn test_result_recorded_once() {
        let mut state = WorkflowState::new(Uuid::now_v7(), json!({}));
        let result = StepExecutionResult {
            step_id: "a".to_string(),
            status: StepStatus::Completed,
            result: Some(json!(1)),
            error: None,
            execution_time_ms: 3,
            attempts: 1,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
        };
        assert!(state.record_result(result.clone()));
        assert!(!state.record_result(result));
        assert_eq!(state.result_map().get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_finish_sets_terminal_fields() {
        let mut state = WorkflowState::new(Uuid::now_v7(), json!({}));
        state.current_step = Some("a".to_string());
        state.finish(ExecutionStatus::Failed, Some("boom".to_string()));
        assert_eq!(state.status, ExecutionStatus::Failed);
        assert_eq!(state.error.as_deref(), Some("boom"));
        assert!(state.current_step.is_none());
        assert!(state.completed_at.is_some());
    }
}
