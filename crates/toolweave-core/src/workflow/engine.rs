//! Wave-based workflow scheduler.
//!
//! The `WorkflowEngine` drives one execution through its dependency graph.
//! Each iteration computes the ready set (unexecuted steps whose dependencies
//! have all been executed), runs it as a wave, records the results, and
//! repeats until every step has been executed or one fails.
//!
//! # Execution flow
//!
//! 1. Validate the definition and mark every step PENDING.
//! 2. Check the cancellation token; stop before starting a new wave if set.
//! 3. Compute the ready set in definition order. An empty set with steps
//!    remaining is a deadlock.
//! 4. Gate each ready step on its `condition`; false means SKIPPED, which
//!    still counts as executed so dependents can proceed.
//! 5. Run the wave concurrently (`parallel_execution`) or one step at a time.
//!    The first failure fails the execution.
//!
//! Steps see the request variables plus a `steps` object holding the results
//! of every step completed in earlier waves (`$steps.fetch.items`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use toolweave_types::event::WorkflowEvent;
use toolweave_types::workflow::{
    ExecutionStatus, StepExecutionResult, StepStatus, WorkflowDefinition, WorkflowState,
    WorkflowStep,
};

use crate::event::EventBus;

use super::condition;
use super::definition::WorkflowError;
use super::step_executor::{StepError, StepExecutor, StepFailure, StepOutcome};
use super::validator::validate_workflow;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Why an execution did not complete.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Structural problem with the definition (including deadlock).
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// A step failed during execution.
    #[error("step '{step_id}' failed: {error}")]
    StepFailed { step_id: String, error: String },

    /// Workflow exceeded its overall timeout.
    #[error("workflow timed out")]
    WorkflowTimeout,

    /// Workflow execution was cancelled.
    #[error("workflow cancelled")]
    Cancelled,
}

/// Callback invoked with a snapshot of the state after every step transition.
pub type ProgressFn<'a> = dyn Fn(&WorkflowState) + Send + Sync + 'a;

type StepTaskOutput = (String, DateTime<Utc>, Duration, Result<StepOutcome, StepFailure>);

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Runs workflow executions wave by wave.
#[derive(Clone)]
pub struct WorkflowEngine {
    executor: StepExecutor,
    event_bus: EventBus,
}

impl WorkflowEngine {
    pub fn new(executor: StepExecutor, event_bus: EventBus) -> Self {
        Self {
            executor,
            event_bus,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Execute `definition`, recording progress into `state`.
    ///
    /// On success every step is COMPLETED or SKIPPED. The terminal execution
    /// status is left for the caller to set, since timeouts and cancellation
    /// are decided outside this call.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        state: &mut WorkflowState,
        cancel_token: &CancellationToken,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<(), EngineError> {
        validate_workflow(definition)?;

        let execution_id = state.execution_id;
        state.status = ExecutionStatus::Running;
        for step in &definition.steps {
            state.set_step_status(&step.id, StepStatus::Pending);
        }
        self.event_bus.publish(WorkflowEvent::ExecutionStarted {
            execution_id,
            workflow_id: definition.id,
            workflow_name: definition.name.clone(),
        });
        tracing::info!(
            %execution_id,
            workflow_id = %definition.id,
            workflow = %definition.name,
            steps = definition.steps.len(),
            parallel = definition.parallel_execution,
            "workflow execution started"
        );

        let mut executed: HashSet<String> = HashSet::new();
        let mut wave = 0usize;

        while executed.len() < definition.steps.len() {
            if cancel_token.is_cancelled() {
                tracing::info!(%execution_id, wave, "cancellation requested, not starting wave");
                return Err(EngineError::Cancelled);
            }

            let ready: Vec<&WorkflowStep> = definition
                .steps
                .iter()
                .filter(|s| !executed.contains(&s.id))
                .filter(|s| s.depends_on.iter().all(|d| executed.contains(d)))
                .collect();

            if ready.is_empty() {
                let remaining: Vec<&str> = definition
                    .steps
                    .iter()
                    .filter(|s| !executed.contains(&s.id))
                    .map(|s| s.id.as_str())
                    .collect();
                return Err(WorkflowError::Deadlock(remaining.join(", ")).into());
            }

            tracing::debug!(
                %execution_id,
                wave,
                steps = ready.len(),
                "processing wave"
            );

            let scope = Arc::new(build_scope(state));
            if definition.parallel_execution {
                self.run_wave_parallel(definition, &ready, state, scope, on_progress)
                    .await?;
            } else {
                self.run_wave_sequential(definition, &ready, state, scope, on_progress)
                    .await?;
            }

            executed.extend(ready.iter().map(|s| s.id.clone()));
            wave += 1;
        }

        state.current_step = None;
        Ok(())
    }

    async fn run_wave_sequential(
        &self,
        definition: &WorkflowDefinition,
        ready: &[&WorkflowStep],
        state: &mut WorkflowState,
        scope: Arc<Value>,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<(), EngineError> {
        for step in ready {
            if !self.gate(step, state, &scope, on_progress)? {
                continue;
            }
            self.mark_running(step, state, on_progress);

            let started_at = Utc::now();
            let clock = tokio::time::Instant::now();
            let outcome = self
                .executor
                .execute(step, scope.clone(), definition.retry_config.as_ref())
                .await;
            self.record(state, step.id.clone(), started_at, clock.elapsed(), outcome, on_progress)?;
        }
        Ok(())
    }

    /// Spawn every runnable step of the wave and collect results as they
    /// finish. On the first failure, including a condition that cannot be
    /// evaluated, the tasks already spawned are detached rather than aborted;
    /// their results are never recorded.
    async fn run_wave_parallel(
        &self,
        definition: &WorkflowDefinition,
        ready: &[&WorkflowStep],
        state: &mut WorkflowState,
        scope: Arc<Value>,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<(), EngineError> {
        let mut join_set: JoinSet<StepTaskOutput> = JoinSet::new();
        let mut task_steps: HashMap<tokio::task::Id, String> = HashMap::new();

        for step in ready {
            match self.gate(step, state, &scope, on_progress) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    join_set.detach_all();
                    return Err(e);
                }
            }
            self.mark_running(step, state, on_progress);

            let step = (*step).clone();
            let executor = self.executor.clone();
            let scope = scope.clone();
            let retry = definition.retry_config.clone();
            let step_id = step.id.clone();

            let handle = join_set.spawn(async move {
                let started_at = Utc::now();
                let clock = tokio::time::Instant::now();
                let outcome = executor.execute(&step, scope, retry.as_ref()).await;
                (step.id, started_at, clock.elapsed(), outcome)
            });
            task_steps.insert(handle.id(), step_id);
        }

        while let Some(joined) = join_set.join_next().await {
            let recorded = match joined {
                Ok((step_id, started_at, elapsed, outcome)) => {
                    self.record(state, step_id, started_at, elapsed, outcome, on_progress)
                }
                Err(join_err) => {
                    let step_id = task_steps
                        .get(&join_err.id())
                        .cloned()
                        .unwrap_or_else(|| "<unknown>".to_string());
                    let outcome = Err(StepFailure::new(
                        StepError::Execution(format!("task failed: {join_err}")),
                        1,
                    ));
                    self.record(state, step_id, Utc::now(), Duration::ZERO, outcome, on_progress)
                }
            };
            if let Err(e) = recorded {
                join_set.detach_all();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Evaluate the step's condition. Returns `Ok(false)` after recording a
    /// skip; an evaluation error fails the step.
    fn gate(
        &self,
        step: &WorkflowStep,
        state: &mut WorkflowState,
        scope: &Value,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<bool, EngineError> {
        let Some(expr) = &step.condition else {
            return Ok(true);
        };
        match condition::evaluate(expr, scope) {
            Ok(true) => Ok(true),
            Ok(false) => {
                let now = Utc::now();
                state.record_result(StepExecutionResult {
                    step_id: step.id.clone(),
                    status: StepStatus::Skipped,
                    result: None,
                    error: None,
                    execution_time_ms: 0,
                    attempts: 0,
                    started_at: now,
                    completed_at: Some(now),
                });
                tracing::debug!(execution_id = %state.execution_id, step_id = %step.id, "condition false, step skipped");
                self.event_bus.publish(WorkflowEvent::StepSkipped {
                    execution_id: state.execution_id,
                    step_id: step.id.clone(),
                });
                notify(on_progress, state);
                Ok(false)
            }
            Err(e) => self
                .record(state, step.id.clone(), Utc::now(), Duration::ZERO, Err(e.into()), on_progress)
                .map(|_| false),
        }
    }

    fn mark_running(&self, step: &WorkflowStep, state: &mut WorkflowState, on_progress: Option<&ProgressFn<'_>>) {
        state.set_step_status(&step.id, StepStatus::Running);
        state.current_step = Some(step.id.clone());
        self.event_bus.publish(WorkflowEvent::StepStarted {
            execution_id: state.execution_id,
            step_id: step.id.clone(),
            step_type: step.step_type.to_string(),
        });
        notify(on_progress, state);
    }

    /// Record a step's outcome. A failure is recorded and then returned as
    /// `EngineError::StepFailed`.
    fn record(
        &self,
        state: &mut WorkflowState,
        step_id: String,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        outcome: Result<StepOutcome, StepFailure>,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<(), EngineError> {
        let execution_id = state.execution_id;
        let execution_time_ms = elapsed.as_millis() as u64;

        let (result, failure) = match outcome {
            Ok(outcome) => {
                tracing::info!(%execution_id, %step_id, duration_ms = execution_time_ms, attempts = outcome.attempts, "step completed");
                self.event_bus.publish(WorkflowEvent::StepCompleted {
                    execution_id,
                    step_id: step_id.clone(),
                    duration_ms: execution_time_ms,
                    attempts: outcome.attempts,
                });
                (
                    StepExecutionResult {
                        step_id: step_id.clone(),
                        status: StepStatus::Completed,
                        result: Some(outcome.result),
                        error: None,
                        execution_time_ms,
                        attempts: outcome.attempts,
                        started_at,
                        completed_at: Some(Utc::now()),
                    },
                    None,
                )
            }
            Err(StepFailure { error, attempts }) => {
                let message = error.to_string();
                tracing::warn!(%execution_id, %step_id, error = %message, attempts, "step failed");
                self.event_bus.publish(WorkflowEvent::StepFailed {
                    execution_id,
                    step_id: step_id.clone(),
                    error: message.clone(),
                });
                (
                    StepExecutionResult {
                        step_id: step_id.clone(),
                        status: StepStatus::Failed,
                        result: None,
                        error: Some(message.clone()),
                        execution_time_ms,
                        attempts,
                        started_at,
                        completed_at: Some(Utc::now()),
                    },
                    Some(message),
                )
            }
        };

        state.record_result(result);
        notify(on_progress, state);

        match failure {
            Some(error) => Err(EngineError::StepFailed { step_id, error }),
            None => Ok(()),
        }
    }
}

fn notify(on_progress: Option<&ProgressFn<'_>>, state: &WorkflowState) {
    if let Some(callback) = on_progress {
        callback(state);
    }
}

/// Request variables plus `steps.<id>` for every result recorded so far.
///
/// `steps` is reserved; the orchestrator rejects requests that define it.
fn build_scope(state: &WorkflowState) -> Value {
    let mut scope = match &state.variables {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    let steps: Map<String, Value> = state.result_map().into_iter().collect();
    scope.insert("steps".to_string(), Value::Object(steps));
    Value::Object(scope)
}
