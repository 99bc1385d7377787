//! Workflow orchestrator: registration, execution, status, and history.
//!
//! Owns the set of in-flight executions (`DashMap`) and delegates storage of
//! definitions and finished executions to a `WorkflowRepository`. Every
//! execution runs under a wall-clock deadline and a `CancellationToken`;
//! cancelling is a logical status flip that also stops new waves from
//! starting.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use toolweave_types::config::GlobalConfig;
use toolweave_types::error::RepositoryError;
use toolweave_types::event::WorkflowEvent;
use toolweave_types::workflow::{ExecutionRequest, ExecutionStatus, WorkflowDefinition, WorkflowState};
use uuid::Uuid;

use crate::event::EventBus;
use crate::repository::workflow::WorkflowRepository;

use super::definition::WorkflowError;
use super::engine::{EngineError, WorkflowEngine};
use super::step_executor::StepExecutor;
use super::tool::{HttpClient, ToolExecutor};
use super::validator::validate_workflow;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("execution {0} not found")]
    ExecutionNotFound(Uuid),

    #[error("workflow {0} already exists")]
    AlreadyExists(Uuid),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Scope key under which earlier step results are exposed to later steps.
const RESERVED_STEPS_VARIABLE: &str = "steps";

/// An execution that has not finished yet.
struct ActiveExecution {
    state: WorkflowState,
    cancel_token: CancellationToken,
    /// Set once the run has produced its terminal record. The entry stays
    /// visible until that record is stored, but can no longer be cancelled.
    finished: bool,
}

/// Everything `execute` needs once a request has been accepted.
struct PreparedExecution {
    definition: WorkflowDefinition,
    state: WorkflowState,
    timeout: Duration,
}

// ---------------------------------------------------------------------------
// WorkflowOrchestrator
// ---------------------------------------------------------------------------

/// Entry point for registering and running workflows.
pub struct WorkflowOrchestrator<R: WorkflowRepository> {
    repo: Arc<R>,
    engine: WorkflowEngine,
    active: DashMap<Uuid, ActiveExecution>,
    default_timeout: Duration,
}

impl<R: WorkflowRepository> WorkflowOrchestrator<R> {
    /// Create an orchestrator. The tool executor and HTTP client are shared by
    /// every execution it runs.
    pub fn new(
        repo: Arc<R>,
        tools: Arc<dyn ToolExecutor>,
        http: Arc<dyn HttpClient>,
        config: &GlobalConfig,
    ) -> Self {
        let event_bus = EventBus::new(config.event_bus_capacity);
        Self {
            repo,
            engine: WorkflowEngine::new(StepExecutor::new(tools, http), event_bus),
            active: DashMap::new(),
            default_timeout: Duration::from_secs(config.default_workflow_timeout_secs),
        }
    }

    /// Lifecycle events for every execution run by this orchestrator.
    pub fn events(&self) -> &EventBus {
        self.engine.event_bus()
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Validate and store a new workflow. IDs must be unique, including
    /// against deleted workflows.
    pub async fn register(
        &self,
        mut definition: WorkflowDefinition,
    ) -> Result<WorkflowDefinition, OrchestratorError> {
        validate_workflow(&definition)?;
        if self.repo.get_definition(&definition.id).await?.is_some() {
            return Err(OrchestratorError::AlreadyExists(definition.id));
        }

        let now = Utc::now();
        definition.created_at = now;
        definition.updated_at = now;
        definition.deleted_at = None;
        self.repo.save_definition(&definition).await?;

        tracing::info!(workflow_id = %definition.id, workflow = %definition.name, steps = definition.steps.len(), "workflow registered");
        Ok(definition)
    }

    /// Replace the definition stored under `id`.
    pub async fn update(
        &self,
        id: Uuid,
        mut definition: WorkflowDefinition,
    ) -> Result<WorkflowDefinition, OrchestratorError> {
        let existing = self.live_definition(id).await?;
        validate_workflow(&definition)?;

        definition.id = id;
        definition.created_at = existing.created_at;
        definition.updated_at = Utc::now();
        definition.deleted_at = None;
        self.repo.save_definition(&definition).await?;

        tracing::info!(workflow_id = %id, version = %definition.version, "workflow updated");
        Ok(definition)
    }

    pub async fn list(&self) -> Result<Vec<WorkflowDefinition>, OrchestratorError> {
        Ok(self.repo.list_definitions().await?)
    }

    /// Fetch a workflow by ID. Deleted workflows are still returned.
    pub async fn get(&self, id: Uuid) -> Result<WorkflowDefinition, OrchestratorError> {
        self.repo
            .get_definition(&id)
            .await?
            .ok_or(OrchestratorError::WorkflowNotFound(id))
    }

    /// Soft-delete a workflow: it disappears from listings and can no longer
    /// be executed, but history that references it stays intact.
    pub async fn delete(&self, id: Uuid) -> Result<(), OrchestratorError> {
        if !self.repo.soft_delete_definition(&id).await? {
            return Err(OrchestratorError::WorkflowNotFound(id));
        }
        tracing::info!(workflow_id = %id, "workflow deleted");
        Ok(())
    }

    async fn live_definition(&self, id: Uuid) -> Result<WorkflowDefinition, OrchestratorError> {
        match self.repo.get_definition(&id).await? {
            Some(def) if !def.is_deleted() => Ok(def),
            _ => Err(OrchestratorError::WorkflowNotFound(id)),
        }
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run a workflow to completion and return its final record.
    ///
    /// Step failures, timeouts and cancellation are reported through the
    /// record's status, not as errors; errors mean the request itself was
    /// rejected or storage failed.
    pub async fn execute(&self, request: ExecutionRequest) -> Result<WorkflowState, OrchestratorError> {
        let prepared = self.prepare(request).await?;
        self.run_prepared(prepared).await
    }

    /// Accept a request and run it in the background, returning the
    /// execution ID immediately. The execution is visible through
    /// `get_status` and `active` as soon as this returns.
    pub async fn start(self: &Arc<Self>, request: ExecutionRequest) -> Result<Uuid, OrchestratorError>
    where
        R: 'static,
    {
        let prepared = self.prepare(request).await?;
        let execution_id = prepared.state.execution_id;

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.run_prepared(prepared).await {
                tracing::error!(%execution_id, error = %e, "background execution failed");
            }
        });
        Ok(execution_id)
    }

    /// Validate the request and register the execution as active.
    async fn prepare(&self, request: ExecutionRequest) -> Result<PreparedExecution, OrchestratorError> {
        if request.timeout_secs == Some(0) {
            return Err(OrchestratorError::InvalidRequest(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if !request.variables.is_object() {
            return Err(OrchestratorError::InvalidRequest(
                "variables must be a JSON object".to_string(),
            ));
        }
        if request.variables.get(RESERVED_STEPS_VARIABLE).is_some() {
            return Err(OrchestratorError::InvalidRequest(format!(
                "variable '{RESERVED_STEPS_VARIABLE}' is reserved for step results"
            )));
        }

        let definition = self.live_definition(request.workflow_id).await?;
        let timeout = request
            .timeout_secs
            .or(definition.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let mut state = WorkflowState::new(definition.id, request.variables);
        state.metadata = request.metadata;
        state.status = ExecutionStatus::Running;

        self.active.insert(
            state.execution_id,
            ActiveExecution {
                state: state.clone(),
                cancel_token: CancellationToken::new(),
                finished: false,
            },
        );

        Ok(PreparedExecution {
            definition,
            state,
            timeout,
        })
    }

    async fn run_prepared(&self, prepared: PreparedExecution) -> Result<WorkflowState, OrchestratorError> {
        let PreparedExecution {
            definition,
            mut state,
            timeout,
        } = prepared;
        let execution_id = state.execution_id;

        let Some(cancel_token) = self
            .active
            .get(&execution_id)
            .map(|entry| entry.cancel_token.clone())
        else {
            // Cancelled between `start` returning and the task being polled.
            state.finish(ExecutionStatus::Cancelled, Some("execution cancelled".to_string()));
            return Ok(state);
        };

        let progress = |snapshot: &WorkflowState| {
            if let Some(mut entry) = self.active.get_mut(&execution_id) {
                entry.state = snapshot.clone();
            }
        };

        let outcome = tokio::time::timeout(
            timeout,
            self.engine
                .run(&definition, &mut state, &cancel_token, Some(&progress)),
        )
        .await
        .unwrap_or(Err(EngineError::WorkflowTimeout));

        // `cancel` removes the entry and writes the CANCELLED record itself;
        // whatever the engine produced afterwards must not replace it.
        let claimed = match self.active.get_mut(&execution_id) {
            Some(mut entry) => {
                entry.finished = true;
                true
            }
            None => false,
        };
        if !claimed {
            state.finish(ExecutionStatus::Cancelled, Some("execution cancelled".to_string()));
            return Ok(state);
        }

        match outcome {
            Ok(()) => {
                state.finish(ExecutionStatus::Completed, None);
                let duration_ms = (Utc::now() - state.started_at).num_milliseconds().max(0) as u64;
                tracing::info!(%execution_id, workflow_id = %definition.id, duration_ms, "workflow execution completed");
                self.events().publish(WorkflowEvent::ExecutionCompleted {
                    execution_id,
                    workflow_id: definition.id,
                    duration_ms,
                });
            }
            Err(EngineError::Cancelled) => {
                state.finish(ExecutionStatus::Cancelled, Some("execution cancelled".to_string()));
                self.events().publish(WorkflowEvent::ExecutionCancelled {
                    execution_id,
                    workflow_id: definition.id,
                });
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(%execution_id, workflow_id = %definition.id, error = %message, "workflow execution failed");
                state.finish(ExecutionStatus::Failed, Some(message.clone()));
                self.events().publish(WorkflowEvent::ExecutionFailed {
                    execution_id,
                    workflow_id: definition.id,
                    error: message,
                });
            }
        }

        if let Some(mut entry) = self.active.get_mut(&execution_id) {
            entry.state = state.clone();
        }
        let saved = self.repo.save_execution(&state).await;
        self.active.remove(&execution_id);
        saved?;
        Ok(state)
    }

    // -----------------------------------------------------------------------
    // Status and control
    // -----------------------------------------------------------------------

    /// Current record for an execution: live state if it is still running,
    /// otherwise the stored history record.
    pub async fn get_status(&self, execution_id: Uuid) -> Result<WorkflowState, OrchestratorError> {
        if let Some(entry) = self.active.get(&execution_id) {
            return Ok(entry.state.clone());
        }
        self.repo
            .get_execution(&execution_id)
            .await?
            .ok_or(OrchestratorError::ExecutionNotFound(execution_id))
    }

    /// Mark an active execution CANCELLED and move it to history.
    ///
    /// Tool and HTTP calls already in flight are not interrupted; no new
    /// wave starts and their results are discarded.
    pub async fn cancel(&self, execution_id: Uuid) -> Result<WorkflowState, OrchestratorError> {
        let Some((_, entry)) = self
            .active
            .remove_if(&execution_id, |_, entry| !entry.finished)
        else {
            if let Some(entry) = self.active.get(&execution_id) {
                return Err(OrchestratorError::InvalidRequest(format!(
                    "execution {execution_id} already finished with status {:?}",
                    entry.state.status
                )));
            }
            return match self.repo.get_execution(&execution_id).await? {
                Some(done) => Err(OrchestratorError::InvalidRequest(format!(
                    "execution {execution_id} already finished with status {:?}",
                    done.status
                ))),
                None => Err(OrchestratorError::ExecutionNotFound(execution_id)),
            };
        };

        entry.cancel_token.cancel();
        let mut state = entry.state;
        state.finish(ExecutionStatus::Cancelled, Some("execution cancelled".to_string()));
        self.repo.save_execution(&state).await?;

        tracing::info!(%execution_id, workflow_id = %state.workflow_id, "workflow execution cancelled");
        self.events().publish(WorkflowEvent::ExecutionCancelled {
            execution_id,
            workflow_id: state.workflow_id,
        });
        Ok(state)
    }

    /// Finished executions, newest first.
    pub async fn history(
        &self,
        workflow_id: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<WorkflowState>, OrchestratorError> {
        Ok(self
            .repo
            .list_executions(workflow_id.as_ref(), limit)
            .await?)
    }

    /// Snapshots of every in-flight execution.
    pub fn active(&self) -> Vec<WorkflowState> {
        let mut states: Vec<WorkflowState> = self
            .active
            .iter()
            .filter(|entry| !entry.finished)
            .map(|entry| entry.state.clone())
            .collect();
        states.sort_by_key(|s| s.started_at);
        states
    }

    /// Evict history records older than `max_age`. Returns how many were removed.
    pub async fn cleanup(&self, max_age: Duration) -> Result<u64, OrchestratorError> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| OrchestratorError::InvalidRequest(format!("max_age out of range: {e}")))?;
        let removed = self
            .repo
            .delete_executions_before(Utc::now() - max_age)
            .await?;
        tracing::info!(removed, "execution history cleaned up");
        Ok(removed)
    }
}
