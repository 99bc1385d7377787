//! `DashMap`-backed `WorkflowRepository` for tests and single-process use.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use toolweave_types::error::RepositoryError;
use toolweave_types::workflow::{WorkflowDefinition, WorkflowState};
use uuid::Uuid;

use super::workflow::WorkflowRepository;

/// Keeps definitions and execution history in process memory.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowRepository {
    definitions: DashMap<Uuid, WorkflowDefinition>,
    executions: DashMap<Uuid, WorkflowState>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn finished_at(state: &WorkflowState) -> DateTime<Utc> {
    state.completed_at.unwrap_or(state.started_at)
}

impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), RepositoryError> {
        self.definitions.insert(def.id, def.clone());
        Ok(())
    }

    async fn get_definition(&self, id: &Uuid) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        Ok(self.definitions.get(id).map(|d| d.clone()))
    }

    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let mut defs: Vec<WorkflowDefinition> = self
            .definitions
            .iter()
            .filter(|d| !d.is_deleted())
            .map(|d| d.clone())
            .collect();
        defs.sort_by_key(|d| (d.created_at, d.id));
        Ok(defs)
    }

    async fn soft_delete_definition(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        match self.definitions.get_mut(id) {
            Some(mut def) if !def.is_deleted() => {
                def.deleted_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn save_execution(&self, state: &WorkflowState) -> Result<(), RepositoryError> {
        self.executions.insert(state.execution_id, state.clone());
        Ok(())
    }

    async fn get_execution(&self, execution_id: &Uuid) -> Result<Option<WorkflowState>, RepositoryError> {
        Ok(self.executions.get(execution_id).map(|s| s.clone()))
    }

    async fn list_executions(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> Result<Vec<WorkflowState>, RepositoryError> {
        let mut states: Vec<WorkflowState> = self
            .executions
            .iter()
            .filter(|s| workflow_id.is_none_or(|id| s.workflow_id == *id))
            .map(|s| s.clone())
            .collect();
        states.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then(b.execution_id.cmp(&a.execution_id))
        });
        states.truncate(limit as usize);
        Ok(states)
    }

    async fn delete_executions_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut removed = 0u64;
        self.executions.retain(|_, s| {
            let keep = finished_at(s) >= cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}
