//! Lifecycle events for the workflow event bus.
//!
//! `WorkflowEvent` is broadcast by the engine as an execution progresses.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted while a workflow execution runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    ExecutionStarted {
        execution_id: Uuid,
        workflow_id: Uuid,
        workflow_name: String,
    },

    StepStarted {
        execution_id: Uuid,
        step_id: String,
        step_type: String,
    },

    StepCompleted {
        execution_id: Uuid,
        step_id: String,
        duration_ms: u64,
        attempts: u32,
    },

    StepFailed {
        execution_id: Uuid,
        step_id: String,
        error: String,
    },

    /// The step's condition evaluated false.
    StepSkipped {
        execution_id: Uuid,
        step_id: String,
    },

    ExecutionCompleted {
        execution_id: Uuid,
        workflow_id: Uuid,
        duration_ms: u64,
    },

    ExecutionFailed {
        execution_id: Uuid,
        workflow_id: Uuid,
        error: String,
    },

    ExecutionCancelled {
        execution_id: Uuid,
        workflow_id: Uuid,
    },
}

impl WorkflowEvent {
    /// The execution this event belongs to.
    pub fn execution_id(&self) -> Uuid {
        match self {
            WorkflowEvent::ExecutionStarted { execution_id, .. }
            | WorkflowEvent::StepStarted { execution_id, .. }
            | WorkflowEvent::StepCompleted { execution_id, .. }
            | WorkflowEvent::StepFailed { execution_id, .. }
            | WorkflowEvent::StepSkipped { execution_id, .. }
            | WorkflowEvent::ExecutionCompleted { execution_id, .. }
            | WorkflowEvent::ExecutionFailed { execution_id, .. }
            | WorkflowEvent::ExecutionCancelled { execution_id, .. } => *execution_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_started_serde_tag() {
        let event = WorkflowEvent::StepStarted {
            execution_id: Uuid::now_v7(),
            step_id: "fetch".to_string(),
            step_type: "tool_call".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"step_started\""));
        assert!(json.contains("\"step_id\":\"fetch\""));

        let parsed: WorkflowEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, WorkflowEvent::StepStarted { .. }));
    }

    #[test]
    fn test_execution_failed_serde_tag() {
        let event = WorkflowEvent::ExecutionFailed {
            execution_id: Uuid::now_v7(),
            workflow_id: Uuid::now_v7(),
            error: "step 'b' failed".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"execution_failed\""));
    }

    #[test]
    fn test_execution_id_accessor() {
        let id = Uuid::now_v7();
        let event = WorkflowEvent::StepSkipped {
            execution_id: id,
            step_id: "x".to_string(),
        };
        assert_eq!(event.execution_id(), id);
    }
}
