//! Workflow composition engine.
//!
//! - `definition` -- YAML/JSON parsing and the structural error type
//! - `validator` -- structural validation, cycle detection, static wave plan
//! - `variables` -- `$dotted.path` resolution and substitution
//! - `condition` -- two-operand condition evaluation
//! - `retry` -- exponential backoff retry loop
//! - `tool` -- injected tool-execution and HTTP capabilities
//! - `step_executor` -- dispatch for the six step types
//! - `engine` -- wave-based scheduler for a single execution
//! - `orchestrator` -- registration, execution lifecycle, history

pub mod condition;
pub mod definition;
pub mod engine;
pub mod orchestrator;
pub mod retry;
pub mod step_executor;
pub mod tool;
pub mod validator;
pub mod variables;

#[cfg(test)]
pub(crate) mod testing;

pub use definition::WorkflowError;
pub use engine::{EngineError, WorkflowEngine};
pub use orchestrator::{OrchestratorError, WorkflowOrchestrator};
pub use step_executor::{StepError, StepExecutor, StepFailure, StepOutcome};
pub use tool::{HttpClient, HttpRequest, HttpResponse, ToolExecutor};
