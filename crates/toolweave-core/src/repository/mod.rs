//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (toolweave-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod in_memory;
pub mod workflow;

pub use in_memory::InMemoryWorkflowRepository;
pub use workflow::WorkflowRepository;
