//! Workflow repository trait definition.
//!
//! Defines the storage interface for workflow definitions and execution
//! records. `toolweave-infra` implements it with SQLite; this crate ships an
//! in-memory implementation for tests and single-process use.

use chrono::{DateTime, Utc};
use toolweave_types::error::RepositoryError;
use toolweave_types::workflow::{WorkflowDefinition, WorkflowState};
use uuid::Uuid;

/// Repository trait for workflow persistence.
///
/// Covers two entity families:
/// - **Definitions:** upsert, lookup, listing, and soft deletion.
/// - **Executions:** finished (or cancelled) execution records kept as history.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Upsert a workflow definition (insert or replace by ID).
    fn save_definition(
        &self,
        def: &WorkflowDefinition,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a workflow definition by its UUID, including soft-deleted ones.
    fn get_definition(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowDefinition>, RepositoryError>> + Send;

    /// List definitions that have not been deleted, oldest first.
    fn list_definitions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowDefinition>, RepositoryError>> + Send;

    /// Mark a definition deleted. Returns `false` if it was missing or
    /// already deleted.
    fn soft_delete_definition(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Upsert an execution record.
    fn save_execution(
        &self,
        state: &WorkflowState,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_execution(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowState>, RepositoryError>> + Send;

    /// List execution records, newest `started_at` first, optionally for a
    /// single workflow.
    fn list_executions(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowState>, RepositoryError>> + Send;

    /// Delete execution records that finished before `cutoff` (records without
    /// a completion time use their start time). Returns the number removed.
    fn delete_executions_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
