//! SQLite workflow repository implementation.
//!
//! Implements `WorkflowRepository` from `toolweave-core` using sqlx with split
//! read/write pools. Definitions and execution records are stored as JSON
//! blobs next to the columns needed for filtering and ordering.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use toolweave_core::repository::workflow::WorkflowRepository;
use toolweave_types::error::RepositoryError;
use toolweave_types::workflow::{ExecutionStatus, WorkflowDefinition, WorkflowState};
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `WorkflowRepository`.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct WorkflowDefRow {
    definition: String,
}

impl WorkflowDefRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            definition: row.try_get("definition")?,
        })
    }

    fn into_definition(self) -> Result<WorkflowDefinition, RepositoryError> {
        serde_json::from_str(&self.definition).map_err(|e| {
            RepositoryError::Serialization(format!("invalid workflow definition JSON: {e}"))
        })
    }
}

struct ExecutionRow {
    state: String,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            state: row.try_get("state")?,
        })
    }

    fn into_state(self) -> Result<WorkflowState, RepositoryError> {
        serde_json::from_str(&self.state)
            .map_err(|e| RepositoryError::Serialization(format!("invalid execution state JSON: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fixed-width UTC timestamps so that text comparison orders chronologically.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn status_str(status: ExecutionStatus) -> Result<String, RepositoryError> {
    match serde_json::to_value(status)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(RepositoryError::Serialization(format!(
            "unexpected status encoding: {other}"
        ))),
    }
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => RepositoryError::Connection,
        other => RepositoryError::Query(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), RepositoryError> {
        let definition_json = serde_json::to_string(def)?;

        sqlx::query(
            r#"INSERT INTO workflows (id, name, definition, created_at, updated_at, deleted_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 definition = excluded.definition,
                 updated_at = excluded.updated_at,
                 deleted_at = excluded.deleted_at"#,
        )
        .bind(def.id.to_string())
        .bind(&def.name)
        .bind(&definition_json)
        .bind(format_datetime(&def.created_at))
        .bind(format_datetime(&def.updated_at))
        .bind(def.deleted_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        tracing::debug!(workflow_id = %def.id, name = %def.name, "saved workflow definition");
        Ok(())
    }

    async fn get_definition(&self, id: &Uuid) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let r = WorkflowDefRow::from_row(&row).map_err(query_err)?;
                Ok(Some(r.into_definition()?))
            }
            None => Ok(None),
        }
    }

    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT definition FROM workflows WHERE deleted_at IS NULL ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|row| {
                WorkflowDefRow::from_row(row)
                    .map_err(query_err)?
                    .into_definition()
            })
            .collect()
    }

    async fn soft_delete_definition(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let now = format_datetime(&Utc::now());
        let result = sqlx::query(
            r#"UPDATE workflows
               SET deleted_at = ?1,
                   definition = json_set(definition, '$.deleted_at', ?1)
               WHERE id = ?2 AND deleted_at IS NULL"#,
        )
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn save_execution(&self, state: &WorkflowState) -> Result<(), RepositoryError> {
        let state_json = serde_json::to_string(state)?;

        sqlx::query(
            r#"INSERT INTO executions (execution_id, workflow_id, status, state, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(execution_id) DO UPDATE SET
                 status = excluded.status,
                 state = excluded.state,
                 completed_at = excluded.completed_at"#,
        )
        .bind(state.execution_id.to_string())
        .bind(state.workflow_id.to_string())
        .bind(status_str(state.status)?)
        .bind(&state_json)
        .bind(format_datetime(&state.started_at))
        .bind(state.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        tracing::debug!(
            execution_id = %state.execution_id,
            workflow_id = %state.workflow_id,
            status = ?state.status,
            "saved execution record"
        );
        Ok(())
    }

    async fn get_execution(&self, execution_id: &Uuid) -> Result<Option<WorkflowState>, RepositoryError> {
        let row = sqlx::query("SELECT state FROM executions WHERE execution_id = ?")
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row).map_err(query_err)?;
                Ok(Some(r.into_state()?))
            }
            None => Ok(None),
        }
    }

    async fn list_executions(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> Result<Vec<WorkflowState>, RepositoryError> {
        let rows = match workflow_id {
            Some(id) => {
                sqlx::query(
                    "SELECT state FROM executions WHERE workflow_id = ? ORDER BY started_at DESC, execution_id DESC LIMIT ?",
                )
                .bind(id.to_string())
                .bind(i64::from(limit))
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT state FROM executions ORDER BY started_at DESC, execution_id DESC LIMIT ?",
                )
                .bind(i64::from(limit))
                .fetch_all(&self.pool.reader)
                .await
            }
        }
        .map_err(query_err)?;

        rows.iter()
            .map(|row| ExecutionRow::from_row(row).map_err(query_err)?.into_state())
            .collect()
    }

    async fn delete_executions_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM executions WHERE COALESCE(completed_at, started_at) < ?",
        )
        .bind(format_datetime(&cutoff))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(result.rows_affected())
    }
}
