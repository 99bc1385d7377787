//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod pool;
pub mod workflow;

pub use pool::{DatabasePool, database_url};
pub use workflow::SqliteWorkflowRepository;
