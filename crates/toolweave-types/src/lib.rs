//! Shared domain types for toolweave.
//!
//! Workflow definitions, execution records, lifecycle events, global
//! configuration, and the repository error shared by every adapter.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod workflow;
