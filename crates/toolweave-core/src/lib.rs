//! Business logic and repository trait definitions for toolweave.
//!
//! This crate holds the workflow composition engine and the "ports" the
//! infrastructure layer implements: the workflow repository, the tool
//! executor, and the HTTP client. It depends only on `toolweave-types` --
//! never on `toolweave-infra` or any database/IO crate.

pub mod event;
pub mod repository;
pub mod workflow;
