//! Infrastructure layer for toolweave.
//!
//! Contains implementations of the ports defined in `toolweave-core`:
//! SQLite storage for definitions and execution history, a `reqwest`-backed
//! HTTP client and tool executor, and the `config.toml` loader.

pub mod config;
pub mod http;
pub mod sqlite;
