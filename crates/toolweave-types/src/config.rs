//! Global configuration types for toolweave.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls
//! execution defaults and the tool endpoint table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the workflow engine.
///
/// Loaded from `~/.toolweave/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Workflow timeout applied when neither the request nor the definition
    /// carries one.
    #[serde(default = "default_workflow_timeout_secs")]
    pub default_workflow_timeout_secs: u64,

    /// How long finished executions stay in history before `cleanup` evicts them.
    #[serde(default = "default_history_retention_secs")]
    pub history_retention_secs: u64,

    /// Client-level timeout for outbound HTTP calls.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Capacity of the lifecycle event broadcast channel.
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Tool name to endpoint URL.
    #[serde(default)]
    pub tools: HashMap<String, String>,
}

fn default_workflow_timeout_secs() -> u64 {
    1800
}

fn default_history_retention_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_event_bus_capacity() -> usize {
    1024
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_workflow_timeout_secs: default_workflow_timeout_secs(),
            history_retention_secs: default_history_retention_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            event_bus_capacity: default_event_bus_capacity(),
            tools: HashMap::new(),
        }
    }
}
