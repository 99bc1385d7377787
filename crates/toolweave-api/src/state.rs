//! Application state wiring the orchestrator to its infra adapters.
//!
//! `AppState` is shared by the CLI commands and the REST handlers. The
//! orchestrator is generic over its repository; here it is pinned to SQLite.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use toolweave_core::workflow::WorkflowOrchestrator;
use toolweave_infra::config::load_global_config;
use toolweave_infra::http::{HttpToolExecutor, ReqwestHttpClient};
use toolweave_infra::http::client::USER_AGENT;
use toolweave_infra::sqlite::{DatabasePool, SqliteWorkflowRepository};
use toolweave_types::config::GlobalConfig;

pub type ConcreteOrchestrator = WorkflowOrchestrator<SqliteWorkflowRepository>;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConcreteOrchestrator>,
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Load `config.toml`, open the database, and build the orchestrator.
    pub async fn init(data_dir: &Path) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let config = load_global_config(data_dir).await;

        let db_url = format!(
            "sqlite://{}?mode=rwc",
            data_dir.join("toolweave.db").display()
        );
        let pool = DatabasePool::new(&db_url).await?;

        let mut state = Self::with_pool(pool, config)?;
        state.data_dir = data_dir.to_path_buf();
        tracing::info!(data_dir = %data_dir.display(), "application state initialized");
        Ok(state)
    }

    /// Build state over an already-open pool.
    pub fn with_pool(pool: DatabasePool, config: GlobalConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        let tools = Arc::new(HttpToolExecutor::new(client.clone(), config.tools.clone()));
        let http = Arc::new(ReqwestHttpClient::from_client(client));
        let repo = Arc::new(SqliteWorkflowRepository::new(pool));

        let orchestrator = WorkflowOrchestrator::new(repo, tools, http, &config);
        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            config: Arc::new(config),
            data_dir: PathBuf::new(),
        })
    }
}
