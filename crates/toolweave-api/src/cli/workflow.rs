//! `validate` and `run` commands for workflow files.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use serde_json::{Map, Value, json};

use toolweave_core::repository::InMemoryWorkflowRepository;
use toolweave_core::workflow::WorkflowOrchestrator;
use toolweave_core::workflow::definition::load_workflow_file;
use toolweave_core::workflow::validator::execution_waves;
use toolweave_infra::config::load_global_config;
use toolweave_infra::http::client::USER_AGENT;
use toolweave_infra::http::{HttpToolExecutor, ReqwestHttpClient};
use toolweave_types::workflow::{ExecutionRequest, ExecutionStatus, StepStatus, WorkflowState};

/// Parse a `KEY=VALUE` pair. The value is JSON when it parses as JSON,
/// otherwise a plain string.
pub fn parse_var(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub fn validate(file: &Path, json_output: bool) -> Result<()> {
    let def = load_workflow_file(file)
        .with_context(|| format!("invalid workflow file {}", file.display()))?;
    let waves = execution_waves(&def)?;

    let plan: Vec<Vec<&str>> = waves
        .iter()
        .map(|wave| wave.iter().map(|s| s.id.as_str()).collect())
        .collect();

    if json_output {
        let out = json!({
            "valid": true,
            "name": def.name,
            "steps": def.steps.len(),
            "parallel_execution": def.parallel_execution,
            "waves": plan,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Workflow '{}' is valid ({} steps)",
        style("✓").green().bold(),
        style(&def.name).cyan(),
        def.steps.len()
    );
    println!();
    for (i, wave) in plan.iter().enumerate() {
        println!("  {} {}", style(format!("wave {}", i + 1)).dim(), wave.join(", "));
    }
    if def.parallel_execution {
        println!();
        println!("  {}", style("steps within a wave run concurrently").dim());
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Register the file with a throwaway in-memory orchestrator, run it once
/// against the configured tool endpoints, and print the record.
///
/// Returns the final status so the caller can pick an exit code.
pub async fn run(
    file: &Path,
    vars: Vec<(String, Value)>,
    timeout: Option<u64>,
    data_dir: &Path,
    json_output: bool,
) -> Result<ExecutionStatus> {
    let def = load_workflow_file(file)
        .with_context(|| format!("invalid workflow file {}", file.display()))?;
    let config = load_global_config(data_dir).await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .user_agent(USER_AGENT)
        .build()?;
    let orchestrator = WorkflowOrchestrator::new(
        Arc::new(InMemoryWorkflowRepository::new()),
        Arc::new(HttpToolExecutor::new(client.clone(), config.tools.clone())),
        Arc::new(ReqwestHttpClient::from_client(client)),
        &config,
    );

    let def = orchestrator.register(def).await?;
    let variables: Map<String, Value> = vars.into_iter().collect();
    let mut request = ExecutionRequest::new(def.id, Value::Object(variables));
    request.timeout_secs = timeout;

    let record = orchestrator.execute(request).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&def.name, &def.steps.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), &record);
    }
    Ok(record.status)
}

fn print_record(name: &str, step_order: &[&str], record: &WorkflowState) {
    let headline = match record.status {
        ExecutionStatus::Completed => style("completed").green().bold(),
        ExecutionStatus::Failed => style("failed").red().bold(),
        ExecutionStatus::Cancelled => style("cancelled").yellow().bold(),
        ExecutionStatus::Pending | ExecutionStatus::Running => style("running").dim(),
    };

    println!();
    println!("  Workflow '{}' {}", style(name).cyan(), headline);
    println!("  Execution: {}", record.execution_id);
    println!();

    for step_id in step_order {
        let status = record.step_statuses.get(*step_id).copied().unwrap_or(StepStatus::Pending);
        let marker = match status {
            StepStatus::Completed => style("✓").green(),
            StepStatus::Failed => style("✗").red(),
            StepStatus::Skipped => style("-").dim(),
            StepStatus::Pending | StepStatus::Running => style("·").dim(),
        };
        let detail = record
            .step_results
            .get(*step_id)
            .map(|r| match &r.error {
                Some(err) => format!("{}ms, {} attempt(s): {err}", r.execution_time_ms, r.attempts),
                None => format!("{}ms, {} attempt(s)", r.execution_time_ms, r.attempts),
            })
            .unwrap_or_default();
        println!("  {marker} {step_id:<24} {}", style(detail).dim());
    }

    if let Some(err) = &record.error {
        println!();
        println!("  {} {err}", style("error:").red().bold());
    }
    println!();
}
