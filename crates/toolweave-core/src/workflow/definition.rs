//! Workflow definition parsing and filesystem loading.
//!
//! Converts YAML or JSON documents into the canonical `WorkflowDefinition`
//! and runs structural validation on the result, so anything returned from
//! this module is ready to register.

use std::path::Path;

use thiserror::Error;
use toolweave_types::workflow::WorkflowDefinition;

use super::validator::validate_workflow;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Structural errors in a workflow definition.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Field-level validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("duplicate step ID '{0}'")]
    DuplicateStepId(String),

    #[error("entry point '{0}' does not name a step")]
    MissingEntryPoint(String),

    /// A step references an unknown dependency.
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),

    /// Dependency graph contains a cycle.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// Steps remain but none of them can become ready.
    #[error("deadlock: no runnable steps among {0}")]
    Deadlock(String),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `WorkflowDefinition`.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_workflow(&def)?;
    Ok(def)
}

/// Parse a JSON string into a validated `WorkflowDefinition`.
pub fn parse_workflow_json(json: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition =
        serde_json::from_str(json).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_workflow(&def)?;
    Ok(def)
}

/// Serialize a `WorkflowDefinition` to a YAML string.
pub fn serialize_workflow_yaml(def: &WorkflowDefinition) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(def).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a workflow definition from a `.json`, `.yaml` or `.yml` file.
///
/// Files with any other extension are read as YAML.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_workflow_json(&content),
        _ => parse_workflow_yaml(&content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST_YAML: &str = r#"
name: ticket-digest
entry_point: fetch
parallel_execution: true
steps:
  - id: fetch
    type: tool_call
    config:
      tool_name: tickets.list
      arguments:
        project: $project
  - id: summarize
    type: tool_call
    depends_on: [fetch]
    config:
      tool_name: text.summarize
  - id: wait
    type: delay
    depends_on: [fetch]
    config:
      delay_seconds: 1
"#;

    #[test]
    fn test_parse_yaml() {
        let def = parse_workflow_yaml(DIGEST_YAML).unwrap();
        assert_eq!(def.name, "ticket-digest");
        assert_eq!(def.steps.len(), 3);
        assert_eq!(def.steps[1].depends_on, vec!["fetch"]);
        assert_eq!(def.steps[0].config["arguments"]["project"], "$project");
    }

    #[test]
    fn test_parse_yaml_runs_validation() {
        let yaml = r#"
name: broken
entry_point: nowhere
steps:
  - id: a
    type: delay
    config: { delay_seconds: 0 }
"#;
        let err = parse_workflow_yaml(yaml).unwrap_err();
        assert!(matches!(err, WorkflowError::MissingEntryPoint(ref e) if e == "nowhere"));
    }

    #[test]
    fn test_parse_json_rejects_garbage() {
        let err = parse_workflow_json("{ not json").unwrap_err();
        assert!(matches!(err, WorkflowError::ParseError(_)));
    }

    #[test]
    fn test_yaml_serialize_then_parse_keeps_steps() {
        let def = parse_workflow_yaml(DIGEST_YAML).unwrap();
        let yaml = serialize_workflow_yaml(&def).unwrap();
        let again = parse_workflow_yaml(&yaml).unwrap();
        assert_eq!(again.id, def.id);
        assert_eq!(again.steps.len(), 3);
    }

    #[test]
    fn test_load_workflow_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("digest.yaml");
        std::fs::write(&yaml_path, DIGEST_YAML).unwrap();
        assert_eq!(load_workflow_file(&yaml_path).unwrap().steps.len(), 3);

        let def = parse_workflow_yaml(DIGEST_YAML).unwrap();
        let json_path = dir.path().join("digest.json");
        std::fs::write(&json_path, serde_json::to_string(&def).unwrap()).unwrap();
        assert_eq!(load_workflow_file(&json_path).unwrap().name, "ticket-digest");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_workflow_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, WorkflowError::IoError(_)));
    }
}
