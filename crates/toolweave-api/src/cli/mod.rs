//! CLI command definitions for the `tweave` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Compose tools into validated, retrying, parallel workflows.
#[derive(Parser)]
#[command(name = "tweave", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all log output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory holding `config.toml` and the database
    /// (defaults to `~/.toolweave`).
    #[arg(long, env = "TOOLWEAVE_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Validate a workflow file (YAML or JSON) and print its wave plan.
    Validate {
        file: PathBuf,
    },

    /// Run a workflow file once and print the execution record.
    Run {
        file: PathBuf,

        /// Initial variable, repeatable. Values that parse as JSON are used
        /// as JSON, anything else as a string.
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = workflow::parse_var)]
        vars: Vec<(String, serde_json::Value)>,

        /// Overall timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_collects_vars() {
        let cli = Cli::try_parse_from([
            "tweave", "run", "wf.yaml", "--var", "n=3", "--var", "who=world", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run { file, vars, timeout } => {
                assert_eq!(file, PathBuf::from("wf.yaml"));
                assert_eq!(vars.len(), 2);
                assert_eq!(vars[0], ("n".to_string(), serde_json::json!(3)));
                assert!(timeout.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["tweave", "serve"]).unwrap();
        match cli.command {
            Commands::Serve { port, host } => {
                assert_eq!(port, 3000);
                assert_eq!(host, "127.0.0.1");
            }
            _ => panic!("expected serve"),
        }
    }
}
