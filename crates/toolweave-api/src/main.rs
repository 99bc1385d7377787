//! toolweave CLI and REST API entry point.
//!
//! Binary name: `tweave`
//!
//! Parses CLI arguments, sets up tracing, then dispatches to the command
//! handler or starts the REST API server.

mod cli;
mod http;
mod state;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use state::{AppState, ConcreteOrchestrator};
use toolweave_infra::config::resolve_data_dir;
use toolweave_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};
use toolweave_types::workflow::ExecutionStatus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut tracing_options = TracingOptions::from_verbosity(cli.verbose, cli.quiet);
    tracing_options.json = cli.json;
    tracing_options.enable_otel = cli.otel;
    if let Err(e) = init_tracing(&tracing_options) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    // Neither completions nor validation need a data directory.
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(*shell, &mut cmd, "tweave", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Validate { file } => return cli::workflow::validate(file, cli.json),
        _ => {}
    }

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => resolve_data_dir()?,
    };

    match cli.command {
        Commands::Run {
            file,
            vars,
            timeout,
        } => {
            let status = cli::workflow::run(&file, vars, timeout, &data_dir, cli.json).await?;
            if status != ExecutionStatus::Completed {
                shutdown_tracing();
                std::process::exit(1);
            }
        }

        Commands::Serve { port, host } => serve(&data_dir, &host, port).await?,

        Commands::Completions { .. } | Commands::Validate { .. } => {}
    }

    Ok(())
}

async fn serve(data_dir: &Path, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::init(data_dir).await?;

    let shutdown = CancellationToken::new();
    let retention = Duration::from_secs(state.config.history_retention_secs);
    let sweeper = tokio::spawn(sweep_history(
        Arc::clone(&state.orchestrator),
        retention,
        shutdown.clone(),
    ));

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "  {} toolweave API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}/api/v1")).cyan()
    );
    println!(
        "  {}",
        console::style(format!("data: {}", state.data_dir.display())).dim()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let router = http::router::build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    let _ = sweeper.await;
    println!("\n  Server stopped.");
    Ok(())
}

/// Evict history older than `retention`, hourly or at most once per
/// retention window, until `shutdown` fires.
async fn sweep_history(
    orchestrator: Arc<ConcreteOrchestrator>,
    retention: Duration,
    shutdown: CancellationToken,
) {
    let period = retention.min(Duration::from_secs(3600)).max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = orchestrator.cleanup(retention).await {
                    tracing::warn!(error = %e, "history cleanup failed");
                }
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
