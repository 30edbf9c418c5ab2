//! Voltura Service Hub CLI and REST API entry point.
//!
//! Binary name: `voltura`
//!
//! Parses CLI arguments, loads configuration, initializes tracing, the
//! database and services, then dispatches to the command handler, the REST
//! API server, or the workflow workers.

mod cli;
mod http;
mod state;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands, SessionCommand, TasksCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = voltura_infra::config::data_dir();
    let mut config = voltura_infra::config::load_config(&data_dir).await;
    if let Some(filter) = cli::verbosity_filter(cli.verbose) {
        config.logging.level = filter.to_string();
    }
    voltura_observe::init_tracing(&config.logging)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let state = AppState::init(config, data_dir)
        .await
        .context("failed to initialize application state")?;

    let result = run(cli, &state).await;
    voltura_observe::shutdown_tracing();
    result
}

async fn run(cli: Cli, state: &AppState) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve {
            port,
            host,
            no_workers,
        } => {
            let host = host.unwrap_or_else(|| state.config.server.host.clone());
            let port = port.unwrap_or(state.config.server.port);
            serve(state, &host, port, !no_workers).await?;
        }

        Commands::Worker => {
            let cancel = CancellationToken::new();
            let workers = state.start_workers(cancel.clone());
            println!(
                "  {} Voltura workers running",
                console::style("⚙").bold()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            shutdown_signal().await;
            state.shutdown(&cancel, Some(workers)).await;
            println!("\n  Workers stopped.");
        }

        Commands::Session { action } => match action {
            SessionCommand::Status { id } => cli::session::status(state, &id, cli.json).await?,
            SessionCommand::Connect { id } => {
                let result = cli::session::connect(state, &id, cli.json).await;
                state.registry.shutdown().await;
                result?;
            }
            SessionCommand::Terminate { id } => {
                cli::session::terminate(state, &id, cli.json).await?
            }
        },

        Commands::Tasks { action } => match action {
            TasksCommand::Failed { limit } => {
                cli::tasks::list_failed(state, limit, cli.json).await?
            }
        },
    }

    Ok(())
}

async fn serve(state: &AppState, host: &str, port: u16, with_workers: bool) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let cancel = CancellationToken::new();
    let workers = with_workers.then(|| state.start_workers(cancel.clone()));

    println!(
        "  {} Voltura API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    if !with_workers {
        println!(
            "  {}",
            console::style("Workers disabled; run `voltura worker` separately").dim()
        );
    }
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let router = http::router::build_router(state.clone());
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown(&cancel, workers).await;
    println!("\n  Server stopped.");
    Ok(())
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
            Ok(mut signal) => {
                signal.recv().await;
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
