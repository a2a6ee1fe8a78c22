//! supportdesk CLI and server entry point.
//!
//! Parses CLI arguments, loads `supportdesk.toml`, wires the session registry
//! and either runs a one-shot command or serves the HTTP/WebSocket API.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use supportdesk_core::chat::store::ChatStore;
use supportdesk_infra::config::{default_data_dir, load_config};
use supportdesk_observe::tracing_setup::{init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions need neither logging nor state.
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "supportdesk", &mut std::io::stdout());
        return Ok(());
    }

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn,supportdesk=info",
        1 => "info,supportdesk=debug",
        _ => "trace",
    };
    let otel = matches!(cli.command, Commands::Serve { otel: true, .. });
    init_tracing(filter, otel).map_err(|e| anyhow::anyhow!(e))?;

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let mut config = load_config(&data_dir).await;

    let result = match cli.command {
        Commands::Serve {
            port,
            host,
            ephemeral,
            ..
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if ephemeral {
                serve(AppState::ephemeral(&data_dir, config)).await
            } else {
                serve(AppState::init(&data_dir, config).await?).await
            }
        }

        Commands::Sessions => {
            let state = AppState::init(&data_dir, config).await?;
            cli::session::list_sessions(&state, cli.json).await
        }

        Commands::Show { session_id } => {
            let state = AppState::init(&data_dir, config).await?;
            cli::session::show_session(&state, &session_id, cli.json).await
        }

        Commands::Completions { .. } => Ok(()),
    };

    shutdown_tracing();
    result
}

async fn serve<S: ChatStore + 'static>(state: AppState<S>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "  {} supportdesk listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());
    tracing::info!(%addr, data_dir = %state.data_dir.display(), "server started");

    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!("Failed to install SIGTERM handler: {err}");
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
