//! Endpoint Gateway - Main Application Entry Point
//!
//! A REST gateway serving admin-configured endpoints over stored content.
//! Every endpoint declares its fields (type, visibility, filter/sort/search
//! flags); callers authenticate with API keys or derived tokens and are
//! authorized per endpoint and HTTP method.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: API keys and tokens with SHA-256 hashing
//! - **Format**: JSON requests/responses
//!
//! # Commands
//!
//! - `serve` (default): activate, then serve HTTP until Ctrl-C
//! - `activate`: run migrations and seed default settings
//! - `deactivate`: drop transient settings

mod app;
mod config;
mod db;
mod error;
mod handlers;
mod lifecycle;
mod middleware;
mod models;
mod repositories;
mod services;

use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "endpoint_gateway", version, about = "Configurable REST endpoint gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Activate and serve HTTP
    Serve,
    /// Run migrations and seed default settings, then exit
    Activate,
    /// Drop transient settings, then exit
    Deactivate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let state = lifecycle::init(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            lifecycle::on_activate(&state).await?;
            serve(state.clone(), config.server_port).await?;
        }
        Command::Activate => {
            let seeded = lifecycle::on_activate(&state).await?;
            tracing::info!(?seeded, "Activation complete");
        }
        Command::Deactivate => {
            state.settings.reload().await?;
            lifecycle::on_deactivate(&state).await?;
        }
    }

    lifecycle::shutdown(state).await;
    Ok(())
}

async fn serve(state: app::AppState, port: u16) -> anyhow::Result<()> {
    let app = app::router(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Peer addresses feed the request log when no proxy header is present
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
