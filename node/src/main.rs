// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Cascade Node
//!
//! Entry point for the `cascade-node` binary. Parses CLI arguments,
//! initializes logging and metrics, constructs a vault tree engine over the
//! in-memory reference bank, and serves the HTTP API.
//!
//! The binary supports two subcommands:
//!
//! - `run`     — start the node
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::RwLock;

use cascade_engine::{EngineConfig, InMemoryAssetBank, TracingEventSink, VaultEngine};

use cli::{CascadeNodeCli, Commands};
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CascadeNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: engine construction, API server, metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "cascade_node=info,cascade_engine=info,tower_http=debug",
        args.log_format,
    );

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        max_tree_depth = args.max_tree_depth,
        "starting cascade-node"
    );

    // --- Engine over the reference rail ---
    let bank = Arc::new(InMemoryAssetBank::new());
    let engine = VaultEngine::new(
        EngineConfig::with_max_tree_depth(args.max_tree_depth),
        Arc::clone(&bank),
        TracingEventSink,
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: chrono::Utc::now(),
        engine: Arc::new(RwLock::new(engine)),
        bank,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("cascade-node stopped");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("cascade-node {}", env!("CARGO_PKG_VERSION"));
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
