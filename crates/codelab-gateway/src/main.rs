//! # codelab-gateway
//!
//! Gateway binary — wires the compute client, the orchestrator, and the
//! HTTP/WebSocket server together.

#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use codelab_exec::{Judge0Client, JobOrchestrator};
use codelab_server::{GatewayServer, ServerConfig};
use tracing_subscriber::EnvFilter;

/// Collaborative code-execution gateway.
#[derive(Parser, Debug)]
#[command(name = "codelab-gateway", about = "Collaborative code-execution gateway")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "5000")]
    port: u16,

    /// Base URL of the compute service.
    #[arg(long, env = "JUDGE0_URL")]
    compute_url: String,

    /// API key for the compute service, when it requires one.
    #[arg(long, env = "JUDGE0_KEY")]
    compute_key: Option<String>,

    /// Maximum concurrent WebSocket connections.
    #[arg(long)]
    max_connections: Option<usize>,

    /// Maximum members per room.
    #[arg(long)]
    max_room_members: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=warn")),
        )
        .init();

    let args = Cli::parse();

    let defaults = ServerConfig::default();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        max_connections: args.max_connections.unwrap_or(defaults.max_connections),
        max_room_members: args.max_room_members.unwrap_or(defaults.max_room_members),
        ..defaults
    };

    let client = Judge0Client::new(&args.compute_url, args.compute_key.as_deref());
    client
        .check_reachable()
        .await
        .with_context(|| format!("compute service unreachable at {}", args.compute_url))?;
    tracing::info!(compute_url = %args.compute_url, "compute service reachable");

    let orchestrator = JobOrchestrator::new(Arc::new(client));
    let server = GatewayServer::new(config, orchestrator);

    let (addr, handle) = server.listen().await.context("failed to bind server")?;
    tracing::info!("gateway listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down...");
    server.shutdown().shutdown();
    let _ = handle.await;
    tracing::info!("shutdown complete");
    Ok(())
}
