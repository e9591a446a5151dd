//! Glossa RPC Server - JSON-RPC front end for the reconciliation engine.
//!
//! This binary wraps glossa-core in a JSON-RPC 2.0 server so reconciliation
//! can be triggered by other services.

mod handlers;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use glossa_core::{ReconcileApi, TrainingCredentials};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "glossa-rpc")]
#[command(about = "JSON-RPC server for Glossa model reconciliation")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Directory holding the registry database and object containers
    #[arg(long, default_value = "glossa-data")]
    data_dir: PathBuf,

    /// Base URL of the training service
    #[arg(long, env = "GLOSSA_TRAINING_URL", default_value = "")]
    training_url: String,

    /// API key for the training service
    #[arg(long, env = "GLOSSA_TRAINING_API_KEY", default_value = "", hide_env_values = true)]
    training_api_key: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --debug when set
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Glossa RPC Server");
    info!("Data directory: {}", args.data_dir.display());
    if args.training_url.is_empty() {
        info!("No default training service URL; requests must pass credentials");
    }

    let api = ReconcileApi::builder()
        .data_dir(&args.data_dir)
        .auto_create_dirs(true)
        .credentials(TrainingCredentials::new(
            args.training_url,
            args.training_api_key,
        ))
        .build()
        .context("failed to initialize reconciliation API")?;

    let addr = server::start_server(api, &args.host, args.port).await?;

    // Port announcement for supervisors that start us with --port 0
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
