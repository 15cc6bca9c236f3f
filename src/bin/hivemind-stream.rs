//! Stream daemon: serves a project's event log over HTTP with an SSE live
//! tail for dashboards and other viewers.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hivemind::adapters::http::{StreamConfig, StreamServer};
use hivemind::adapters::migrations::run_migrations;
use hivemind::adapters::sqlite::{create_pool, SqliteAdapter};
use hivemind::config::CoreConfig;
use hivemind::services::EventStore;

#[derive(Parser, Debug)]
#[command(name = "hivemind-stream")]
#[command(about = "Durable stream endpoint for a hivemind coordination database")]
struct Args {
    /// Project root the database belongs to
    #[arg(long, default_value = ".")]
    project: PathBuf,

    /// Explicit SQLite database path (overrides the derived location)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Optional YAML config file
    #[arg(long, env = "HIVEMIND_CONFIG")]
    config: Option<PathBuf>,

    /// Bind host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides config)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,hivemind=debug")
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = CoreConfig::load(args.config.as_deref()).context("failed to load config")?;

    let database_url = match &args.db_path {
        Some(path) => format!("sqlite://{}", path.display()),
        None => {
            let project = args
                .project
                .canonicalize()
                .unwrap_or_else(|_| args.project.clone());
            config.database_url_for(&project)
        }
    };
    info!(database_url = %database_url, "opening coordination database");

    let pool = create_pool(&database_url, None).await.context("failed to open database")?;
    let adapter = SqliteAdapter::new(pool);
    run_migrations(&adapter).await.context("failed to run migrations")?;

    let store = EventStore::new(Arc::new(adapter));
    let stream_config = StreamConfig {
        host: args.host.unwrap_or(config.stream.host),
        port: args.port.unwrap_or(config.stream.port),
        enable_cors: config.stream.enable_cors,
        poll_interval_ms: config.stream.poll_interval_ms,
        ..StreamConfig::default()
    };

    let server = StreamServer::new(store, stream_config);
    server
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .map_err(|e| anyhow::anyhow!("stream server failed: {e}"))?;

    Ok(())
}
