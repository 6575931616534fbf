//! scanpipe-api - page OCR ingestion/serving process
//!
//! Accepts uploads into the request store, answers status polls, and serves
//! structured results. Pairs with the scanpipe-worker process, which watches
//! the same store and does the actual page processing.

use anyhow::Result;
use clap::Parser;
use scanpipe_api::{build_router, AppState};
use scanpipe_common::config::TomlConfig;
use scanpipe_common::RequestStore;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "scanpipe-api", about = "Page OCR ingestion/serving process")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "SCANPIPE_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting scanpipe-api v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = TomlConfig::load(&args.config)?;

    let store = RequestStore::new(&config.requests);
    store.ensure_dirs()?;
    info!("Request store ready under {}", config.requests.upload_path.display());

    let state = AppState::new(store);
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("scanpipe-api listening on http://{addr}");
    info!("Health check: http://{addr}/health");

    axum::serve(listener, app).await?;

    Ok(())
}
