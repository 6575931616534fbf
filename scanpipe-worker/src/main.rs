//! scanpipe-worker - page processing process
//!
//! Watches the shared request store for uploaded page images, runs each one
//! through the external layout engine plus optional caption enrichment and
//! music export, and persists results (or the error marker) back into the
//! store. Pairs with scanpipe-api, which serves the store over HTTP.

use anyhow::{bail, Result};
use clap::Parser;
use scanpipe_common::config::TomlConfig;
use scanpipe_common::RequestStore;
use scanpipe_worker::captions::{CaptionPool, OpenAiCaptioner};
use scanpipe_worker::engine::HttpLayoutEngine;
use scanpipe_worker::loader::ImageLoader;
use scanpipe_worker::music::MusicExporter;
use scanpipe_worker::processor::Processor;
use scanpipe_worker::watcher::Watcher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "scanpipe-worker", about = "Page OCR processing worker")]
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

    info!("Starting scanpipe-worker v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = TomlConfig::load(&args.config)?;

    let store = RequestStore::new(&config.requests);
    store.ensure_dirs()?;

    let Some(engine_config) = &config.engine else {
        bail!("worker requires an [engine] section in the configuration");
    };
    let engine = Arc::new(HttpLayoutEngine::new(engine_config));
    info!("Layout engine endpoint: {}", engine_config.url);

    let captions = if config.captions.enabled {
        let Some(api_key) = config.caption_api_key()? else {
            bail!("captions are enabled but no API key is configured");
        };
        info!("Caption enrichment enabled ({})", config.captions.model);
        Some(CaptionPool::new(
            Arc::new(OpenAiCaptioner::new(&config.captions, api_key)),
            &config.captions,
        ))
    } else {
        None
    };

    let music = if config.music.enabled {
        let Some(url) = config.music.url.clone() else {
            bail!("music export is enabled but no URL is configured");
        };
        info!("Music export endpoint: {url}");
        Some(MusicExporter::new(&config.music, url, store.clone()))
    } else {
        None
    };

    let processor = Processor::new(
        store.clone(),
        ImageLoader::default(),
        engine,
        captions,
        music,
        config.worker.pad_to_a4,
    );

    let watcher = Watcher::new(
        store,
        Duration::from_secs(config.worker.poll_interval_secs.max(1)),
    );

    tokio::select! {
        result = watcher.run(&processor) => result.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    }
}
