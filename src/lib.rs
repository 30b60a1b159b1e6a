pub mod config;
pub mod errors;
pub mod host;
pub mod overlay;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::errors::OverlayResult;
use crate::overlay::engine::{OverlayEngine, OverlayUpdate};
use crate::overlay::loader::DefaultDataSource;

/// Run the overlay against the stdin/stdout host protocol until input closes.
pub async fn run() -> OverlayResult<()> {
    // stdout carries protocol output; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let config = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "no usable config; using defaults with an empty class map");
            AppConfig::default()
        }
    };

    let source = Arc::new(DefaultDataSource::new(config.data.http_timeout_secs)?);
    let (update_tx, update_rx) = mpsc::channel::<OverlayUpdate>(32);
    let (mut engine, handle) = OverlayEngine::new(&config, source, update_tx);

    if let Some(location) = config.data.default_source.clone() {
        handle.load(location).await?;
    }

    tracing::info!(classes = config.classes.len(), "spawning OverlayEngine task");
    let engine_task = tokio::spawn(async move {
        engine.run_loop().await;
    });

    let reader = tokio::io::BufReader::new(tokio::io::stdin());
    host::serve(reader, tokio::io::stdout(), handle, update_rx).await?;

    if let Err(e) = engine_task.await {
        tracing::error!(error = %e, "OverlayEngine task panicked");
    }
    Ok(())
}
