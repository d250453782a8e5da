use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use zkyc_analyzers::Analyzers;
use zkyc_core::{Orchestrator, OrchestratorSettings, RecordStore};

mod config;
mod http_interface;

use config::Config;
use http_interface::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("zkycd starting");

    let config = Config::load()?;
    let analyzers =
        Analyzers::from_config(&config.analyzers).context("failed to set up analyzer clients")?;

    std::fs::create_dir_all(&config.uploads_dir).with_context(|| {
        format!(
            "failed to create uploads directory {}",
            config.uploads_dir.display()
        )
    })?;

    let settings = OrchestratorSettings {
        scratch_root: config.scratch_root(),
        ocr_min_confidence: config.ocr_min_confidence,
        ..OrchestratorSettings::default()
    };
    let orchestrator = Orchestrator::new(
        analyzers.faces,
        analyzers.ocr,
        analyzers.vision,
        RecordStore::new(config.uploads_dir.clone()),
        settings,
    );
    let state = Arc::new(AppState {
        orchestrator,
        id_extractor: config.id_extractor,
    });
    let app = http_interface::router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!(
        addr = %config.bind,
        extractor = ?config.id_extractor,
        uploads = %config.uploads_dir.display(),
        "zkycd ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("zkycd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
    }
}
