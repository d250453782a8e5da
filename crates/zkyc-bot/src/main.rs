use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use zkyc_analyzers::Analyzers;
use zkyc_core::{MemorySessionStore, Orchestrator, OrchestratorSettings, RecordStore};

mod config;
mod flow;
mod messages;
mod platform;
mod telegram;

use config::Config;
use flow::Conversation;
use telegram::TelegramClient;

/// Pause after a failed `getUpdates` before polling again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("zkyc-bot starting");

    let config = Config::from_env()?;
    tracing::debug!(?config, "configuration loaded");

    let analyzers =
        Analyzers::from_config(&config.analyzers).context("failed to set up analyzer clients")?;
    let health = analyzers.vision.health().await;
    if health.runtime_available {
        tracing::info!(
            model = %config.analyzers.vision_model,
            model_available = ?health.model_available,
            "vision runtime reachable"
        );
    } else {
        tracing::warn!(error = ?health.error, "vision runtime unreachable; extraction will fail");
    }

    std::fs::create_dir_all(&config.uploads_dir).with_context(|| {
        format!(
            "failed to create uploads directory {}",
            config.uploads_dir.display()
        )
    })?;

    let orchestrator = Orchestrator::new(
        analyzers.faces,
        analyzers.ocr,
        analyzers.vision,
        RecordStore::new(config.uploads_dir.clone()),
        OrchestratorSettings {
            scratch_root: config.scratch_root(),
            ..OrchestratorSettings::default()
        },
    );

    let client = Arc::new(
        TelegramClient::new(
            &config.api_base,
            &config.token,
            Duration::from_secs(config.poll_timeout_secs),
        )
        .context("failed to build Telegram client")?,
    );
    let conversation = Arc::new(Conversation::new(
        client.clone(),
        Arc::new(MemorySessionStore::new()),
        Arc::new(orchestrator),
    ));

    tracing::info!("zkyc-bot ready");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut offset = 0;

    loop {
        let updates = tokio::select! {
            result = &mut shutdown => {
                result.context("failed to listen for ctrl-c")?;
                break;
            }
            updates = client.get_updates(offset) => updates,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!(error = %e, "getUpdates failed");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(event) = update.into_event() else {
                continue;
            };
            let conversation = conversation.clone();
            tokio::spawn(async move {
                if let Err(e) = conversation.handle(event).await {
                    tracing::warn!(error = %e, "failed to handle update");
                }
            });
        }
    }

    tracing::info!("zkyc-bot shutting down");
    Ok(())
}
