use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use vidcat_core::models::{FinalizedEvent, RegisteredEvent};
use vidcat_core::Config;
use vidcat_worker::EventStream;

use crate::setup;

pub async fn serve(config: &Config) -> Result<()> {
    let app = setup::initialize_app(config).await?;
    let result = setup::server::run_consumers(config, app.service).await;
    app.pool.close().await;
    result
}

pub async fn delete(config: &Config, id: i64, deadline_secs: Option<u64>) -> Result<()> {
    let app = setup::initialize_app(config).await?;

    let deadline = match deadline_secs {
        Some(secs) => Instant::now() + Duration::from_secs(secs),
        None => app.service.default_deadline(),
    };
    let report = app
        .service
        .delete_asset_completely(id, deadline)
        .await
        .with_context(|| format!("Failed to delete video {}", id))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    app.pool.close().await;
    Ok(())
}

pub async fn ingest(config: &Config, stream: EventStream, file: &Path) -> Result<()> {
    let body = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let app = setup::initialize_app(config).await?;
    let video = match stream {
        EventStream::Registered => {
            let event: RegisteredEvent =
                serde_json::from_str(&body).context("Invalid registration event")?;
            app.service.register_asset(&event).await?
        }
        EventStream::Finalized => {
            let event: FinalizedEvent =
                serde_json::from_str(&body).context("Invalid finalization event")?;
            app.service.finalize_asset(&event).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&video)?);
    app.pool.close().await;
    Ok(())
}
