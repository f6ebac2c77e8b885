//! FarmClassifieds bootstrap
//!
//! Prepares a deployment: loads configuration, migrates the database,
//! checks media storage, creates the admin user and reports the moderation
//! backlog.

use farmclassifieds::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.default_directive().into());

    if config.logging.is_json() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting FarmClassifieds...");
    tracing::info!(
        database = %config.database.path.display(),
        backend = ?config.storage.media.backend,
        webp = config.media.webp_enabled && cfg!(feature = "webp"),
        "Configuration loaded"
    );

    // 3. Initialize metrics
    farmclassifieds::metrics::init_metrics();

    // 4. Initialize application state
    let state = AppState::new(config).await?;

    // 5. Report moderation backlog
    let pending = state.db.get_pending_listings().await?;
    let flagged = state.db.get_flagged_listings().await?;
    farmclassifieds::metrics::LISTINGS_PENDING.set(pending.len() as i64);
    tracing::info!(
        pending = pending.len(),
        flagged = flagged.len(),
        "Moderation queue"
    );

    tracing::debug!(metrics = %farmclassifieds::metrics::gather_text()?, "Metrics snapshot");
    tracing::info!("Bootstrap complete");

    Ok(())
}
