//! Serve configuration repositories over HTTP.
//!
//! Settings are read from the file named by `REMOTE_CONFIG_FILE` (optional)
//! and `REMOTE_CONFIG__*` environment variables. Logging is controlled with
//! `RUST_LOG`.

use remote_config::prelude::*;
use remote_config::settings::{SETTINGS_FILE_ENV, Settings};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "remote_config=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings_path = std::env::var_os(SETTINGS_FILE_ENV).map(PathBuf::from);
    let settings = Settings::load(settings_path.as_deref())?;

    tracing::info!(
        listen_address = %settings.listen_address,
        repositories = settings.repositories.len(),
        interval_secs = settings.refresh_interval_secs,
        "Configuration loaded"
    );

    let mut builder = Server::builder()
        .with_repositories(settings.build_repositories()?)
        .with_refresh_interval(settings.refresh_interval())
        .with_shutdown_timeout(settings.shutdown_timeout())
        .with_read_timeout(settings.read_timeout())
        .with_request_timeout(settings.request_timeout());
    if let Some(key) = &settings.auth_key {
        builder = builder.with_auth_key(key.clone());
    } else {
        tracing::warn!("No auth key configured, repository routes are public");
    }

    let server = builder.build().await?;
    server.start_with_graceful_shutdown(&settings.listen_address).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
