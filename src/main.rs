//! Backup Center
//!
//! HTTP entry point for the site backup/restore engine.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use backupcenter::config::AppConfig;
use backupcenter::server;

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false),
        )
        .init();

    // Config path comes from the first CLI argument, defaulting to
    // config.json next to the executable / project root.
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));
    let cfg = AppConfig::load_from_json(&config_path).with_context(|| {
        format!(
            "Failed to load application configuration from {}",
            config_path.display()
        )
    })?;

    let listen_addr = cfg.listen_addr;
    let state = server::build_state(&cfg).context("Failed to initialize engine components")?;
    let app = server::router(state);

    tracing::info!(
        listen_addr = %listen_addr,
        archive_root = %cfg.archive_root.display(),
        site_root = %cfg.site.root.display(),
        "backup center listening"
    );

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {listen_addr}"))?;
    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;
    Ok(())
}
