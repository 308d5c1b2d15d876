//! ferryd — Ferry file-transfer daemon.

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use ferry_core::config::FerryConfig;
use ferry_services::{Storage, TransferSettings};
use ferryd::ConnectionManager;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = FerryConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = FerryConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        FerryConfig::default()
    });

    let bind = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.network.bind.clone());

    let storage = Storage::create(&config.storage.root)
        .await
        .with_context(|| format!("failed to create storage root {}", config.storage.root.display()))?;
    tracing::info!(root = %storage.root().display(), "storage ready");

    let settings = TransferSettings::from(&config.transfer);
    tracing::info!(
        chunk_size = settings.chunk_size,
        workers = settings.workers,
        max_attempts = settings.max_attempts,
        ack_timeout_ms = settings.ack_timeout.as_millis() as u64,
        "transfer settings"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    let manager = ConnectionManager::bind(&bind, storage, settings, shutdown_tx.subscribe())
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(addr = %manager.local_addr()?, "ferryd listening");

    let mut shutdown_rx = shutdown_tx.subscribe();
    let manager_task = tokio::spawn(manager.run());

    // ── Wait for exit ────────────────────────────────────────────────────────
    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = manager_task       => tracing::error!("connection manager exited: {:?}", r),
    }

    Ok(())
}
