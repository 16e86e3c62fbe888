use std::sync::Arc;

use tracing::info;

use seatlock::config::Config;
use seatlock::engine::Engine;
use seatlock::reaper;

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    std::fs::create_dir_all(&config.data_dir)?;
    let engine = Arc::new(Engine::new(config.wal_path(), config.hold_ttl_ms)?);

    // `seatlock sweep` runs a single sweep and exits, for external schedulers.
    if std::env::args().nth(1).as_deref() == Some("sweep") {
        let expired = engine.sweep_expired_holds(reaper::now_ms()).await?;
        info!("expired {expired} holds");
        return Ok(());
    }

    seatlock::observability::init(config.metrics_port);

    info!("seatlock running");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  hold_ttl: {}s", config.hold_ttl_ms / 1_000);
    info!("  sweep_interval: {}s", config.sweep_interval.as_secs());
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let sweeper = tokio::spawn(reaper::run_sweeper(engine.clone(), config.sweep_interval));
    let compactor = tokio::spawn(reaper::run_compactor(engine.clone(), config.compact_threshold));

    shutdown_signal().await?;
    info!("shutdown signal received");
    sweeper.abort();
    compactor.abort();

    // Expire whatever lapsed since the last tick.
    let expired = reaper::sweep_once(&engine).await;
    info!("seatlock stopped ({expired} holds expired on the way out)");
    Ok(())
}
