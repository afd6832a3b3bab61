use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use roomledger::config::LedgerConfig;
use roomledger::engine::Ledger;
use roomledger::notify::NotifyHub;
use roomledger::reaper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = LedgerConfig::from_env();
    roomledger::observability::init(config.metrics_port)?;

    info!("roomledger starting");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  horizon: {} days", config.horizon_days);
    info!("  hold ttl: {:?}", config.hold_ttl);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let compact_threshold = config.compact_threshold;
    let ledger = Arc::new(Ledger::open(config, Arc::new(NotifyHub::new()))?);
    if ledger.replayed_events() as u64 >= compact_threshold {
        ledger.compact_wal().await?;
    }

    let reaper_task = tokio::spawn(reaper::run_reaper(ledger.clone()));
    let retention_task = tokio::spawn(reaper::run_retention(ledger.clone()));

    // Graceful shutdown on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }
    info!("shutdown signal received, stopping background tasks");

    reaper_task.abort();
    retention_task.abort();
    let _ = reaper_task.await;
    let _ = retention_task.await;

    match ledger.compact_wal().await {
        Ok(n) => info!("final compaction wrote {n} events"),
        Err(e) => tracing::warn!("final compaction skipped: {e}"),
    }
    info!("roomledger stopped");
    Ok(())
}
