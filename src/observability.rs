use std::net::SocketAddr;

// ── Booking flow ────────────────────────────────────────────────

/// Counter: hold lifecycle transitions. Labels: outcome
/// (placed, rejected, confirmed, released, expired, cancelled).
pub const HOLDS_TOTAL: &str = "roomledger_holds_total";

/// Gauge: holds currently in the `Issued` state.
pub const HOLDS_LIVE: &str = "roomledger_holds_live";

/// Counter: holds released by the reaper after expiry.
pub const HOLDS_REAPED_TOTAL: &str = "roomledger_holds_reaped_total";

/// Counter: settled hold records dropped from memory.
pub const HOLDS_PURGED_TOTAL: &str = "roomledger_holds_purged_total";

// ── Search ──────────────────────────────────────────────────────

/// Counter: searches answered.
pub const SEARCHES_TOTAL: &str = "roomledger_searches_total";

/// Histogram: search latency in seconds.
pub const SEARCH_DURATION_SECONDS: &str = "roomledger_search_duration_seconds";

// ── Storage ─────────────────────────────────────────────────────

/// Counter: room-nights dropped by the retention task.
pub const NIGHTS_RETIRED_TOTAL: &str = "roomledger_nights_retired_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomledger_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomledger_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
