use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: operations handled. Labels: route, outcome.
pub const OPERATIONS_TOTAL: &str = "dayblocks_operations_total";

/// Histogram: operation latency in seconds. Labels: route.
pub const OPERATION_DURATION_SECONDS: &str = "dayblocks_operation_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: open client connections.
pub const CONNECTIONS_ACTIVE: &str = "dayblocks_connections_active";

/// Counter: connections accepted.
pub const CONNECTIONS_TOTAL: &str = "dayblocks_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "dayblocks_connections_rejected_total";

/// Histogram: log group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "dayblocks_wal_flush_duration_seconds";

/// Histogram: log group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "dayblocks_wal_flush_batch_size";

/// Counter: log compactions completed.
pub const COMPACTIONS_TOTAL: &str = "dayblocks_compactions_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
