use std::net::SocketAddr;

use crate::engine::EngineError;

// ── Request-driven ──────────────────────────────────────────────

/// Counter: reservation operations. Labels: op, outcome (`ok` or an error code).
pub const RESERVATION_OPS_TOTAL: &str = "seatlock_reservation_ops_total";

/// Counter: holds moved to EXPIRED, by the sweeper or by a late confirm.
pub const HOLDS_EXPIRED_TOTAL: &str = "seatlock_holds_expired_total";

// ── Background work ─────────────────────────────────────────────

/// Histogram: duration of sweeps that expired at least one hold, in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "seatlock_sweep_duration_seconds";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "seatlock_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "seatlock_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "seatlock_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if port is None; a failed
/// install is logged and the process carries on without metrics.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus exporter on {port}: {e}"),
    }
}

/// Outcome label for an operation result.
pub fn outcome_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    }
}

pub fn record_op<T>(op: &'static str, result: &Result<T, EngineError>) {
    metrics::counter!(RESERVATION_OPS_TOTAL, "op" => op, "outcome" => outcome_label(result))
        .increment(1);
}
