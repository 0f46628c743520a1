use std::net::SocketAddr;

// ── Lifecycle sweeps ────────────────────────────────────────────

/// Counter: completed sweep passes.
pub const SWEEPS_TOTAL: &str = "timetable_sweeps_total";

/// Histogram: sweep pass duration in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "timetable_sweep_duration_seconds";

/// Counter: status transitions applied by the sweeper. Labels: kind, to.
pub const TRANSITIONS_TOTAL: &str = "timetable_transitions_total";

/// Counter: rule rows whose update failed. Labels: kind.
pub const SWEEP_GROUP_FAILURES_TOTAL: &str = "timetable_sweep_group_failures_total";

/// Counter: scheduler ticks dropped because a sweep was still running.
pub const SWEEP_TICKS_SKIPPED_TOTAL: &str = "timetable_sweep_ticks_skipped_total";

// ── Conflict detection ──────────────────────────────────────────

/// Counter: coarse conflict queries issued to storage.
pub const CONFLICT_CHECKS_TOTAL: &str = "timetable_conflict_checks_total";

/// Counter: conflicting bookings returned by the detector.
pub const CONFLICTS_FOUND_TOTAL: &str = "timetable_conflicts_found_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL append + fsync duration in seconds.
pub const WAL_APPEND_DURATION_SECONDS: &str = "timetable_wal_append_duration_seconds";

/// Counter: WAL compactions. Labels: status.
pub const WAL_COMPACTIONS_TOTAL: &str = "timetable_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if `port` is None.
/// A failed install is logged and the service keeps running without metrics.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus metrics exporter: {e}"),
    }
}
