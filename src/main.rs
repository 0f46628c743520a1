use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use timetable::clock::SystemClock;
use timetable::config::Config;
use timetable::engine::Engine;
use timetable::lifecycle::{LifecycleSweeper, RuleTable};
use timetable::scheduler::{Scheduler, COMPACT_CHECK_INTERVAL};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    timetable::observability::init(config.metrics_port);

    std::fs::create_dir_all(&config.data_dir)?;
    let engine = Arc::new(Engine::open(config.wal_path())?);
    let sweeper = Arc::new(LifecycleSweeper::new(
        engine.clone(),
        RuleTable::standard(config.lead_window_ms),
    )?);

    info!("timetable started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  sweep interval: {:?}", config.sweep_interval);
    info!("  lead window: {}ms", config.lead_window_ms);
    info!("  compact threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let scheduler = Scheduler::spawn(
        sweeper,
        Arc::new(SystemClock),
        config.sweep_interval,
        CancellationToken::new(),
    )
    .with_compactor(engine, config.compact_threshold, COMPACT_CHECK_INTERVAL);

    // Graceful shutdown: let an in-flight sweep finish on SIGTERM/ctrl-c
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    info!("shutdown signal received, stopping scheduler");
    scheduler.shutdown().await;
    info!("timetable stopped");
    Ok(())
}
