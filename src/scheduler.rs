use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::engine::Engine;
use crate::lifecycle::LifecycleSweeper;
use crate::observability::{SWEEP_TICKS_SKIPPED_TOTAL, WAL_COMPACTIONS_TOTAL};

pub const DEFAULT_CADENCE: Duration = Duration::from_secs(60);

/// How often the compactor checks the WAL size.
pub const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background tasks driving the sweeper (and optionally WAL compaction),
/// all stopped by one cancellation token.
pub struct Scheduler {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn spawn(
        sweeper: Arc<LifecycleSweeper>,
        clock: Arc<dyn Clock>,
        cadence: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let task = tokio::spawn(run_sweeper(sweeper, clock, cadence, shutdown.clone()));
        Self { shutdown, tasks: vec![task] }
    }

    /// Also compact `engine`'s WAL once it has `threshold` appends. Zero disables.
    pub fn with_compactor(mut self, engine: Arc<Engine>, threshold: u64, check_every: Duration) -> Self {
        let task = tokio::spawn(run_compactor(engine, threshold, check_every, self.shutdown.clone()));
        self.tasks.push(task);
        self
    }

    /// Cancel and wait. An in-flight sweep runs to completion first.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                error!("scheduler task panicked: {e}");
            }
        }
    }
}

/// Sweep every `cadence` until cancelled.
///
/// The sweep is awaited inline, so passes never overlap; ticks that come due
/// while a pass is running are skipped, not queued.
pub async fn run_sweeper(
    sweeper: Arc<LifecycleSweeper>,
    clock: Arc<dyn Clock>,
    cadence: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(cadence);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_tick = None;
    info!("lifecycle sweeper started, cadence {cadence:?}");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            tick = interval.tick() => {
                if let Some(prev) = last_tick {
                    let gap: Duration = tick - prev;
                    let missed = (gap.as_nanos() / cadence.as_nanos().max(1)).saturating_sub(1);
                    if missed > 0 {
                        warn!("sweep overran its cadence, skipped {missed} tick(s)");
                        metrics::counter!(SWEEP_TICKS_SKIPPED_TOTAL).increment(missed as u64);
                    }
                }
                last_tick = Some(tick);

                let report = sweeper.sweep(clock.now_ms()).await;
                debug!(
                    "sweep advanced {} record(s), {} group(s) failed",
                    report.total(),
                    report.failed.len()
                );
            }
        }
    }
    info!("lifecycle sweeper stopped");
}

pub async fn run_compactor(
    engine: Arc<Engine>,
    threshold: u64,
    check_every: Duration,
    shutdown: CancellationToken,
) {
    if threshold == 0 {
        return;
    }
    let mut interval = tokio::time::interval(check_every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let appends = engine.wal_appends_since_compact().await;
                if appends < threshold {
                    continue;
                }
                match engine.compact_wal().await {
                    Ok(()) => {
                        info!("compacted WAL after {appends} appends");
                        metrics::counter!(WAL_COMPACTIONS_TOTAL, "status" => "ok").increment(1);
                    }
                    Err(e) => {
                        error!("WAL compaction failed: {e}");
                        metrics::counter!(WAL_COMPACTIONS_TOTAL, "status" => "error").increment(1);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::testing::FlakyStore;
    use crate::engine::ScheduleStore;
    use crate::lifecycle::RuleTable;
    use crate::model::*;
    use std::path::PathBuf;
    use ulid::Ulid;

    const NOW: Ms = 800 * DAY_MS;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("timetable_test_scheduler");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    async fn due_quiz(engine: &Engine) -> Ulid {
        let rec = LifecycleRecord::quiz_session(Ulid::new(), NOW - HOUR_MS, Some(NOW + HOUR_MS)).unwrap();
        let id = rec.id;
        engine.create_record(rec).await.unwrap();
        id
    }

    fn sweeper(store: Arc<dyn ScheduleStore>) -> Arc<LifecycleSweeper> {
        Arc::new(LifecycleSweeper::new(store, RuleTable::default()).unwrap())
    }

    #[tokio::test]
    async fn sweeps_on_cadence_with_clock_time() {
        let engine = Arc::new(Engine::in_memory());
        let id = due_quiz(&engine).await;
        let clock = Arc::new(ManualClock::new(NOW - 2 * HOUR_MS));
        let scheduler = Scheduler::spawn(
            sweeper(engine.clone()),
            clock.clone(),
            Duration::from_millis(10),
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.get_record(&id).unwrap().status, Status::Upcoming);

        clock.set(NOW);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.get_record(&id).unwrap().status, Status::Ongoing);

        clock.advance(2 * HOUR_MS);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.get_record(&id).unwrap().status, Status::Finished);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn slow_sweeps_never_overlap() {
        let engine = Arc::new(Engine::in_memory());
        let flaky = Arc::new(FlakyStore::new(engine));
        flaky.slow_rows(Duration::from_millis(10));
        let scheduler = Scheduler::spawn(
            sweeper(flaky.clone()),
            Arc::new(ManualClock::new(NOW)),
            Duration::from_millis(5),
            CancellationToken::new(),
        );
        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.shutdown().await;
        assert!(flaky.row_calls() >= 5);
        assert_eq!(flaky.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn nothing_runs_after_shutdown() {
        let engine = Arc::new(Engine::in_memory());
        let flaky = Arc::new(FlakyStore::new(engine));
        let token = CancellationToken::new();
        let scheduler = Scheduler::spawn(
            sweeper(flaky.clone()),
            Arc::new(ManualClock::new(NOW)),
            Duration::from_millis(5),
            token.clone(),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.shutdown().await;
        assert!(token.is_cancelled());

        let calls = flaky.row_calls();
        assert!(calls > 0);
        // Every started pass finished all rows.
        assert_eq!(calls % RuleTable::default().rows().len(), 0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(flaky.row_calls(), calls);
    }

    #[tokio::test]
    async fn compactor_rewrites_wal_past_threshold() {
        let path = test_wal_path("compactor.wal");
        let engine = Arc::new(Engine::open(path.clone()).unwrap());
        for _ in 0..3 {
            due_quiz(&engine).await;
        }
        // Nothing is due yet, so only the three creations are logged.
        let scheduler = Scheduler::spawn(
            sweeper(engine.clone()),
            Arc::new(ManualClock::new(NOW - 2 * HOUR_MS)),
            Duration::from_millis(5),
            CancellationToken::new(),
        )
        .with_compactor(engine.clone(), 3, Duration::from_millis(5));

        let mut compacted = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if engine.wal_appends_since_compact().await == 0 {
                compacted = true;
                break;
            }
        }
        scheduler.shutdown().await;
        assert!(compacted);

        drop(engine);
        assert_eq!(crate::wal::Wal::replay(&path).unwrap().len(), 3);
        let reopened = Engine::open(path).unwrap();
        assert_eq!(reopened.records_in(Kind::QuizSession, Status::Upcoming).len(), 3);
    }
}
