//! Fixtures shared by unit tests across the crate.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Weekday};
use ulid::Ulid;

use crate::lifecycle::RuleRow;
use crate::model::*;

use super::{CoarseQuery, Engine, EngineError, ScheduleStore};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn hm(h: u32, m: u32) -> TimeOfDay {
    TimeOfDay::from_hms(h, m, 0).unwrap()
}

pub fn slot(
    start: NaiveDate,
    end: NaiveDate,
    days: &[Weekday],
    from: (u32, u32),
    to: (u32, u32),
) -> RecurringSlot {
    RecurringSlot::new(
        DateRange::new(start, end).unwrap(),
        days.iter().copied().collect(),
        DailyWindow::new(hm(from.0, from.1), hm(to.0, to.1)).unwrap(),
    )
}

/// Monday/Wednesday mornings, 08:00-09:30.
pub fn class_slot(start: NaiveDate, end: NaiveDate) -> RecurringSlot {
    slot(start, end, &[Weekday::Mon, Weekday::Wed], (8, 0), (9, 30))
}

/// Wraps an engine and injects storage failures or latency on demand.
pub struct FlakyStore {
    inner: Arc<Engine>,
    reads_down: AtomicBool,
    failing_rows: Mutex<Vec<(Kind, Status)>>,
    row_delay_ms: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    row_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<Engine>) -> Self {
        Self {
            inner,
            reads_down: AtomicBool::new(false),
            failing_rows: Mutex::new(Vec::new()),
            row_delay_ms: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            row_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_reads(&self) {
        self.reads_down.store(true, Ordering::SeqCst);
    }

    pub fn fail_row(&self, kind: Kind, from: Status) {
        self.failing_rows.lock().unwrap().push((kind, from));
    }

    pub fn slow_rows(&self, delay: Duration) {
        self.row_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.reads_down.store(false, Ordering::SeqCst);
        self.failing_rows.lock().unwrap().clear();
    }

    pub fn row_calls(&self) -> usize {
        self.row_calls.load(Ordering::SeqCst)
    }

    /// Highest number of `apply_rule_row` calls ever running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> Result<(), EngineError> {
        if self.reads_down.load(Ordering::SeqCst) {
            return Err(EngineError::StorageUnavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for FlakyStore {
    async fn overlapping_bookings(&self, query: &CoarseQuery) -> Result<Vec<Booking>, EngineError> {
        self.check_reads()?;
        self.inner.overlapping_bookings(query).await
    }

    async fn booking(&self, id: Ulid) -> Result<Option<Booking>, EngineError> {
        self.check_reads()?;
        ScheduleStore::booking(self.inner.as_ref(), id).await
    }

    async fn live_bookings_for_teacher(&self, teacher_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        self.check_reads()?;
        self.inner.live_bookings_for_teacher(teacher_id).await
    }

    async fn teachers(&self) -> Result<Vec<Teacher>, EngineError> {
        self.check_reads()?;
        ScheduleStore::teachers(self.inner.as_ref()).await
    }

    async fn rooms(&self) -> Result<Vec<Room>, EngineError> {
        self.check_reads()?;
        ScheduleStore::rooms(self.inner.as_ref()).await
    }

    async fn apply_rule_row(&self, row: &RuleRow, now: Ms) -> Result<Vec<Transition>, EngineError> {
        self.row_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = self.row_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let failing = self.failing_rows.lock().unwrap().contains(&(row.kind, row.from));
        let result = if failing {
            Err(EngineError::StorageUnavailable(format!(
                "deadlock detected updating {}/{}",
                row.kind, row.from
            )))
        } else {
            self.inner.apply_rule_row(row, now).await
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
