use std::sync::Arc;

use tracing::debug;
use ulid::Ulid;

use crate::model::*;
use crate::observability::{CONFLICTS_FOUND_TOTAL, CONFLICT_CHECKS_TOTAL};

use super::{CoarseQuery, EngineError, ScheduleStore};

/// Weekday and resource refinement over coarse candidates.
///
/// `bookings` must already satisfy the coarse filter for `candidate`; this
/// keeps those that run on at least one of its weekdays and hold the same
/// teacher or room as `axis`. The date ranges only need to overlap, not to
/// contain a shared weekday.
pub fn refine(bookings: &[Booking], candidate: &RecurringSlot, axis: &ResourceRefs) -> Vec<Booking> {
    bookings
        .iter()
        .filter(|b| b.resources.shares_with(axis))
        .filter(|b| candidate.weekdays.intersects(b.slot.weekdays))
        .cloned()
        .collect()
}

/// Finds live bookings that collide with a candidate recurring slot.
pub struct ConflictDetector {
    store: Arc<dyn ScheduleStore>,
}

impl ConflictDetector {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self { store }
    }

    /// Bookings that would collide with `candidate` on `axis`.
    ///
    /// An empty weekday set or an unassigned axis has nothing to collide
    /// with, so storage is not consulted.
    pub async fn find_conflicts(
        &self,
        candidate: &RecurringSlot,
        axis: &ResourceRefs,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Booking>, EngineError> {
        if candidate.weekdays.is_empty() || axis.is_unassigned() {
            return Ok(Vec::new());
        }
        metrics::counter!(CONFLICT_CHECKS_TOTAL).increment(1);
        let coarse = self.coarse(candidate, exclude).await?;
        let conflicts = refine(&coarse, candidate, axis);
        if !conflicts.is_empty() {
            metrics::counter!(CONFLICTS_FOUND_TOTAL).increment(conflicts.len() as u64);
            for b in &conflicts {
                debug!(
                    "booking {} collides with candidate, first shared date {:?}",
                    b.id,
                    candidate.first_shared_occurrence(&b.slot)
                );
            }
        }
        Ok(conflicts)
    }

    /// Phase one only: live bookings overlapping by date range and daily window.
    pub(crate) async fn coarse(
        &self,
        candidate: &RecurringSlot,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Booking>, EngineError> {
        self.store
            .overlapping_bookings(&CoarseQuery::for_slot(candidate, exclude))
            .await
    }

    pub(crate) fn store(&self) -> &Arc<dyn ScheduleStore> {
        &self.store
    }
}
