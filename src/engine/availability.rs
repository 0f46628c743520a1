use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};
use ulid::Ulid;

use crate::limits::MAX_POOL_SIZE;
use crate::model::*;
use crate::observability::CONFLICT_CHECKS_TOTAL;

use super::conflict::{refine, ConflictDetector};
use super::{EngineError, ScheduleStore};

/// Busy/current decision for one teacher or room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceStatus {
    pub id: Ulid,
    pub busy: bool,
    /// Assigned to the booking being edited.
    pub current: bool,
}

/// Pool order is preserved; a current resource outside the pool comes last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Availability {
    pub teachers: Vec<ResourceStatus>,
    pub rooms: Vec<ResourceStatus>,
}

impl Availability {
    pub fn teacher(&self, id: Ulid) -> Option<&ResourceStatus> {
        self.teachers.iter().find(|s| s.id == id)
    }

    pub fn room(&self, id: Ulid) -> Option<&ResourceStatus> {
        self.rooms.iter().find(|s| s.id == id)
    }

    pub fn free_teachers(&self) -> impl Iterator<Item = Ulid> + '_ {
        self.teachers.iter().filter(|s| !s.busy).map(|s| s.id)
    }
}

/// Deduplicate `pool` keeping first occurrences, then append `current` if missing.
fn candidates(pool: &[Ulid], current: Option<Ulid>) -> Vec<Ulid> {
    let mut seen = HashSet::with_capacity(pool.len() + 1);
    let mut out: Vec<Ulid> = pool.iter().copied().filter(|id| seen.insert(*id)).collect();
    if let Some(id) = current
        && seen.insert(id)
    {
        out.push(id);
    }
    out
}

pub struct AvailabilityResolver {
    detector: ConflictDetector,
}

impl AvailabilityResolver {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self { detector: ConflictDetector::new(store) }
    }

    /// Busy map for every pool member plus the excluded booking's current
    /// teacher and room.
    ///
    /// Fetches coarse candidates once and refines per member in memory,
    /// which decides the same as one `find_conflicts` call per member. Any
    /// storage failure fails the whole call.
    pub async fn resolve(
        &self,
        candidate: &RecurringSlot,
        teacher_pool: &[Ulid],
        room_pool: &[Ulid],
        exclude: Option<Ulid>,
    ) -> Result<Availability, EngineError> {
        if teacher_pool.len() + room_pool.len() > MAX_POOL_SIZE {
            return Err(EngineError::LimitExceeded("resource pool too large"));
        }

        let current = match exclude {
            Some(id) => self
                .detector
                .store()
                .booking(id)
                .await?
                .map(|b| b.resources)
                .unwrap_or_default(),
            None => ResourceRefs::default(),
        };

        let coarse = if candidate.weekdays.is_empty() {
            warn!("availability requested for a slot with no weekdays; every resource is free");
            Vec::new()
        } else {
            metrics::counter!(CONFLICT_CHECKS_TOTAL).increment(1);
            self.detector.coarse(candidate, exclude).await?
        };
        debug!("{} coarse candidates for availability check", coarse.len());

        let status = |axis: ResourceRefs, id: Ulid, current: Option<Ulid>| ResourceStatus {
            id,
            busy: !refine(&coarse, candidate, &axis).is_empty(),
            current: current == Some(id),
        };

        let teachers = candidates(teacher_pool, current.teacher_id)
            .into_iter()
            .map(|id| status(ResourceRefs::teacher(id), id, current.teacher_id))
            .collect();
        let rooms = candidates(room_pool, current.room_id)
            .into_iter()
            .map(|id| status(ResourceRefs::room(id), id, current.room_id))
            .collect();

        Ok(Availability { teachers, rooms })
    }
}
