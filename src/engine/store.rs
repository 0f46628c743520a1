use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::lifecycle::RuleRow;
use crate::model::*;

use super::EngineError;

/// Coarse conflict filter pushed down to storage: live bookings whose date
/// range and daily window overlap the candidate's. Weekdays are not checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoarseQuery {
    pub dates: DateRange,
    pub daily: DailyWindow,
    pub exclude: Option<Ulid>,
}

impl CoarseQuery {
    pub fn for_slot(slot: &RecurringSlot, exclude: Option<Ulid>) -> Self {
        Self { dates: slot.dates, daily: slot.daily, exclude }
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        booking.is_live()
            && Some(booking.id) != self.exclude
            && self.dates.overlaps(&booking.slot.dates)
            && self.daily.overlaps(&booking.slot.daily)
    }
}

/// What the conflict detector, availability resolver and sweeper need from
/// durable storage. Every call is all-or-nothing; storage failures surface
/// as [`EngineError::StorageUnavailable`].
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn overlapping_bookings(&self, query: &CoarseQuery) -> Result<Vec<Booking>, EngineError>;

    async fn booking(&self, id: Ulid) -> Result<Option<Booking>, EngineError>;

    async fn live_bookings_for_teacher(&self, teacher_id: Ulid) -> Result<Vec<Booking>, EngineError>;

    async fn teachers(&self) -> Result<Vec<Teacher>, EngineError>;

    async fn rooms(&self) -> Result<Vec<Room>, EngineError>;

    /// Set-based update: move every record of `(row.kind, row.from)` whose
    /// first matching rule fires at `now`, in one commit.
    async fn apply_rule_row(&self, row: &RuleRow, now: Ms) -> Result<Vec<Transition>, EngineError>;
}

/// Row storage. Each DashMap entry is the unit of atomicity.
pub struct InMemoryStore {
    bookings: DashMap<Ulid, Booking>,
    /// Owner (class session) → bookings it owns.
    owned: DashMap<Ulid, Vec<Ulid>>,
    records: DashMap<Ulid, LifecycleRecord>,
    teachers: DashMap<Ulid, Teacher>,
    rooms: DashMap<Ulid, Room>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
            owned: DashMap::new(),
            records: DashMap::new(),
            teachers: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    // ── Reads ────────────────────────────────────────────────

    pub fn booking(&self, id: &Ulid) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    pub fn record(&self, id: &Ulid) -> Option<LifecycleRecord> {
        self.records.get(id).map(|e| e.value().clone())
    }

    pub fn teacher(&self, id: &Ulid) -> Option<Teacher> {
        self.teachers.get(id).map(|e| e.value().clone())
    }

    pub fn room(&self, id: &Ulid) -> Option<Room> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn contains_booking(&self, id: &Ulid) -> bool {
        self.bookings.contains_key(id)
    }

    pub fn contains_record(&self, id: &Ulid) -> bool {
        self.records.contains_key(id)
    }

    pub fn contains_teacher(&self, id: &Ulid) -> bool {
        self.teachers.contains_key(id)
    }

    pub fn contains_room(&self, id: &Ulid) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn teacher_count(&self) -> usize {
        self.teachers.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Sorted by name, then id.
    pub fn teachers(&self) -> Vec<Teacher> {
        let mut out: Vec<Teacher> = self.teachers.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    pub fn rooms(&self) -> Vec<Room> {
        let mut out: Vec<Room> = self.rooms.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    pub fn records(&self) -> Vec<LifecycleRecord> {
        let mut out: Vec<LifecycleRecord> = self.records.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|r| r.id);
        out
    }

    pub fn overlapping_bookings(&self, query: &CoarseQuery) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|e| query.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|b| b.id);
        out
    }

    pub fn live_bookings_for_teacher(&self, teacher_id: &Ulid) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|e| e.is_live() && e.resources.teacher_id.as_ref() == Some(teacher_id))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|b| b.id);
        out
    }

    /// Records the row would move at `now`, with their targets. Read-only.
    pub fn due_changes(&self, row: &RuleRow, now: Ms) -> Vec<(Ulid, Status)> {
        let mut out: Vec<(Ulid, Status)> = self
            .records
            .iter()
            .filter_map(|e| row.evaluate(now, e.value()).map(|to| (*e.key(), to)))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    // ── Event application ────────────────────────────────────

    /// Apply a logged event. Returns the status transitions it caused, if any.
    pub fn apply_event(&self, event: &Event) -> Vec<Transition> {
        match event {
            Event::TeacherRegistered { teacher } => {
                self.teachers.insert(teacher.id, teacher.clone());
                Vec::new()
            }
            Event::RoomRegistered { room } => {
                self.rooms.insert(room.id, room.clone());
                Vec::new()
            }
            Event::BookingSaved { booking } => {
                self.save_booking(booking);
                Vec::new()
            }
            Event::BookingRemoved { id } => {
                if let Some(mut b) = self.bookings.get_mut(id) {
                    b.removed = true;
                }
                Vec::new()
            }
            Event::RecordSaved { record } => {
                self.records.insert(record.id, record.clone());
                Vec::new()
            }
            Event::ClassSessionCreated { record, booking } => {
                self.records.insert(record.id, record.clone());
                self.save_booking(booking);
                Vec::new()
            }
            Event::StatusesAdvanced { kind, from, changes } => changes
                .iter()
                .filter_map(|(id, to)| self.set_status(*id, Some((*kind, *from)), *to))
                .collect(),
            Event::StatusOverridden { id, status } => {
                self.set_status(*id, None, *status).into_iter().collect()
            }
        }
    }

    fn save_booking(&self, booking: &Booking) {
        let mut owned = self.owned.entry(booking.owner_id).or_default();
        if !owned.contains(&booking.id) {
            owned.push(booking.id);
        }
        drop(owned);
        self.bookings.insert(booking.id, booking.clone());
    }

    /// Compare-and-set on a record's status. With `expect`, only a record of
    /// that kind still in that status moves. The new status is mirrored onto
    /// the bookings the record owns.
    fn set_status(&self, id: Ulid, expect: Option<(Kind, Status)>, to: Status) -> Option<Transition> {
        let transition = {
            let mut rec = self.records.get_mut(&id)?;
            if let Some((kind, from)) = expect
                && (rec.kind != kind || rec.status != from) {
                    return None;
                }
            let from = rec.status;
            rec.status = to;
            Transition { id, kind: rec.kind, from, to }
        };
        let owned = self.owned.get(&id).map(|e| e.value().clone()).unwrap_or_default();
        for booking_id in owned {
            if let Some(mut b) = self.bookings.get_mut(&booking_id) {
                b.status = to;
            }
        }
        Some(transition)
    }

    /// Minimal event list that recreates the current state.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        events.extend(self.teachers().into_iter().map(|teacher| Event::TeacherRegistered { teacher }));
        events.extend(self.rooms().into_iter().map(|room| Event::RoomRegistered { room }));
        events.extend(self.records().into_iter().map(|record| Event::RecordSaved { record }));
        let mut bookings: Vec<Booking> = self.bookings.iter().map(|e| e.value().clone()).collect();
        bookings.sort_by_key(|b| b.id);
        events.extend(bookings.into_iter().map(|booking| Event::BookingSaved { booking }));
        events
    }
}
