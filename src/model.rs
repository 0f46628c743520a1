use std::fmt;
use std::iter;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Unix milliseconds. The only instant type.
pub type Ms = i64;

pub const SECOND_MS: Ms = 1_000;
pub const MINUTE_MS: Ms = 60 * SECOND_MS;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

const SECONDS_PER_DAY: u32 = 86_400;

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// Midnight (UTC) at the start of `date`.
pub fn day_start_ms(date: NaiveDate) -> Ms {
    (date.num_days_from_ce() as i64 - UNIX_EPOCH_DAYS_FROM_CE) * DAY_MS
}

/// Calendar date (UTC) containing the instant `t`.
pub fn date_of(t: Ms) -> Option<NaiveDate> {
    let days = t.div_euclid(DAY_MS) + UNIX_EPOCH_DAYS_FROM_CE;
    NaiveDate::from_num_days_from_ce_opt(i32::try_from(days).ok()?)
}

// ── Temporal value types ─────────────────────────────────────────

/// Wall-clock time within a day, no date component. Seconds since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);

    pub fn from_hms(hour: u32, minute: u32, second: u32) -> Result<Self, EngineError> {
        if hour >= 24 || minute >= 60 || second >= 60 {
            return Err(EngineError::InvalidTime(format!(
                "{hour:02}:{minute:02}:{second:02}"
            )));
        }
        Ok(Self(hour * 3600 + minute * 60 + second))
    }

    pub fn from_seconds(seconds: u32) -> Result<Self, EngineError> {
        if seconds >= SECONDS_PER_DAY {
            return Err(EngineError::InvalidTime(format!("{seconds}s past midnight")));
        }
        Ok(Self(seconds))
    }

    pub fn seconds(self) -> u32 {
        self.0
    }

    pub fn hour(self) -> u32 {
        self.0 / 3600
    }

    pub fn minute(self) -> u32 {
        (self.0 / 60) % 60
    }

    pub fn second(self) -> u32 {
        self.0 % 60
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour(), self.minute(), self.second())
    }
}

impl std::str::FromStr for TimeOfDay {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::codec::parse_time_of_day(s)
    }
}

/// Half-open daily window `[start, end)`. Never spans midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DailyWindow {
    start: TimeOfDay,
    end: TimeOfDay,
}

impl DailyWindow {
    /// Zero-length and overnight windows are rejected, not normalized.
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Result<Self, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> TimeOfDay {
        self.start
    }

    pub fn end(&self) -> TimeOfDay {
        self.end
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &DailyWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn minutes(&self) -> u32 {
        (self.end.0 - self.start.0) / 60
    }
}

const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn weekday_bit(day: Weekday) -> u8 {
    1 << day.num_days_from_monday()
}

/// Set of weekdays. Sunday has exactly one representation here; the storage
/// encoding is canonicalized in [`crate::codec`] before it reaches this type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: WeekdaySet = WeekdaySet(0);
    pub const ALL: WeekdaySet = WeekdaySet(0b111_1111);

    pub fn from_days(days: impl IntoIterator<Item = Weekday>) -> Self {
        let mut set = Self::EMPTY;
        for day in days {
            set.insert(day);
        }
        set
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= weekday_bit(day);
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & weekday_bit(day) != 0
    }

    pub fn intersection(self, other: WeekdaySet) -> WeekdaySet {
        WeekdaySet(self.0 & other.0)
    }

    pub fn intersects(self, other: WeekdaySet) -> bool {
        !self.intersection(other).is_empty()
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Monday first.
    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        ALL_WEEKDAYS.into_iter().filter(move |d| self.contains(*d))
    }
}

impl fmt::Debug for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        Self::from_days(iter)
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, EngineError> {
        if end < start {
            return Err(EngineError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    /// The shared sub-range, if any.
    pub fn intersection(&self, other: &DateRange) -> Option<DateRange> {
        if !self.overlaps(other) {
            return None;
        }
        Some(DateRange {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        iter::successors(Some(self.start), |d| d.succ_opt()).take_while(move |d| *d <= end)
    }
}

// ── Recurring slot ───────────────────────────────────────────────

/// Every occurrence of `weekdays` within `dates`, each occupying `daily`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecurringSlot {
    pub dates: DateRange,
    pub weekdays: WeekdaySet,
    pub daily: DailyWindow,
}

impl RecurringSlot {
    pub fn new(dates: DateRange, weekdays: WeekdaySet, daily: DailyWindow) -> Self {
        Self { dates, weekdays, daily }
    }

    /// An empty weekday set has no occurrences and can't be booked.
    pub fn ensure_bookable(&self) -> Result<(), EngineError> {
        if self.weekdays.is_empty() {
            return Err(EngineError::EmptyWeekdaySet);
        }
        Ok(())
    }

    pub fn occurrences(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let weekdays = self.weekdays;
        self.dates.days().filter(move |d| weekdays.contains(d.weekday()))
    }

    /// Date-range and daily-window overlap only. Over-approximates conflicts.
    pub fn coarse_overlaps(&self, other: &RecurringSlot) -> bool {
        self.dates.overlaps(&other.dates) && self.daily.overlaps(&other.daily)
    }

    /// First calendar date on which both slots occur with overlapping windows.
    pub fn first_shared_occurrence(&self, other: &RecurringSlot) -> Option<NaiveDate> {
        if !self.daily.overlaps(&other.daily) {
            return None;
        }
        let shared = self.weekdays.intersection(other.weekdays);
        if shared.is_empty() {
            return None;
        }
        // A full week of the shared range visits every weekday once.
        self.dates
            .intersection(&other.dates)?
            .days()
            .take(7)
            .find(|d| shared.contains(d.weekday()))
    }

    pub fn weekly_minutes(&self) -> u32 {
        self.daily.minutes() * self.weekdays.len()
    }
}

// ── Directory ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: Ulid,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
}

// ── Bookings ─────────────────────────────────────────────────────

/// Optional teacher/room references. An unassigned axis is never busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResourceRefs {
    pub teacher_id: Option<Ulid>,
    pub room_id: Option<Ulid>,
}

impl ResourceRefs {
    pub fn teacher(id: Ulid) -> Self {
        Self { teacher_id: Some(id), room_id: None }
    }

    pub fn room(id: Ulid) -> Self {
        Self { teacher_id: None, room_id: Some(id) }
    }

    pub fn is_unassigned(&self) -> bool {
        self.teacher_id.is_none() && self.room_id.is_none()
    }

    /// True when both sides name the same non-null teacher or the same non-null room.
    pub fn shares_with(&self, other: &ResourceRefs) -> bool {
        let same = |a: Option<Ulid>, b: Option<Ulid>| matches!((a, b), (Some(x), Some(y)) if x == y);
        same(self.teacher_id, other.teacher_id) || same(self.room_id, other.room_id)
    }
}

/// A recurring slot paired with the resources it occupies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub resources: ResourceRefs,
    pub slot: RecurringSlot,
    /// The class session this booking belongs to.
    pub owner_id: Ulid,
    /// Mirrors the owner's lifecycle status.
    pub status: Status,
    /// Logical deletion; removed bookings are kept for audit.
    pub removed: bool,
}

impl Booking {
    pub fn is_live(&self) -> bool {
        !self.removed && self.status.holds_resources()
    }
}

// ── Lifecycle ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
    ClassSession,
    QuizSession,
}

impl Kind {
    pub const ALL: [Kind; 2] = [Kind::ClassSession, Kind::QuizSession];

    /// Position of `status` in this kind's forward order. `None` if the
    /// status does not belong to the kind.
    pub fn rank(self, status: Status) -> Option<u8> {
        use Status::*;
        match (self, status) {
            (Kind::ClassSession, Recruiting) => Some(0),
            (Kind::ClassSession, Upcoming) => Some(1),
            (Kind::ClassSession, Active) => Some(2),
            (Kind::ClassSession, Finished) => Some(3),
            (Kind::ClassSession, Cancelled) => Some(4),
            (Kind::QuizSession, Upcoming) => Some(0),
            (Kind::QuizSession, Ongoing) => Some(1),
            (Kind::QuizSession, Finished) => Some(2),
            (Kind::QuizSession, Cancelled) => Some(3),
            _ => None,
        }
    }

    pub fn initial_status(self) -> Status {
        match self {
            Kind::ClassSession => Status::Recruiting,
            Kind::QuizSession => Status::Upcoming,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Kind::ClassSession => "class_session",
            Kind::QuizSession => "quiz_session",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    Recruiting,
    Upcoming,
    Active,
    Ongoing,
    Finished,
    Cancelled,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Finished | Status::Cancelled)
    }

    /// Statuses under which a class session still occupies its teacher and room.
    pub fn holds_resources(self) -> bool {
        matches!(self, Status::Recruiting | Status::Upcoming | Status::Active)
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Recruiting => "recruiting",
            Status::Upcoming => "upcoming",
            Status::Active => "active",
            Status::Ongoing => "ongoing",
            Status::Finished => "finished",
            Status::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An entity advanced through its state machine as time passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    pub id: Ulid,
    pub kind: Kind,
    pub status: Status,
    pub start_anchor: Ms,
    /// `None` means the record never finishes by time alone.
    pub end_anchor: Option<Ms>,
    pub lead_window: Option<Ms>,
}

impl LifecycleRecord {
    pub fn new(
        id: Ulid,
        kind: Kind,
        start_anchor: Ms,
        end_anchor: Option<Ms>,
        lead_window: Option<Ms>,
    ) -> Result<Self, EngineError> {
        if let Some(end) = end_anchor
            && end < start_anchor {
                return Err(EngineError::InvalidAnchors { start: start_anchor, end });
            }
        if let Some(lead) = lead_window
            && lead < 0 {
                return Err(EngineError::InvalidLeadWindow(lead));
            }
        Ok(Self {
            id,
            kind,
            status: kind.initial_status(),
            start_anchor,
            end_anchor,
            lead_window,
        })
    }

    /// Anchors cover whole days: from midnight of the first date through the
    /// last millisecond of the final date.
    pub fn class_session(id: Ulid, dates: &DateRange, lead_window: Option<Ms>) -> Result<Self, EngineError> {
        let start = day_start_ms(dates.start());
        let end = day_start_ms(dates.end()) + DAY_MS - 1;
        Self::new(id, Kind::ClassSession, start, Some(end), lead_window)
    }

    pub fn quiz_session(id: Ulid, start: Ms, end: Option<Ms>) -> Result<Self, EngineError> {
        Self::new(id, Kind::QuizSession, start, end, None)
    }
}

/// One applied status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub id: Ulid,
    pub kind: Kind,
    pub from: Status,
    pub to: Status,
}

// ── WAL record format ────────────────────────────────────────────

/// Flat, no nesting beyond the domain records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TeacherRegistered { teacher: Teacher },
    RoomRegistered { room: Room },
    /// Create or in-place edit.
    BookingSaved { booking: Booking },
    BookingRemoved { id: Ulid },
    RecordSaved { record: LifecycleRecord },
    /// A class session's record and the booking it owns, logged as one entry.
    ClassSessionCreated { record: LifecycleRecord, booking: Booking },
    /// One set-based rule-row update. Each change only applies to records
    /// still in `from`.
    StatusesAdvanced { kind: Kind, from: Status, changes: Vec<(Ulid, Status)> },
    StatusOverridden { id: Ulid, status: Status },
}
