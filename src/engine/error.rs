use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{Kind, Ms, Status, TimeOfDay};

#[derive(Debug)]
pub enum EngineError {
    /// Daily window with `start >= end` (zero length or spanning midnight).
    InvalidWindow { start: TimeOfDay, end: TimeOfDay },
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    InvalidTime(String),
    InvalidWeekdayToken(String),
    InvalidAnchors { start: Ms, end: Ms },
    InvalidLeadWindow(Ms),
    /// A slot with no weekdays has no occurrences and can't be booked.
    EmptyWeekdaySet,
    InvalidStatus { kind: Kind, status: Status },
    NotFound(Ulid),
    AlreadyExists(Ulid),
    UnknownResource(Ulid),
    LimitExceeded(&'static str),
    InvalidRuleTable(String),
    StorageUnavailable(String),
    SweepGroupFailed { kind: Kind, from: Status, reason: String },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidWindow { start, end } => {
                write!(f, "invalid daily window {start}-{end}: start must be before end on the same day")
            }
            EngineError::InvalidDateRange { start, end } => {
                write!(f, "invalid date range: end {end} is before start {start}")
            }
            EngineError::InvalidTime(s) => write!(f, "invalid time of day: {s}"),
            EngineError::InvalidWeekdayToken(t) => write!(f, "invalid weekday token: {t:?}"),
            EngineError::InvalidAnchors { start, end } => {
                write!(f, "invalid anchors: end {end} is before start {start}")
            }
            EngineError::InvalidLeadWindow(lead) => write!(f, "invalid lead window: {lead}ms"),
            EngineError::EmptyWeekdaySet => write!(f, "weekday set is empty"),
            EngineError::InvalidStatus { kind, status } => {
                write!(f, "status {status} does not apply to {kind}")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::UnknownResource(id) => write!(f, "unknown teacher or room: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::InvalidRuleTable(msg) => write!(f, "invalid rule table: {msg}"),
            EngineError::StorageUnavailable(e) => write!(f, "storage unavailable: {e}"),
            EngineError::SweepGroupFailed { kind, from, reason } => {
                write!(f, "sweep of {kind}/{from} failed: {reason}")
            }
        }
    }
}

impl std::error::Error for EngineError {}
