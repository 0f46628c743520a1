//! Request/response shapes for UI collaborators. Transport-agnostic: callers
//! deserialize a request however they receive it and hand it to these
//! functions along with a store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;
use ulid::Ulid;

use crate::codec::{decode_weekdays, parse_time_of_day};
use crate::engine::{AvailabilityResolver, EngineError, ScheduleStore};
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAvailabilityRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Stored weekday encoding, e.g. `"1,3,5"`.
    pub weekdays: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_booking_id: Option<Ulid>,
}

impl CheckAvailabilityRequest {
    /// Decode into a candidate slot. An empty weekday list is allowed here;
    /// it simply finds nothing busy.
    pub fn slot(&self) -> Result<RecurringSlot, EngineError> {
        let dates = DateRange::new(self.start_date, self.end_date)?;
        let weekdays = decode_weekdays(&self.weekdays)?;
        let daily = DailyWindow::new(
            parse_time_of_day(&self.start_time)?,
            parse_time_of_day(&self.end_time)?,
        )?;
        Ok(RecurringSlot::new(dates, weekdays, daily))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherOption {
    pub id: Ulid,
    pub name: String,
    pub code: String,
    pub is_busy: bool,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomOption {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
    pub is_busy: bool,
    pub is_current: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckAvailabilityResponse {
    pub teachers: Vec<TeacherOption>,
    pub rooms: Vec<RoomOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherSummary {
    pub id: Ulid,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherLoad {
    pub teacher_id: Ulid,
    pub bookings: Vec<Ulid>,
    /// Minutes per week if every live booking ran in the same week.
    pub weekly_minutes: u32,
    /// Minutes actually scheduled on the dates asked about.
    pub total_minutes: u64,
}

/// Busy map over the whole teacher and room directory.
pub async fn check_availability(
    store: Arc<dyn ScheduleStore>,
    request: &CheckAvailabilityRequest,
) -> Result<CheckAvailabilityResponse, EngineError> {
    let slot = request.slot()?;
    let teachers = store.teachers().await?;
    let rooms = store.rooms().await?;
    let teacher_pool: Vec<Ulid> = teachers.iter().map(|t| t.id).collect();
    let room_pool: Vec<Ulid> = rooms.iter().map(|r| r.id).collect();

    let availability = AvailabilityResolver::new(store)
        .resolve(&slot, &teacher_pool, &room_pool, request.exclude_booking_id)
        .await?;

    let teachers: HashMap<Ulid, Teacher> = teachers.into_iter().map(|t| (t.id, t)).collect();
    let rooms: HashMap<Ulid, Room> = rooms.into_iter().map(|r| (r.id, r)).collect();
    let mut response = CheckAvailabilityResponse::default();
    for status in &availability.teachers {
        let Some(t) = teachers.get(&status.id) else {
            warn!("booking references teacher {} missing from the directory", status.id);
            continue;
        };
        response.teachers.push(TeacherOption {
            id: t.id,
            name: t.name.clone(),
            code: t.code.clone(),
            is_busy: status.busy,
            is_current: status.current,
        });
    }
    for status in &availability.rooms {
        let Some(r) = rooms.get(&status.id) else {
            warn!("booking references room {} missing from the directory", status.id);
            continue;
        };
        response.rooms.push(RoomOption {
            id: r.id,
            name: r.name.clone(),
            capacity: r.capacity,
            is_busy: status.busy,
            is_current: status.current,
        });
    }
    Ok(response)
}

/// Teachers free for the requested slot. The excluded booking's own teacher
/// is free unless something else collides; no current-assignment flag is
/// reported.
pub async fn check_teacher_availability(
    store: Arc<dyn ScheduleStore>,
    request: &CheckAvailabilityRequest,
) -> Result<Vec<TeacherSummary>, EngineError> {
    let slot = request.slot()?;
    let teachers = store.teachers().await?;
    let pool: Vec<Ulid> = teachers.iter().map(|t| t.id).collect();
    let availability = AvailabilityResolver::new(store)
        .resolve(&slot, &pool, &[], request.exclude_booking_id)
        .await?;

    Ok(teachers
        .into_iter()
        .filter(|t| availability.teacher(t.id).is_some_and(|s| !s.busy))
        .map(|t| TeacherSummary { id: t.id, name: t.name, code: t.code })
        .collect())
}

/// Live bookings held by `teacher_id` that touch `dates`, with the time they add up to.
pub async fn teacher_load(
    store: Arc<dyn ScheduleStore>,
    teacher_id: Ulid,
    dates: DateRange,
) -> Result<TeacherLoad, EngineError> {
    let bookings: Vec<Booking> = store
        .live_bookings_for_teacher(teacher_id)
        .await?
        .into_iter()
        .filter(|b| b.slot.dates.overlaps(&dates))
        .collect();

    let weekly_minutes = bookings.iter().map(|b| b.slot.weekly_minutes()).sum();
    let total_minutes = bookings
        .iter()
        .map(|b| {
            let in_range = b.slot.occurrences().filter(|d| dates.contains(*d)).count() as u64;
            in_range * u64::from(b.slot.daily.minutes())
        })
        .sum();

    Ok(TeacherLoad {
        teacher_id,
        bookings: bookings.iter().map(|b| b.id).collect(),
        weekly_minutes,
        total_minutes,
    })
}
