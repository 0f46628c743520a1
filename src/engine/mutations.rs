use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::lifecycle::RuleRow;
use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, WalCommand};

fn validate_slot(slot: &RecurringSlot) -> Result<(), EngineError> {
    slot.ensure_bookable()?;
    if slot.dates.len_days() > MAX_SLOT_SPAN_DAYS {
        return Err(EngineError::LimitExceeded("booking date range too long"));
    }
    Ok(())
}

fn validate_name(name: &str, max: usize, what: &'static str) -> Result<(), EngineError> {
    if name.len() > max {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

impl Engine {
    fn validate_resources(&self, resources: &ResourceRefs) -> Result<(), EngineError> {
        if let Some(tid) = resources.teacher_id
            && !self.store.contains_teacher(&tid) {
                return Err(EngineError::UnknownResource(tid));
            }
        if let Some(rid) = resources.room_id
            && !self.store.contains_room(&rid) {
                return Err(EngineError::UnknownResource(rid));
            }
        Ok(())
    }

    pub async fn register_teacher(&self, id: Ulid, name: String, code: String) -> Result<(), EngineError> {
        validate_name(&name, MAX_NAME_LEN, "teacher name too long")?;
        validate_name(&code, MAX_CODE_LEN, "teacher code too long")?;
        let _gate = self.write_gate.lock().await;
        if self.store.contains_teacher(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.store.teacher_count() >= MAX_TEACHERS {
            return Err(EngineError::LimitExceeded("too many teachers"));
        }
        self.commit(&Event::TeacherRegistered { teacher: Teacher { id, name, code } })
            .await?;
        Ok(())
    }

    pub async fn register_room(&self, id: Ulid, name: String, capacity: u32) -> Result<(), EngineError> {
        validate_name(&name, MAX_NAME_LEN, "room name too long")?;
        let _gate = self.write_gate.lock().await;
        if self.store.contains_room(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.store.room_count() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        self.commit(&Event::RoomRegistered { room: Room { id, name, capacity } })
            .await?;
        Ok(())
    }

    /// Persist a booking. Conflicts are not checked here; the caller decides
    /// whether to accept an assignment after consulting the resolver.
    pub async fn create_booking(
        &self,
        id: Ulid,
        owner_id: Ulid,
        resources: ResourceRefs,
        slot: RecurringSlot,
    ) -> Result<Booking, EngineError> {
        validate_slot(&slot)?;
        let _gate = self.write_gate.lock().await;
        self.validate_resources(&resources)?;
        if self.store.contains_booking(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.store.booking_count() >= MAX_BOOKINGS {
            return Err(EngineError::LimitExceeded("too many bookings"));
        }
        let status = self
            .store
            .record(&owner_id)
            .map_or(Kind::ClassSession.initial_status(), |r| r.status);
        let booking = Booking { id, resources, slot, owner_id, status, removed: false };
        self.commit(&Event::BookingSaved { booking: booking.clone() }).await?;
        debug!("booking {id} created for {owner_id}");
        Ok(booking)
    }

    /// In-place edit: same id, owner and status.
    pub async fn update_booking(
        &self,
        id: Ulid,
        resources: ResourceRefs,
        slot: RecurringSlot,
    ) -> Result<Booking, EngineError> {
        validate_slot(&slot)?;
        let _gate = self.write_gate.lock().await;
        self.validate_resources(&resources)?;
        let existing = self
            .store
            .booking(&id)
            .filter(|b| !b.removed)
            .ok_or(EngineError::NotFound(id))?;
        let booking = Booking { resources, slot, ..existing };
        self.commit(&Event::BookingSaved { booking: booking.clone() }).await?;
        debug!("booking {id} updated");
        Ok(booking)
    }

    /// Logical removal. The row stays for audit but never conflicts again.
    pub async fn remove_booking(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.write_gate.lock().await;
        match self.store.booking(&id) {
            Some(b) if !b.removed => {}
            _ => return Err(EngineError::NotFound(id)),
        }
        self.commit(&Event::BookingRemoved { id }).await?;
        Ok(())
    }

    pub async fn create_record(&self, record: LifecycleRecord) -> Result<(), EngineError> {
        if record.kind.rank(record.status).is_none() {
            return Err(EngineError::InvalidStatus { kind: record.kind, status: record.status });
        }
        let _gate = self.write_gate.lock().await;
        if self.store.contains_record(&record.id) {
            return Err(EngineError::AlreadyExists(record.id));
        }
        if self.store.record_count() >= MAX_RECORDS {
            return Err(EngineError::LimitExceeded("too many lifecycle records"));
        }
        self.commit(&Event::RecordSaved { record }).await?;
        Ok(())
    }

    /// A class session is a lifecycle record plus the booking it owns, both under
/// `id`. Both land in a single log entry, so neither exists without the other.
    pub async fn create_class_session(
        &self,
        id: Ulid,
        resources: ResourceRefs,
        slot: RecurringSlot,
        lead_window: Option<Ms>,
    ) -> Result<LifecycleRecord, EngineError> {
        validate_slot(&slot)?;
        let record = LifecycleRecord::class_session(id, &slot.dates, lead_window)?;
        let _gate = self.write_gate.lock().await;
        self.validate_resources(&resources)?;
        if self.store.contains_record(&id) || self.store.contains_booking(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.store.record_count() >= MAX_RECORDS || self.store.booking_count() >= MAX_BOOKINGS {
            return Err(EngineError::LimitExceeded("too many class sessions"));
        }
        let booking = Booking {
            id,
            resources,
            slot,
            owner_id: id,
            status: record.status,
            removed: false,
        };
        self.commit(&Event::ClassSessionCreated { record: record.clone(), booking }).await?;
        info!("class session {id} scheduled {} to {}", slot.dates.start(), slot.dates.end());
        Ok(record)
    }

    /// Operator override. Cancelled records are final.
    pub async fn override_status(&self, id: Ulid, status: Status) -> Result<Transition, EngineError> {
        let _gate = self.write_gate.lock().await;
        let record = self.store.record(&id).ok_or(EngineError::NotFound(id))?;
        if record.kind.rank(status).is_none() || record.status == Status::Cancelled {
            return Err(EngineError::InvalidStatus { kind: record.kind, status });
        }
        let transitions = self.commit(&Event::StatusOverridden { id, status }).await?;
        info!("{} {id} overridden {} -> {status}", record.kind, record.status);
        transitions.into_iter().next().ok_or(EngineError::NotFound(id))
    }

    pub async fn cancel(&self, id: Ulid) -> Result<Transition, EngineError> {
        self.override_status(id, Status::Cancelled).await
    }

    /// One set-based update for a rule row: a single log entry, however many
    /// records move.
    pub(super) async fn advance(&self, row: &RuleRow, now: Ms) -> Result<Vec<Transition>, EngineError> {
        let _gate = self.write_gate.lock().await;
        let changes = self.store.due_changes(row, now);
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        self.commit(&Event::StatusesAdvanced { kind: row.kind, from: row.from, changes })
            .await
    }

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let _gate = self.write_gate.lock().await;
        let events = self.store.snapshot_events();
        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::StorageUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StorageUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let Some(wal_tx) = &self.wal_tx else {
            return 0;
        };
        let (tx, rx) = oneshot::channel();
        if wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
