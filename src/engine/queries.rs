use ulid::Ulid;

use crate::model::*;

use super::Engine;

impl Engine {
    pub fn get_booking(&self, id: &Ulid) -> Option<Booking> {
        self.store.booking(id)
    }

    pub fn get_record(&self, id: &Ulid) -> Option<LifecycleRecord> {
        self.store.record(id)
    }

    /// Records of `kind` currently in `status`, ordered by id.
    pub fn records_in(&self, kind: Kind, status: Status) -> Vec<LifecycleRecord> {
        self.store
            .records()
            .into_iter()
            .filter(|r| r.kind == kind && r.status == status)
            .collect()
    }
}
