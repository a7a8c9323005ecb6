//! In-process collaborators for the demo service, local runs, and tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use super::audit::{AuditRecord, AuditSink};
use super::domain::{Booking, BookingId, Resource, ResourceId};
use super::repository::{Clock, EntityStore, StoreError};
use super::status::BookingStatus;

#[derive(Debug, Default)]
struct StoreState {
    bookings: HashMap<BookingId, Booking>,
    resources: HashMap<ResourceId, Resource>,
}

/// Entity store backed by a single mutex, so the paired write is trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    state: Mutex<StoreState>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_booking(&self, booking: Booking) -> Result<Booking, StoreError> {
        let mut state = self.lock();
        if state.bookings.contains_key(&booking.id) {
            return Err(StoreError::Duplicate {
                entity: "booking",
                id: booking.id.0.clone(),
            });
        }
        state.bookings.insert(booking.id.clone(), booking.clone());
        Ok(booking)
    }

    pub fn insert_resource(&self, resource: Resource) -> Result<Resource, StoreError> {
        let mut state = self.lock();
        if state.resources.contains_key(&resource.id) {
            return Err(StoreError::Duplicate {
                entity: "resource",
                id: resource.id.0.clone(),
            });
        }
        state.resources.insert(resource.id.clone(), resource.clone());
        Ok(resource)
    }

    pub fn bookings(&self) -> Vec<Booking> {
        let mut bookings: Vec<_> = self.lock().bookings.values().cloned().collect();
        bookings.sort_by(|left, right| left.id.cmp(&right.id));
        bookings
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_booking_version(state: &StoreState, booking: &Booking) -> Result<(), StoreError> {
    let stored = state
        .bookings
        .get(&booking.id)
        .ok_or_else(|| StoreError::Missing {
            entity: "booking",
            id: booking.id.0.clone(),
        })?;
    if stored.version != booking.version {
        return Err(StoreError::Conflict {
            entity: "booking",
            id: booking.id.0.clone(),
            expected: booking.version,
            found: stored.version,
        });
    }
    Ok(())
}

fn check_resource_version(state: &StoreState, resource: &Resource) -> Result<(), StoreError> {
    let stored = state
        .resources
        .get(&resource.id)
        .ok_or_else(|| StoreError::Missing {
            entity: "resource",
            id: resource.id.0.clone(),
        })?;
    if stored.version != resource.version {
        return Err(StoreError::Conflict {
            entity: "resource",
            id: resource.id.0.clone(),
            expected: resource.version,
            found: stored.version,
        });
    }
    Ok(())
}

fn write_booking(state: &mut StoreState, booking: &Booking) -> Booking {
    let mut stored = booking.clone();
    stored.version += 1;
    state.bookings.insert(stored.id.clone(), stored.clone());
    stored
}

fn write_resource(state: &mut StoreState, resource: &Resource) -> Resource {
    let mut stored = resource.clone();
    stored.version += 1;
    state.resources.insert(stored.id.clone(), stored.clone());
    stored
}

impl EntityStore for InMemoryEntityStore {
    fn load_booking(&self, id: &BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.lock().bookings.get(id).cloned())
    }

    fn save_booking(&self, booking: &Booking) -> Result<Booking, StoreError> {
        let mut state = self.lock();
        check_booking_version(&state, booking)?;
        Ok(write_booking(&mut state, booking))
    }

    fn load_resource(&self, id: &ResourceId) -> Result<Option<Resource>, StoreError> {
        Ok(self.lock().resources.get(id).cloned())
    }

    fn save_resource(&self, resource: &Resource) -> Result<Resource, StoreError> {
        let mut state = self.lock();
        check_resource_version(&state, resource)?;
        Ok(write_resource(&mut state, resource))
    }

    fn save_booking_and_resource(
        &self,
        booking: &Booking,
        resource: &Resource,
    ) -> Result<(Booking, Resource), StoreError> {
        let mut state = self.lock();
        check_booking_version(&state, booking)?;
        check_resource_version(&state, resource)?;
        Ok((
            write_booking(&mut state, booking),
            write_resource(&mut state, resource),
        ))
    }

    fn bookings_with_status(&self, status: BookingStatus) -> Result<Vec<Booking>, StoreError> {
        let mut matching: Vec<_> = self
            .lock()
            .bookings
            .values()
            .filter(|booking| booking.status == status)
            .cloned()
            .collect();
        matching.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(matching)
    }

    fn resources(&self) -> Result<Vec<Resource>, StoreError> {
        let mut resources: Vec<_> = self.lock().resources.values().cloned().collect();
        resources.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(resources)
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Audit sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn entries(&self) -> Vec<AuditRecord> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn for_booking(&self, booking_id: &BookingId) -> Vec<AuditRecord> {
        self.entries()
            .into_iter()
            .filter(|entry| &entry.booking_id == booking_id)
            .collect()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, entry: &AuditRecord) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
    }
}
