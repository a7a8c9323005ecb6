use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Booking, BookingId, Resource, ResourceId, UserId};
use super::notifications::{RecipientRole, TemplateId};
use super::status::BookingStatus;

/// Storage abstraction for bookings and the resources they reserve.
///
/// Writes carry the version the caller read; implementations must reject a write whose
/// version no longer matches the stored one with [`StoreError::Conflict`] and return the
/// stored copy with its version incremented on success.
pub trait EntityStore: Send + Sync {
    fn load_booking(&self, id: &BookingId) -> Result<Option<Booking>, StoreError>;
    fn save_booking(&self, booking: &Booking) -> Result<Booking, StoreError>;
    fn load_resource(&self, id: &ResourceId) -> Result<Option<Resource>, StoreError>;
    fn save_resource(&self, resource: &Resource) -> Result<Resource, StoreError>;

    /// Persist both records or neither.
    fn save_booking_and_resource(
        &self,
        booking: &Booking,
        resource: &Resource,
    ) -> Result<(Booking, Resource), StoreError>;

    fn bookings_with_status(&self, status: BookingStatus) -> Result<Vec<Booking>, StoreError>;

    fn resources(&self) -> Result<Vec<Resource>, StoreError>;

    /// Active bookings whose return time is before `now`.
    fn overdue_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, StoreError> {
        Ok(self
            .bookings_with_status(BookingStatus::Active)?
            .into_iter()
            .filter(|booking| booking.is_past_due(now))
            .collect())
    }
}

/// Error enumeration for entity store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} does not exist")]
    Missing { entity: &'static str, id: String },
    #[error("{entity} {id} already exists")]
    Duplicate { entity: &'static str, id: String },
    #[error("{entity} {id} is stale (expected version {expected}, found {found})")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: u64,
        found: u64,
    },
    #[error("entity store unavailable: {0}")]
    Unavailable(String),
}

/// Outbound delivery of templated messages (e-mail, SMS, push adapters).
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notification: &Notification) -> Result<(), DispatchError>;
}

/// A rendered-later message addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: UserId,
    pub role: RecipientRole,
    pub template: TemplateId,
    /// `<booking id>:<status key>`; lets the transport drop duplicate deliveries.
    pub idempotency_key: String,
    pub context: BTreeMap<String, String>,
}

/// Notification dispatch error. Logged by the outbox, never surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Source of the current time, injected so tests can pin it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
