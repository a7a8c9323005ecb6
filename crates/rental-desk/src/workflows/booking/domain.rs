use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::status::BookingStatus;

/// Identifier wrapper for bookings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub String);

/// Identifier wrapper for rentable resources (vehicles).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

/// Identifier wrapper for customers, staff, and resource managers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

macro_rules! display_as_inner {
    ($($name:ident),+) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $name {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }
        )+
    };
}

display_as_inner!(BookingId, ResourceId, UserId);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Unverified,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }
}

/// One reservation of one resource by one user.
///
/// `status` is only ever changed by the workflow engine. `version` is bumped by the
/// entity store on every successful write and used to reject stale writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub resource_id: ResourceId,
    pub user_id: UserId,
    pub status: BookingStatus,
    pub pickup_at: DateTime<Utc>,
    pub return_at: DateTime<Utc>,
    pub actual_pickup_at: Option<DateTime<Utc>>,
    pub actual_return_at: Option<DateTime<Utc>>,
    pub payment_status: PaymentStatus,
    pub payment_date: Option<DateTime<Utc>>,
    pub verification_status: VerificationStatus,
    pub verified_by: Option<UserId>,
    pub verified_at: Option<DateTime<Utc>>,
    pub pickup_mileage: Option<u32>,
    pub return_mileage: Option<u32>,
    pub mileage_limit: Option<u32>,
    /// Filled in by pricing before the rental is closed; never written by the engine.
    pub excess_mileage: Option<u32>,
    #[serde(default)]
    pub version: u64,
}

impl Booking {
    /// A fresh booking as the creation flow hands it over: `Draft`, unpaid, unverified.
    pub fn draft(
        id: BookingId,
        resource_id: ResourceId,
        user_id: UserId,
        pickup_at: DateTime<Utc>,
        return_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            resource_id,
            user_id,
            status: BookingStatus::Draft,
            pickup_at,
            return_at,
            actual_pickup_at: None,
            actual_return_at: None,
            payment_status: PaymentStatus::Unpaid,
            payment_date: None,
            verification_status: VerificationStatus::Unverified,
            verified_by: None,
            verified_at: None,
            pickup_mileage: None,
            return_mileage: None,
            mileage_limit: None,
            excess_mileage: None,
            version: 0,
        }
    }

    /// Active and due back before `now`.
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Active && self.return_at < now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Available,
    InUse,
    UnderMaintenance,
    Retired,
}

impl ResourceStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::InUse => "In Use",
            Self::UnderMaintenance => "Under Maintenance",
            Self::Retired => "Retired",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The rentable asset a booking reserves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub status: ResourceStatus,
    pub manager_id: Option<UserId>,
    #[serde(default)]
    pub version: u64,
}

impl Resource {
    pub fn new(id: ResourceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: ResourceStatus::Available,
            manager_id: None,
            version: 0,
        }
    }

    pub fn with_manager(mut self, manager: UserId) -> Self {
        self.manager_id = Some(manager);
        self
    }
}
