use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle states a booking moves through, from draft to a terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Draft,
    Pending,
    Verified,
    Confirmed,
    Active,
    Completed,
    Overdue,
    Cancelled,
    Rejected,
}

impl BookingStatus {
    pub const fn ordered() -> [Self; 9] {
        [
            Self::Draft,
            Self::Pending,
            Self::Verified,
            Self::Confirmed,
            Self::Active,
            Self::Completed,
            Self::Overdue,
            Self::Cancelled,
            Self::Rejected,
        ]
    }

    /// Stable machine key, matching the serde representation.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Confirmed => "confirmed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Pending => "Pending Verification",
            Self::Verified => "Verified",
            Self::Confirmed => "Confirmed",
            Self::Active => "Active Rental",
            Self::Completed => "Completed",
            Self::Overdue => "Overdue",
            Self::Cancelled => "Cancelled",
            Self::Rejected => "Rejected",
        }
    }

    /// Badge color used by admin screens. Purely cosmetic.
    pub const fn color(self) -> &'static str {
        match self {
            Self::Draft => "gray",
            Self::Pending => "warning",
            Self::Verified => "info",
            Self::Confirmed => "primary",
            Self::Active => "success",
            Self::Completed => "secondary",
            Self::Overdue => "danger",
            Self::Cancelled => "dark",
            Self::Rejected => "danger",
        }
    }

    /// Adjacency table: the statuses this status may legally move to.
    pub const fn successors(self) -> &'static [BookingStatus] {
        match self {
            Self::Draft => &[Self::Pending],
            Self::Pending => &[Self::Verified, Self::Rejected],
            Self::Verified => &[Self::Confirmed, Self::Cancelled],
            Self::Confirmed => &[Self::Active, Self::Cancelled],
            Self::Active => &[Self::Completed, Self::Overdue],
            Self::Overdue => &[Self::Completed, Self::Cancelled],
            Self::Completed | Self::Cancelled | Self::Rejected => &[],
        }
    }

    pub const fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    pub fn can_transition_to(self, target: BookingStatus) -> bool {
        self.successors().contains(&target)
    }

    /// Whether a booking in this status keeps its resource out of the pool.
    pub const fn holds_resource(self) -> bool {
        matches!(self, Self::Active | Self::Overdue)
    }

    pub fn descriptor(self) -> StatusDescriptor {
        StatusDescriptor {
            status: self,
            label: self.label(),
            color: self.color(),
            successors: self.successors().to_vec(),
            terminal: self.is_terminal(),
        }
    }
}

/// True iff `to` is in the successor set of `from`.
pub fn can_transition(from: BookingStatus, to: BookingStatus) -> bool {
    from.can_transition_to(to)
}

/// Every status with its presentation metadata, in declaration order.
pub fn status_descriptors() -> Vec<StatusDescriptor> {
    BookingStatus::ordered()
        .into_iter()
        .map(BookingStatus::descriptor)
        .collect()
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown booking status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim();
        BookingStatus::ordered()
            .into_iter()
            .find(|status| {
                status.key().eq_ignore_ascii_case(normalized)
                    || status.label().eq_ignore_ascii_case(normalized)
            })
            .ok_or_else(|| UnknownStatus(raw.to_string()))
    }
}

/// Serializable view of a status and its place in the adjacency table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusDescriptor {
    pub status: BookingStatus,
    pub label: &'static str,
    pub color: &'static str,
    pub successors: Vec<BookingStatus>,
    pub terminal: bool,
}
