use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::domain::{BookingId, UserId};
use super::status::BookingStatus;

/// One applied transition, emitted after the booking has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub booking_id: BookingId,
    pub previous_status: BookingStatus,
    pub target_status: BookingStatus,
    pub acting_user: Option<UserId>,
    pub recorded_at: DateTime<Utc>,
}

/// Destination for transition audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditRecord);
}

/// Writes audit records as structured log events under the `rental_desk::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &AuditRecord) {
        info!(
            target: "rental_desk::audit",
            booking_id = %entry.booking_id,
            from = %entry.previous_status,
            to = %entry.target_status,
            actor = entry.acting_user.as_ref().map(|user| user.0.as_str()).unwrap_or("system"),
            at = %entry.recorded_at.to_rfc3339(),
            "booking transition"
        );
    }
}
