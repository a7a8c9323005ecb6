use chrono::{DateTime, Utc};

use super::domain::{Booking, PaymentStatus, ResourceStatus, UserId, VerificationStatus};
use super::status::BookingStatus;

/// Apply the entry effects for the status the booking has just been moved into.
///
/// Returns the status the referenced resource must take in the same write, if any.
pub(crate) fn apply_entry_effects(
    booking: &mut Booking,
    acting_user: Option<&UserId>,
    now: DateTime<Utc>,
) -> Option<ResourceStatus> {
    match booking.status {
        BookingStatus::Verified => {
            booking.verification_status = VerificationStatus::Verified;
            booking.verified_by = acting_user.cloned();
            booking.verified_at = Some(now);
            None
        }
        BookingStatus::Rejected => {
            booking.verification_status = VerificationStatus::Rejected;
            booking.verified_by = acting_user.cloned();
            booking.verified_at = Some(now);
            None
        }
        BookingStatus::Confirmed => {
            booking.payment_status = PaymentStatus::Paid;
            booking.payment_date = Some(now);
            None
        }
        BookingStatus::Active => {
            booking.actual_pickup_at = Some(now);
            Some(ResourceStatus::InUse)
        }
        BookingStatus::Completed => {
            booking.actual_return_at = Some(now);
            Some(ResourceStatus::Available)
        }
        BookingStatus::Draft
        | BookingStatus::Pending
        | BookingStatus::Overdue
        | BookingStatus::Cancelled => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::booking::domain::{BookingId, ResourceId};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0)
            .single()
            .expect("valid timestamp")
    }

    fn booking_entering(status: BookingStatus) -> Booking {
        let pickup = Utc
            .with_ymd_and_hms(2025, 6, 2, 8, 0, 0)
            .single()
            .expect("valid");
        let mut booking = Booking::draft(
            BookingId::from("bk-1"),
            ResourceId::from("veh-1"),
            UserId::from("cust-1"),
            pickup,
            pickup + chrono::Duration::days(3),
        );
        booking.status = status;
        booking
    }

    /// Names of the effect-bearing fields that differ between two snapshots.
    fn changed_fields(before: &Booking, after: &Booking) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if before.actual_pickup_at != after.actual_pickup_at {
            changed.push("actual_pickup_at");
        }
        if before.actual_return_at != after.actual_return_at {
            changed.push("actual_return_at");
        }
        if before.payment_status != after.payment_status {
            changed.push("payment_status");
        }
        if before.payment_date != after.payment_date {
            changed.push("payment_date");
        }
        if before.verification_status != after.verification_status {
            changed.push("verification_status");
        }
        if before.verified_by != after.verified_by {
            changed.push("verified_by");
        }
        if before.verified_at != after.verified_at {
            changed.push("verified_at");
        }
        if before.pickup_mileage != after.pickup_mileage
            || before.return_mileage != after.return_mileage
            || before.mileage_limit != after.mileage_limit
            || before.excess_mileage != after.excess_mileage
        {
            changed.push("mileage");
        }
        changed
    }

    #[test]
    fn each_target_sets_exactly_its_fields() {
        let actor = UserId::from("staff-7");
        let cases: [(BookingStatus, &[&str], Option<ResourceStatus>); 9] = [
            (
                BookingStatus::Verified,
                &["verification_status", "verified_by", "verified_at"],
                None,
            ),
            (
                BookingStatus::Rejected,
                &["verification_status", "verified_by", "verified_at"],
                None,
            ),
            (
                BookingStatus::Confirmed,
                &["payment_status", "payment_date"],
                None,
            ),
            (
                BookingStatus::Active,
                &["actual_pickup_at"],
                Some(ResourceStatus::InUse),
            ),
            (
                BookingStatus::Completed,
                &["actual_return_at"],
                Some(ResourceStatus::Available),
            ),
            (BookingStatus::Draft, &[], None),
            (BookingStatus::Pending, &[], None),
            (BookingStatus::Overdue, &[], None),
            (BookingStatus::Cancelled, &[], None),
        ];

        for (target, fields, resource) in cases {
            let before = booking_entering(target);
            let mut after = before.clone();
            let coupled = apply_entry_effects(&mut after, Some(&actor), now());
            assert_eq!(changed_fields(&before, &after), fields, "fields for {target}");
            assert_eq!(coupled, resource, "resource effect for {target}");
            assert_eq!(after.status, target);
        }
    }

    #[test]
    fn verification_records_actor_and_time() {
        let actor = UserId::from("staff-7");
        let mut booking = booking_entering(BookingStatus::Rejected);
        apply_entry_effects(&mut booking, Some(&actor), now());
        assert_eq!(booking.verification_status, VerificationStatus::Rejected);
        assert_eq!(booking.verified_by, Some(actor));
        assert_eq!(booking.verified_at, Some(now()));
    }

    #[test]
    fn verification_without_actor_leaves_verifier_empty() {
        let mut booking = booking_entering(BookingStatus::Verified);
        apply_entry_effects(&mut booking, None, now());
        assert_eq!(booking.verification_status, VerificationStatus::Verified);
        assert!(booking.verified_by.is_none());
    }

    #[test]
    fn cancellation_keeps_a_refunded_payment() {
        let mut booking = booking_entering(BookingStatus::Cancelled);
        booking.payment_status = PaymentStatus::Refunded;
        booking.payment_date = Some(now());

        let coupled = apply_entry_effects(&mut booking, None, now() + chrono::Duration::hours(1));

        assert_eq!(coupled, None);
        assert_eq!(booking.payment_status, PaymentStatus::Refunded);
        assert_eq!(booking.payment_status.label(), "refunded");
        assert_eq!(booking.payment_date, Some(now()));
    }

    #[test]
    fn payment_status_serializes_in_snake_case() {
        let refunded: PaymentStatus =
            serde_json::from_str("\"refunded\"").expect("known payment status");
        assert_eq!(refunded, PaymentStatus::Refunded);
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Unpaid).expect("serializes"),
            "\"unpaid\""
        );
    }
}
