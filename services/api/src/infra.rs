use chrono::{DateTime, Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use rental_desk::workflows::booking::{
    Booking, BookingId, BookingStatus, DispatchError, InMemoryEntityStore, Notification,
    NotificationDispatcher, Resource, ResourceId, ResourceStatus, StoreError, UserId,
};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Dispatcher that logs each notification and keeps a copy for inspection.
#[derive(Default, Clone)]
pub(crate) struct LoggingDispatcher {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationDispatcher for LoggingDispatcher {
    fn dispatch(&self, notification: &Notification) -> Result<(), DispatchError> {
        info!(
            recipient = %notification.recipient,
            role = %notification.role,
            template = %notification.template,
            idempotency_key = %notification.idempotency_key,
            "notification dispatched"
        );
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
        Ok(())
    }
}

impl LoggingDispatcher {
    pub(crate) fn events(&self) -> Vec<Notification> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Three vehicles and a booking at each interesting point of the lifecycle.
pub(crate) fn seed_demo_fleet(
    store: &InMemoryEntityStore,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let manager = UserId::from("mgr-fleet");

    let corolla = Resource::new(ResourceId::from("veh-corolla"), "Toyota Corolla")
        .with_manager(manager.clone());
    let mut transit = Resource::new(ResourceId::from("veh-transit"), "Ford Transit")
        .with_manager(manager.clone());
    transit.status = ResourceStatus::InUse;
    let golf = Resource::new(ResourceId::from("veh-golf"), "VW Golf").with_manager(manager);

    store.insert_resource(corolla)?;
    store.insert_resource(transit)?;
    store.insert_resource(golf)?;

    store.insert_booking(Booking::draft(
        BookingId::from("bk-1001"),
        ResourceId::from("veh-corolla"),
        UserId::from("cust-ana"),
        now + Duration::days(1),
        now + Duration::days(4),
    ))?;

    let mut late = Booking::draft(
        BookingId::from("bk-1002"),
        ResourceId::from("veh-transit"),
        UserId::from("cust-ben"),
        now - Duration::days(5),
        now - Duration::hours(6),
    );
    late.status = BookingStatus::Active;
    late.actual_pickup_at = Some(now - Duration::days(5));
    store.insert_booking(late)?;

    let mut pending = Booking::draft(
        BookingId::from("bk-1003"),
        ResourceId::from("veh-golf"),
        UserId::from("cust-cho"),
        now + Duration::days(2),
        now + Duration::days(3),
    );
    pending.status = BookingStatus::Pending;
    store.insert_booking(pending)?;

    Ok(())
}
