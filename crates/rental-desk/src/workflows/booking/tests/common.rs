use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::booking::domain::{
    Booking, BookingId, Resource, ResourceId, ResourceStatus, UserId,
};
use crate::workflows::booking::repository::{
    DispatchError, EntityStore, Notification, NotificationDispatcher, StoreError,
};
use crate::workflows::booking::{
    BookingStatus, BookingWorkflowEngine, EngineOptions, InMemoryAuditLog, InMemoryEntityStore,
    ManualClock, NotificationRules,
};

pub(super) const BOOKING: &str = "bk-100";
pub(super) const RESOURCE: &str = "veh-7";
pub(super) const CUSTOMER: &str = "cust-42";
pub(super) const MANAGER: &str = "mgr-3";
pub(super) const STAFF: &str = "staff-1";

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn booking_id() -> BookingId {
    BookingId::from(BOOKING)
}

pub(super) fn resource_id() -> ResourceId {
    ResourceId::from(RESOURCE)
}

/// Booking at `status`, due back two days after `start()`.
pub(super) fn booking_in(id: &str, resource: &str, status: BookingStatus) -> Booking {
    let mut booking = Booking::draft(
        BookingId::from(id),
        ResourceId::from(resource),
        UserId::from(CUSTOMER),
        start(),
        start() + Duration::days(2),
    );
    booking.status = status;
    booking
}

pub(super) fn managed_resource(id: &str, status: ResourceStatus) -> Resource {
    let mut resource = Resource::new(ResourceId::from(id), "Toyota Corolla")
        .with_manager(UserId::from(MANAGER));
    resource.status = status;
    resource
}

/// Store holding one managed resource and one booking referencing it.
pub(super) fn seeded_store(status: BookingStatus, resource_status: ResourceStatus) -> InMemoryEntityStore {
    let store = InMemoryEntityStore::new();
    store
        .insert_resource(managed_resource(RESOURCE, resource_status))
        .expect("insert resource");
    store
        .insert_booking(booking_in(BOOKING, RESOURCE, status))
        .expect("insert booking");
    store
}

pub(super) struct Harness<S> {
    pub(super) engine: Arc<BookingWorkflowEngine<S>>,
    pub(super) store: Arc<S>,
    pub(super) dispatcher: Arc<RecordingDispatcher>,
    pub(super) audit: Arc<InMemoryAuditLog>,
    pub(super) clock: Arc<ManualClock>,
}

impl<S> Harness<S>
where
    S: EntityStore + 'static,
{
    pub(super) fn with_store(store: S) -> Self {
        Self::build(store, RecordingDispatcher::default(), EngineOptions::default())
    }

    pub(super) fn build(
        store: S,
        dispatcher: RecordingDispatcher,
        options: EngineOptions,
    ) -> Self {
        let store = Arc::new(store);
        let dispatcher = Arc::new(dispatcher);
        let audit = Arc::new(InMemoryAuditLog::default());
        let clock = Arc::new(ManualClock::new(start()));
        let engine = BookingWorkflowEngine::new(
            store.clone(),
            dispatcher.clone(),
            Arc::new(NotificationRules::standard()),
            clock.clone(),
        )
        .expect("notification worker starts")
        .with_audit_sink(audit.clone())
        .with_options(options);

        Self {
            engine: Arc::new(engine),
            store,
            dispatcher,
            audit,
            clock,
        }
    }

    pub(super) fn stored_booking(&self) -> Booking {
        self.store
            .load_booking(&booking_id())
            .expect("load booking")
            .expect("booking present")
    }

    pub(super) fn stored_resource(&self) -> Resource {
        self.store
            .load_resource(&resource_id())
            .expect("load resource")
            .expect("resource present")
    }

    /// Notifications handed to the dispatcher so far.
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.engine.flush_notifications();
        self.dispatcher.sent()
    }
}

pub(super) fn harness(status: BookingStatus, resource_status: ResourceStatus) -> Harness<InMemoryEntityStore> {
    Harness::with_store(seeded_store(status, resource_status))
}

#[derive(Default)]
pub(super) struct RecordingDispatcher {
    sent: Mutex<Vec<Notification>>,
    failing: bool,
}

impl RecordingDispatcher {
    pub(super) fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            failing: true,
        }
    }

    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("dispatcher mutex poisoned").clone()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn dispatch(&self, notification: &Notification) -> Result<(), DispatchError> {
        self.sent
            .lock()
            .expect("dispatcher mutex poisoned")
            .push(notification.clone());
        if self.failing {
            return Err(DispatchError::Transport("smtp relay down".to_string()));
        }
        Ok(())
    }
}

type Interference = Box<dyn FnOnce(&InMemoryEntityStore) + Send>;

/// In-memory store with switchable failures and a hook that simulates a concurrent writer
/// landing just before the engine's write.
#[derive(Default)]
pub(super) struct FlakyStore {
    pub(super) inner: InMemoryEntityStore,
    fail_writes: AtomicBool,
    fail_queries: AtomicBool,
    interference: Mutex<Vec<Interference>>,
}

impl FlakyStore {
    pub(super) fn wrapping(inner: InMemoryEntityStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub(super) fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub(super) fn fail_queries(&self) {
        self.fail_queries.store(true, Ordering::SeqCst);
    }

    /// Queue a write that runs against the inner store before the next engine write.
    pub(super) fn interfere(&self, action: impl FnOnce(&InMemoryEntityStore) + Send + 'static) {
        self.interference
            .lock()
            .expect("interference mutex poisoned")
            .push(Box::new(action));
    }

    fn before_write(&self) -> Result<(), StoreError> {
        let pending = {
            let mut queue = self.interference.lock().expect("interference mutex poisoned");
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        };
        if let Some(action) = pending {
            action(&self.inner);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("primary database offline".to_string()));
        }
        Ok(())
    }
}

impl EntityStore for FlakyStore {
    fn load_booking(&self, id: &BookingId) -> Result<Option<Booking>, StoreError> {
        self.inner.load_booking(id)
    }

    fn save_booking(&self, booking: &Booking) -> Result<Booking, StoreError> {
        self.before_write()?;
        self.inner.save_booking(booking)
    }

    fn load_resource(&self, id: &ResourceId) -> Result<Option<Resource>, StoreError> {
        self.inner.load_resource(id)
    }

    fn save_resource(&self, resource: &Resource) -> Result<Resource, StoreError> {
        self.before_write()?;
        self.inner.save_resource(resource)
    }

    fn save_booking_and_resource(
        &self,
        booking: &Booking,
        resource: &Resource,
    ) -> Result<(Booking, Resource), StoreError> {
        self.before_write()?;
        self.inner.save_booking_and_resource(booking, resource)
    }

    fn bookings_with_status(&self, status: BookingStatus) -> Result<Vec<Booking>, StoreError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("replica lagging".to_string()));
        }
        self.inner.bookings_with_status(status)
    }

    fn resources(&self) -> Result<Vec<Resource>, StoreError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("replica lagging".to_string()));
        }
        self.inner.resources()
    }
}

/// Next engine write, parked inside the store until released. The engine keeps the
/// booking's lock for the whole time.
pub(super) struct HeldWrite {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl HeldWrite {
    pub(super) fn wait_until_entered(&self) {
        self.entered
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("engine reached the store write");
    }

    pub(super) fn release(&self) {
        let _ = self.release.send(());
    }

    /// Extra handle for releasing from another thread.
    pub(super) fn releaser(&self) -> Sender<()> {
        self.release.clone()
    }
}

pub(super) fn hold_next_write(store: &FlakyStore) -> HeldWrite {
    let (entered_tx, entered) = mpsc::channel();
    let (release, release_rx) = mpsc::channel::<()>();
    store.interfere(move |_| {
        let _ = entered_tx.send(());
        let _ = release_rx.recv();
    });
    HeldWrite { entered, release }
}

/// Concurrent writer that moves the seeded booking straight to `status`.
pub(super) fn force_status(status: BookingStatus) -> impl FnOnce(&InMemoryEntityStore) + Send {
    move |store| {
        let mut booking = store
            .load_booking(&booking_id())
            .expect("load")
            .expect("present");
        booking.status = status;
        store.save_booking(&booking).expect("concurrent write");
    }
}

/// Concurrent writer that touches the seeded booking without changing its status.
pub(super) fn touch_booking() -> impl FnOnce(&InMemoryEntityStore) + Send {
    move |store| {
        let mut booking = store
            .load_booking(&booking_id())
            .expect("load")
            .expect("present");
        booking.mileage_limit = Some(booking.mileage_limit.unwrap_or(0) + 100);
        store.save_booking(&booking).expect("concurrent write");
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
