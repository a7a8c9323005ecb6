use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::audit::{AuditRecord, AuditSink, TracingAuditSink};
use super::domain::{Booking, BookingId, Resource, ResourceId, ResourceStatus, UserId};
use super::effects::apply_entry_effects;
use super::locks::BookingLocks;
use super::notifications::{NotificationOutbox, NotificationRules, RecipientRole};
use super::repository::{Clock, EntityStore, Notification, NotificationDispatcher, StoreError};
use super::status::{can_transition, BookingStatus};

/// Tuning knobs for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// How many times a transition is re-run from fresh state after a stale write.
    pub max_conflict_retries: u8,
    /// Budget applied to `transition` calls that do not pass their own deadline.
    pub io_timeout: Option<Duration>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_conflict_retries: 2,
            io_timeout: None,
        }
    }
}

const CANCELLATION_POLL: Duration = Duration::from_millis(25);

/// Expiry and/or cancellation signal checked before each store call.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    expires_at: Option<Instant>,
    cancelled: Option<Arc<AtomicBool>>,
}

impl Deadline {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            expires_at: Instant::now().checked_add(timeout),
            cancelled: None,
        }
    }

    pub fn at(instant: Instant) -> Self {
        Self {
            expires_at: Some(instant),
            cancelled: None,
        }
    }

    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(flag);
        self
    }

    pub(crate) fn check(&self, stage: &'static str) -> Result<(), WorkflowError> {
        if self
            .cancelled
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
        {
            return Err(WorkflowError::Cancelled { stage });
        }
        if self
            .expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
        {
            return Err(WorkflowError::DeadlineExceeded { stage });
        }
        Ok(())
    }

    /// Longest a blocked caller may sleep before re-checking; `None` means no bound.
    pub(crate) fn wait_slice(&self) -> Option<Duration> {
        let remaining = self
            .expires_at
            .map(|expires_at| expires_at.saturating_duration_since(Instant::now()));
        match (remaining, self.cancelled.is_some()) {
            (Some(remaining), true) => Some(remaining.min(CANCELLATION_POLL)),
            (Some(remaining), false) => Some(remaining),
            (None, true) => Some(CANCELLATION_POLL),
            (None, false) => None,
        }
    }
}

/// Error raised by the workflow engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("booking {0} not found")]
    BookingNotFound(BookingId),
    #[error("resource {0} not found")]
    ResourceNotFound(ResourceId),
    #[error("booking {booking_id} cannot move from {from} to {to}")]
    IllegalTransition {
        booking_id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error("transition not applied: {0}")]
    Persistence(#[source] StoreError),
    #[error("booking {0} was modified concurrently; retry the transition")]
    Conflict(BookingId),
    #[error("deadline exceeded before {stage}")]
    DeadlineExceeded { stage: &'static str },
    #[error("cancelled before {stage}")]
    Cancelled { stage: &'static str },
}

impl WorkflowError {
    /// Caller mistakes that must not be retried automatically.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::BookingNotFound(_) | Self::ResourceNotFound(_) | Self::IllegalTransition { .. }
        )
    }

    /// Failures after which re-issuing the same transition is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_)
                | Self::Conflict(_)
                | Self::DeadlineExceeded { .. }
                | Self::Cancelled { .. }
        )
    }
}

fn store_error(booking_id: &BookingId, err: StoreError) -> WorkflowError {
    match err {
        StoreError::Conflict { .. } => WorkflowError::Conflict(booking_id.clone()),
        other => WorkflowError::Persistence(other),
    }
}

/// Validates, applies, and persists booking status changes, then fans out notifications.
pub struct BookingWorkflowEngine<S> {
    store: Arc<S>,
    rules: Arc<NotificationRules>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    outbox: NotificationOutbox,
    locks: BookingLocks,
    options: EngineOptions,
}

impl<S> BookingWorkflowEngine<S>
where
    S: EntityStore + 'static,
{
    /// Build an engine and start its notification worker.
    pub fn new(
        store: Arc<S>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        rules: Arc<NotificationRules>,
        clock: Arc<dyn Clock>,
    ) -> std::io::Result<Self> {
        Ok(Self {
            store,
            rules,
            clock,
            audit: Arc::new(TracingAuditSink),
            outbox: NotificationOutbox::spawn(dispatcher)?,
            locks: BookingLocks::default(),
            options: EngineOptions::default(),
        })
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn rules(&self) -> &NotificationRules {
        &self.rules
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn booking(&self, booking_id: &BookingId) -> Result<Booking, WorkflowError> {
        self.store
            .load_booking(booking_id)
            .map_err(|err| store_error(booking_id, err))?
            .ok_or_else(|| WorkflowError::BookingNotFound(booking_id.clone()))
    }

    /// Move a booking to `target`, bounded by the configured I/O timeout.
    pub fn transition(
        &self,
        booking_id: &BookingId,
        target: BookingStatus,
        acting_user: Option<&UserId>,
    ) -> Result<Booking, WorkflowError> {
        self.transition_within(booking_id, target, acting_user, &self.default_deadline())
    }

    /// Deadline derived from `EngineOptions::io_timeout`, unbounded when unset.
    pub fn default_deadline(&self) -> Deadline {
        self.options
            .io_timeout
            .map(Deadline::after)
            .unwrap_or_default()
    }

    /// Move a booking to `target`.
    ///
    /// Waiting behind another transition of the same booking counts against `deadline`.
    /// An illegal request is a no-op: nothing is written, dispatched, or audited. Stale
    /// writes are retried from a fresh read, so a lost race ends in `IllegalTransition`.
    pub fn transition_within(
        &self,
        booking_id: &BookingId,
        target: BookingStatus,
        acting_user: Option<&UserId>,
        deadline: &Deadline,
    ) -> Result<Booking, WorkflowError> {
        let _in_flight = self.locks.acquire(booking_id, deadline)?;

        let mut conflicts = 0u8;
        loop {
            match self.apply(booking_id, target, acting_user, deadline) {
                Err(WorkflowError::Conflict(_)) if conflicts < self.options.max_conflict_retries => {
                    conflicts += 1;
                    warn!(
                        booking_id = %booking_id,
                        attempt = conflicts,
                        "stale booking write; retrying from fresh state"
                    );
                }
                outcome => return outcome,
            }
        }
    }

    /// Wait until queued notifications have been handed to the dispatcher.
    pub fn flush_notifications(&self) {
        self.outbox.flush();
    }

    fn apply(
        &self,
        booking_id: &BookingId,
        target: BookingStatus,
        acting_user: Option<&UserId>,
        deadline: &Deadline,
    ) -> Result<Booking, WorkflowError> {
        deadline.check("load_booking")?;
        let mut booking = self.booking(booking_id)?;

        let previous = booking.status;
        if !can_transition(previous, target) {
            debug!(booking_id = %booking_id, from = %previous, to = %target, "illegal transition requested");
            return Err(WorkflowError::IllegalTransition {
                booking_id: booking_id.clone(),
                from: previous,
                to: target,
            });
        }

        let now = self.clock.now();
        booking.status = target;
        let coupled = apply_entry_effects(&mut booking, acting_user, now);

        let (stored, resource) = match coupled {
            Some(resource_status) => {
                deadline.check("load_resource")?;
                let mut resource = self
                    .store
                    .load_resource(&booking.resource_id)
                    .map_err(|err| store_error(booking_id, err))?
                    .ok_or_else(|| WorkflowError::ResourceNotFound(booking.resource_id.clone()))?;

                if resource_status == ResourceStatus::InUse
                    && resource.status != ResourceStatus::Available
                {
                    warn!(
                        booking_id = %booking_id,
                        resource_id = %resource.id,
                        resource_status = %resource.status,
                        "activating booking on a resource that is not available"
                    );
                }
                resource.status = resource_status;

                deadline.check("persist")?;
                let (stored, resource) = self
                    .store
                    .save_booking_and_resource(&booking, &resource)
                    .map_err(|err| store_error(booking_id, err))?;
                (stored, Some(resource))
            }
            None => {
                deadline.check("persist")?;
                let stored = self
                    .store
                    .save_booking(&booking)
                    .map_err(|err| store_error(booking_id, err))?;
                (stored, None)
            }
        };

        info!(
            booking_id = %stored.id,
            from = %previous,
            to = %target,
            version = stored.version,
            "booking transitioned"
        );

        self.notify(&stored, previous, resource.as_ref());
        self.audit.record(&AuditRecord {
            booking_id: stored.id.clone(),
            previous_status: previous,
            target_status: target,
            acting_user: acting_user.cloned(),
            recorded_at: now,
        });

        Ok(stored)
    }

    fn notify(&self, booking: &Booking, previous: BookingStatus, resource: Option<&Resource>) {
        let templates = self.rules.rules_for(booking.status);
        if templates.is_empty() {
            return;
        }

        let fetched = match resource {
            None if templates.contains_key(&RecipientRole::ResourceManager) => {
                self.lookup_resource(&booking.resource_id)
            }
            _ => None,
        };
        let resource = resource.or(fetched.as_ref());

        let mut context = BTreeMap::new();
        context.insert("booking_id".to_string(), booking.id.0.clone());
        context.insert("resource_id".to_string(), booking.resource_id.0.clone());
        if let Some(resource) = resource {
            context.insert("resource_name".to_string(), resource.name.clone());
        }
        context.insert("previous_status".to_string(), previous.key().to_string());
        context.insert("status".to_string(), booking.status.key().to_string());
        context.insert("status_label".to_string(), booking.status.label().to_string());
        context.insert("pickup_at".to_string(), booking.pickup_at.to_rfc3339());
        context.insert("return_at".to_string(), booking.return_at.to_rfc3339());

        for (role, template) in templates {
            let recipient = match role {
                RecipientRole::Customer => Some(booking.user_id.clone()),
                RecipientRole::ResourceManager => {
                    resource.and_then(|resource| resource.manager_id.clone())
                }
            };

            let Some(recipient) = recipient else {
                debug!(booking_id = %booking.id, role = %role, "no recipient for role; skipping");
                continue;
            };

            self.outbox.enqueue(Notification {
                recipient,
                role: *role,
                template: template.clone(),
                idempotency_key: format!("{}:{}", booking.id, booking.status.key()),
                context: context.clone(),
            });
        }
    }

    fn lookup_resource(&self, resource_id: &ResourceId) -> Option<Resource> {
        match self.store.load_resource(resource_id) {
            Ok(Some(resource)) => Some(resource),
            Ok(None) => {
                warn!(resource_id = %resource_id, "resource missing while resolving notification recipients");
                None
            }
            Err(err) => {
                warn!(resource_id = %resource_id, error = %err, "resource lookup failed while resolving notification recipients");
                None
            }
        }
    }
}
