//! Booking lifecycle workflow: status table, guarded transitions, entry effects,
//! notification fan-out, and the periodic overdue/reconciliation passes.

pub mod audit;
pub mod domain;
mod effects;
pub mod engine;
mod locks;
pub mod memory;
pub mod notifications;
pub mod reconcile;
pub mod repository;
pub mod router;
pub mod scheduler;
pub mod status;
pub mod sweeper;

#[cfg(test)]
mod tests;

pub use audit::{AuditRecord, AuditSink, TracingAuditSink};
pub use domain::{
    Booking, BookingId, PaymentStatus, Resource, ResourceId, ResourceStatus, UserId,
    VerificationStatus,
};
pub use engine::{BookingWorkflowEngine, Deadline, EngineOptions, WorkflowError};
pub use memory::{InMemoryAuditLog, InMemoryEntityStore, ManualClock};
pub use notifications::{
    NotificationRuleError, NotificationRules, RecipientRole, RoleTemplates, TemplateId,
};
pub use reconcile::{ReconciliationReport, ResourceDivergence, ResourceRepair, ResourceReconciler};
pub use repository::{
    Clock, DispatchError, EntityStore, Notification, NotificationDispatcher, StoreError,
    SystemClock,
};
pub use router::{booking_router, BookingView, TransitionPayload};
pub use scheduler::{MaintenancePass, MaintenanceScheduler};
pub use status::{can_transition, status_descriptors, BookingStatus, StatusDescriptor, UnknownStatus};
pub use sweeper::{OverdueSweeper, SweepFailure, SweepReport};
