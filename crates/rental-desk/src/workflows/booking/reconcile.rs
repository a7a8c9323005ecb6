use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::domain::{BookingId, ResourceId, ResourceStatus};
use super::engine::WorkflowError;
use super::repository::EntityStore;
use super::status::BookingStatus;

/// Resource status corrected to match the bookings holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRepair {
    pub resource_id: ResourceId,
    pub from: ResourceStatus,
    pub to: ResourceStatus,
}

/// Resource whose status disagrees with its bookings in a way that needs a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDivergence {
    pub resource_id: ResourceId,
    /// `None` when bookings point at a resource the store does not know.
    pub status: Option<ResourceStatus>,
    pub holders: Vec<BookingId>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub inspected: usize,
    pub repaired: Vec<ResourceRepair>,
    pub divergent: Vec<ResourceDivergence>,
}

/// Periodic pass restoring "in use iff held by an active or overdue booking".
pub struct ResourceReconciler<S> {
    store: Arc<S>,
}

impl<S> ResourceReconciler<S>
where
    S: EntityStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn reconcile(&self) -> Result<ReconciliationReport, WorkflowError> {
        // Resources first: a transition landing between the two reads must turn the
        // repair into a version conflict rather than a wrong write.
        let resources = self.store.resources().map_err(WorkflowError::Persistence)?;

        let mut holders: BTreeMap<ResourceId, Vec<BookingId>> = BTreeMap::new();
        for status in BookingStatus::ordered()
            .into_iter()
            .filter(|status| status.holds_resource())
        {
            for booking in self
                .store
                .bookings_with_status(status)
                .map_err(WorkflowError::Persistence)?
            {
                holders
                    .entry(booking.resource_id)
                    .or_default()
                    .push(booking.id);
            }
        }

        let mut report = ReconciliationReport {
            inspected: resources.len(),
            ..ReconciliationReport::default()
        };

        for mut resource in resources {
            let held_by = holders.remove(&resource.id).unwrap_or_default();

            let expected = match (held_by.len(), resource.status) {
                (0, ResourceStatus::InUse) => ResourceStatus::Available,
                (1, ResourceStatus::Available) => ResourceStatus::InUse,
                (0, _) | (1, ResourceStatus::InUse) => continue,
                (1, status) => {
                    report.divergent.push(ResourceDivergence {
                        resource_id: resource.id.clone(),
                        status: Some(status),
                        holders: held_by,
                        reason: format!("held by a rental while {}", status.label()),
                    });
                    continue;
                }
                (count, status) => {
                    report.divergent.push(ResourceDivergence {
                        resource_id: resource.id.clone(),
                        status: Some(status),
                        holders: held_by,
                        reason: format!("held by {count} rentals at once"),
                    });
                    continue;
                }
            };

            let from = resource.status;
            resource.status = expected;
            match self.store.save_resource(&resource) {
                Ok(_) => {
                    warn!(resource_id = %resource.id, from = %from, to = %expected, "repaired resource status");
                    report.repaired.push(ResourceRepair {
                        resource_id: resource.id,
                        from,
                        to: expected,
                    });
                }
                Err(err) => {
                    warn!(resource_id = %resource.id, error = %err, "resource repair not saved; will retry next pass");
                    report.divergent.push(ResourceDivergence {
                        resource_id: resource.id,
                        status: Some(from),
                        holders: held_by,
                        reason: format!("repair to {} failed: {err}", expected.label()),
                    });
                }
            }
        }

        for (resource_id, bookings) in holders {
            warn!(resource_id = %resource_id, "bookings reference an unknown resource");
            report.divergent.push(ResourceDivergence {
                resource_id,
                status: None,
                holders: bookings,
                reason: "resource record missing".to_string(),
            });
        }

        info!(
            inspected = report.inspected,
            repaired = report.repaired.len(),
            divergent = report.divergent.len(),
            "resource reconciliation finished"
        );
        Ok(report)
    }
}
