use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::BookingId;
use super::engine::{BookingWorkflowEngine, Deadline, WorkflowError};
use super::repository::EntityStore;
use super::status::BookingStatus;

/// Outcome of one overdue sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub transitioned: Vec<BookingId>,
    /// Candidates that had already left `Active` by the time they were processed.
    pub skipped: Vec<BookingId>,
    pub failed: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn transitioned_count(&self) -> usize {
        self.transitioned.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub booking_id: BookingId,
    pub error: String,
}

/// Moves past-due active bookings to `Overdue` through the engine's normal entry point.
pub struct OverdueSweeper<S> {
    engine: Arc<BookingWorkflowEngine<S>>,
}

impl<S> OverdueSweeper<S>
where
    S: EntityStore + 'static,
{
    pub fn new(engine: Arc<BookingWorkflowEngine<S>>) -> Self {
        Self { engine }
    }

    /// Sweep bounded by the engine's configured I/O timeout.
    pub fn sweep_overdue(&self, now: DateTime<Utc>) -> Result<SweepReport, WorkflowError> {
        self.sweep_overdue_within(now, &self.engine.default_deadline())
    }

    /// Only the candidate query can fail the sweep; per-booking errors are recorded and
    /// the batch moves on.
    pub fn sweep_overdue_within(
        &self,
        now: DateTime<Utc>,
        deadline: &Deadline,
    ) -> Result<SweepReport, WorkflowError> {
        deadline.check("overdue_query")?;
        let candidates = self
            .engine
            .store()
            .overdue_candidates(now)
            .map_err(WorkflowError::Persistence)?;

        let mut report = SweepReport {
            scanned: candidates.len(),
            ..SweepReport::default()
        };

        for booking in candidates {
            match self
                .engine
                .transition_within(&booking.id, BookingStatus::Overdue, None, deadline)
            {
                Ok(_) => report.transitioned.push(booking.id),
                Err(WorkflowError::IllegalTransition { from, .. }) => {
                    debug!(booking_id = %booking.id, status = %from, "booking left active before sweep reached it");
                    report.skipped.push(booking.id);
                }
                Err(err) => {
                    warn!(booking_id = %booking.id, error = %err, "overdue transition failed");
                    report.failed.push(SweepFailure {
                        booking_id: booking.id,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            scanned = report.scanned,
            transitioned = report.transitioned.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "overdue sweep finished"
        );
        Ok(report)
    }
}
