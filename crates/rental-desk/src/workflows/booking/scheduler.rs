use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::engine::BookingWorkflowEngine;
use super::reconcile::{ReconciliationReport, ResourceReconciler};
use super::repository::{Clock, EntityStore};
use super::sweeper::{OverdueSweeper, SweepReport};

/// Results of one maintenance pass; `None` where the step failed (already logged).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenancePass {
    pub sweep: Option<SweepReport>,
    pub reconciliation: Option<ReconciliationReport>,
}

/// Runs the overdue sweep and the resource reconciliation on a fixed interval.
pub struct MaintenanceScheduler<S> {
    sweeper: Arc<OverdueSweeper<S>>,
    reconciler: Arc<ResourceReconciler<S>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl<S> MaintenanceScheduler<S>
where
    S: EntityStore + 'static,
{
    pub fn new(engine: Arc<BookingWorkflowEngine<S>>, interval: Duration) -> Self {
        Self {
            reconciler: Arc::new(ResourceReconciler::new(engine.store().clone())),
            clock: engine.clock().clone(),
            sweeper: Arc::new(OverdueSweeper::new(engine)),
            interval,
        }
    }

    /// Tick until `shutdown` flips to `true` or its sender is dropped. The first pass runs
    /// immediately.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "maintenance scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("maintenance scheduler stopped");
    }

    pub async fn run_once(&self) -> MaintenancePass {
        let now = self.clock.now();

        let sweeper = self.sweeper.clone();
        let sweep = match tokio::task::spawn_blocking(move || sweeper.sweep_overdue(now)).await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(err)) => {
                warn!(error = %err, "overdue sweep aborted");
                None
            }
            Err(err) => {
                error!(error = %err, "overdue sweep task panicked");
                None
            }
        };

        let reconciler = self.reconciler.clone();
        let reconciliation = match tokio::task::spawn_blocking(move || reconciler.reconcile()).await
        {
            Ok(Ok(report)) => Some(report),
            Ok(Err(err)) => {
                warn!(error = %err, "resource reconciliation aborted");
                None
            }
            Err(err) => {
                error!(error = %err, "resource reconciliation task panicked");
                None
            }
        };

        MaintenancePass {
            sweep,
            reconciliation,
        }
    }
}
