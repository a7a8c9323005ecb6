use crate::infra::{seed_demo_fleet, LoggingDispatcher};
use chrono::{Duration, Utc};
use clap::Args;
use rental_desk::error::AppError;
use rental_desk::workflows::booking::{
    status_descriptors, BookingId, BookingStatus, BookingWorkflowEngine, Clock, InMemoryAuditLog,
    InMemoryEntityStore, ManualClock, NotificationRules, OverdueSweeper, ResourceReconciler,
    UserId, WorkflowError,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// JSON or CSV notification rule file (defaults to the built-in table)
    #[arg(long)]
    pub(crate) rules: Option<PathBuf>,
}

pub(crate) fn print_statuses() {
    println!("Booking statuses");
    for descriptor in status_descriptors() {
        let successors: Vec<&str> = descriptor
            .successors
            .iter()
            .map(|status| status.key())
            .collect();
        let next = if descriptor.terminal {
            "(terminal)".to_string()
        } else {
            successors.join(", ")
        };
        println!(
            "- {:<10} {:<22} -> {}",
            descriptor.status.key(),
            descriptor.label,
            next
        );
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let rules = match &args.rules {
        Some(path) => NotificationRules::from_path(path)?,
        None => NotificationRules::standard(),
    };

    let opened_at = Utc::now();
    let clock = Arc::new(ManualClock::new(opened_at));
    let store = Arc::new(InMemoryEntityStore::new());
    seed_demo_fleet(&store, opened_at)
        .map_err(|err| AppError::Workflow(WorkflowError::Persistence(err)))?;

    let dispatcher = LoggingDispatcher::default();
    let audit = Arc::new(InMemoryAuditLog::default());
    let engine = Arc::new(
        BookingWorkflowEngine::new(
            store.clone(),
            Arc::new(dispatcher.clone()),
            Arc::new(rules),
            clock.clone(),
        )?
        .with_audit_sink(audit.clone()),
    );

    println!("Rental desk demo");
    println!("Fleet opened at {}", opened_at.to_rfc3339());
    println!(
        "{} notification rules loaded ({})",
        engine.rules().len(),
        args.rules
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "built-in".to_string())
    );

    let staff = UserId::from("staff-dana");
    let booking = BookingId::from("bk-1001");

    println!("\nLifecycle of {booking}");
    for (target, actor) in [
        (BookingStatus::Pending, None),
        (BookingStatus::Verified, Some(&staff)),
        (BookingStatus::Confirmed, None),
        (BookingStatus::Active, None),
    ] {
        clock.advance(Duration::hours(6));
        report_transition(&engine, &booking, target, actor);
    }

    println!("\nAttempting an illegal move");
    report_transition(&engine, &booking, BookingStatus::Cancelled, Some(&staff));

    println!("\nReviewing bk-1003");
    report_transition(
        &engine,
        &BookingId::from("bk-1003"),
        BookingStatus::Rejected,
        Some(&staff),
    );

    clock.advance(Duration::days(5));
    println!("\nOverdue sweep at {}", clock_now(&engine));
    let sweep = OverdueSweeper::new(engine.clone()).sweep_overdue(clock_now(&engine))?;
    println!(
        "- scanned {} | transitioned {} | skipped {} | failed {}",
        sweep.scanned,
        sweep.transitioned_count(),
        sweep.skipped.len(),
        sweep.failed.len()
    );
    for id in &sweep.transitioned {
        println!("  - {id} is now overdue");
    }

    let reconciliation = ResourceReconciler::new(store.clone()).reconcile()?;
    println!(
        "\nResource reconciliation: {} inspected, {} repaired, {} divergent",
        reconciliation.inspected,
        reconciliation.repaired.len(),
        reconciliation.divergent.len()
    );
    for divergence in &reconciliation.divergent {
        println!("  - {}: {}", divergence.resource_id, divergence.reason);
    }

    println!("\nAudit trail");
    for entry in audit.entries() {
        println!(
            "- {} {} -> {} by {} at {}",
            entry.booking_id,
            entry.previous_status,
            entry.target_status,
            entry
                .acting_user
                .as_ref()
                .map(|user| user.0.as_str())
                .unwrap_or("system"),
            entry.recorded_at.to_rfc3339()
        );
    }

    engine.flush_notifications();
    let events = dispatcher.events();
    println!("\nNotifications dispatched ({})", events.len());
    for event in events {
        println!(
            "- [{}] {} -> {} ({})",
            event.idempotency_key, event.template, event.recipient, event.role
        );
    }

    Ok(())
}

fn clock_now(engine: &BookingWorkflowEngine<InMemoryEntityStore>) -> chrono::DateTime<Utc> {
    engine.clock().now()
}

fn report_transition(
    engine: &BookingWorkflowEngine<InMemoryEntityStore>,
    booking_id: &BookingId,
    target: BookingStatus,
    actor: Option<&UserId>,
) {
    match engine.transition(booking_id, target, actor) {
        Ok(booking) => println!(
            "- {} -> {} ({}), payment {}, verification {}",
            booking.id,
            booking.status.key(),
            booking.status.label(),
            booking.payment_status.label(),
            booking.verification_status.label()
        ),
        Err(err) => println!("- {booking_id}: {err}"),
    }
}
