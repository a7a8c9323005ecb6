use crate::cli::ServeArgs;
use crate::infra::{seed_demo_fleet, AppState, LoggingDispatcher};
use crate::routes::with_booking_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use rental_desk::config::AppConfig;
use rental_desk::error::AppError;
use rental_desk::telemetry;
use rental_desk::workflows::booking::{
    BookingWorkflowEngine, Clock, InMemoryEntityStore, MaintenanceScheduler, SystemClock,
    WorkflowError,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let rules = config.workflow.load_rules()?;
    info!(
        rules = rules.len(),
        source = ?config.workflow.notification_rules,
        "notification rules loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryEntityStore::new());
    if args.seed_demo {
        seed_demo_fleet(&store, clock.now())
            .map_err(|err| AppError::Workflow(WorkflowError::Persistence(err)))?;
        info!(bookings = store.bookings().len(), "demo fleet seeded");
    }

    let engine = Arc::new(
        BookingWorkflowEngine::new(
            store,
            Arc::new(LoggingDispatcher::default()),
            Arc::new(rules),
            clock,
        )?
        .with_options(config.workflow.engine_options()),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = MaintenanceScheduler::new(engine.clone(), config.workflow.sweep_interval);
    let maintenance = tokio::spawn(scheduler.run(shutdown_rx));

    let app = with_booking_routes(engine.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "rental desk ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    readiness_flag.store(false, Ordering::Release);
    let _ = shutdown_tx.send(true);
    if let Err(err) = maintenance.await {
        warn!(error = %err, "maintenance scheduler ended abnormally");
    }
    engine.flush_notifications();
    info!("rental desk stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
