use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::domain::{Booking, BookingId, UserId};
use super::engine::{BookingWorkflowEngine, WorkflowError};
use super::reconcile::ResourceReconciler;
use super::repository::EntityStore;
use super::status::{status_descriptors, BookingStatus};
use super::sweeper::OverdueSweeper;

/// Shared state behind the booking routes.
pub struct BookingApi<S> {
    engine: Arc<BookingWorkflowEngine<S>>,
    sweeper: OverdueSweeper<S>,
    reconciler: ResourceReconciler<S>,
}

impl<S> BookingApi<S>
where
    S: EntityStore + 'static,
{
    pub fn new(engine: Arc<BookingWorkflowEngine<S>>) -> Self {
        Self {
            sweeper: OverdueSweeper::new(engine.clone()),
            reconciler: ResourceReconciler::new(engine.store().clone()),
            engine,
        }
    }
}

/// Request body for a status change.
#[derive(Debug, Clone, Deserialize)]
pub struct TransitionPayload {
    pub target: BookingStatus,
    #[serde(default)]
    pub acting_user: Option<UserId>,
}

/// Booking plus the presentation metadata admin screens need.
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub status_label: &'static str,
    pub status_color: &'static str,
    pub allowed_transitions: Vec<BookingStatus>,
}

impl From<Booking> for BookingView {
    fn from(booking: Booking) -> Self {
        let status = booking.status;
        Self {
            booking,
            status_label: status.label(),
            status_color: status.color(),
            allowed_transitions: status.successors().to_vec(),
        }
    }
}

/// Router builder exposing the booking lifecycle over HTTP.
pub fn booking_router<S>(engine: Arc<BookingWorkflowEngine<S>>) -> Router
where
    S: EntityStore + 'static,
{
    Router::new()
        .route("/api/v1/booking-statuses", get(statuses_handler))
        .route("/api/v1/bookings/:booking_id", get(booking_handler::<S>))
        .route(
            "/api/v1/bookings/:booking_id/transitions",
            post(transition_handler::<S>),
        )
        .route("/api/v1/bookings/overdue-sweeps", post(sweep_handler::<S>))
        .route(
            "/api/v1/resources/reconciliations",
            post(reconcile_handler::<S>),
        )
        .with_state(Arc::new(BookingApi::new(engine)))
}

pub(crate) async fn statuses_handler() -> Response {
    (StatusCode::OK, Json(status_descriptors())).into_response()
}

pub(crate) async fn booking_handler<S>(
    State(api): State<Arc<BookingApi<S>>>,
    Path(booking_id): Path<String>,
) -> Response
where
    S: EntityStore + 'static,
{
    let booking_id = BookingId(booking_id);
    match run_blocking(move || api.engine.booking(&booking_id)).await {
        Ok(Ok(booking)) => (StatusCode::OK, Json(BookingView::from(booking))).into_response(),
        Ok(Err(err)) => workflow_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn transition_handler<S>(
    State(api): State<Arc<BookingApi<S>>>,
    Path(booking_id): Path<String>,
    Json(payload): Json<TransitionPayload>,
) -> Response
where
    S: EntityStore + 'static,
{
    let booking_id = BookingId(booking_id);
    let outcome = run_blocking(move || {
        api.engine
            .transition(&booking_id, payload.target, payload.acting_user.as_ref())
    })
    .await;
    match outcome {
        Ok(Ok(booking)) => (StatusCode::OK, Json(BookingView::from(booking))).into_response(),
        Ok(Err(err)) => workflow_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn sweep_handler<S>(State(api): State<Arc<BookingApi<S>>>) -> Response
where
    S: EntityStore + 'static,
{
    let outcome = run_blocking(move || {
        let now = api.engine.clock().now();
        api.sweeper.sweep_overdue(now)
    })
    .await;
    match outcome {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Err(err)) => workflow_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn reconcile_handler<S>(State(api): State<Arc<BookingApi<S>>>) -> Response
where
    S: EntityStore + 'static,
{
    match run_blocking(move || api.reconciler.reconcile()).await {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Err(err)) => workflow_error_response(err),
        Err(response) => response,
    }
}

/// Engine calls block on the per-booking lock and on store I/O, so they run on the
/// blocking pool.
async fn run_blocking<T, F>(work: F) -> Result<T, Response>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|err| {
        error!(error = %err, "booking request task failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "internal error" })),
        )
            .into_response()
    })
}

/// HTTP status for a workflow error: client errors map to 4xx, store trouble to 5xx.
pub fn workflow_error_status(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::BookingNotFound(_) | WorkflowError::ResourceNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        WorkflowError::IllegalTransition { .. } | WorkflowError::Conflict(_) => {
            StatusCode::CONFLICT
        }
        WorkflowError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
        WorkflowError::DeadlineExceeded { .. } | WorkflowError::Cancelled { .. } => {
            StatusCode::GATEWAY_TIMEOUT
        }
    }
}

fn workflow_error_response(err: WorkflowError) -> Response {
    let status = workflow_error_status(&err);
    let payload = match &err {
        WorkflowError::IllegalTransition {
            booking_id,
            from,
            to,
        } => json!({
            "error": err.to_string(),
            "booking_id": booking_id,
            "current": from,
            "attempted": to,
        }),
        _ => json!({ "error": err.to_string() }),
    };
    (status, Json(payload)).into_response()
}
