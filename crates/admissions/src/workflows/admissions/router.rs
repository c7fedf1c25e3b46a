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

use crate::error::AppError;

use super::deferral::DeferralRegistry;
use super::domain::{AdmissionIntake, AdmissionRequestId, AdmissionState, PeriodId};
use super::eligibility;
use super::lifecycle::{AdmissionAction, LifecycleEffect, LifecycleError};
use super::repository::{
    AdmissionRepository, AdmissionStatusView, EnrollmentExecutor, NotificationSink,
    PeriodCatalog,
};
use super::service::{AdmissionService, AdmissionServiceError};

/// Shared handles behind the admission routes.
pub struct AdmissionsState<R, N, E, C> {
    pub service: Arc<AdmissionService<R, N, E>>,
    pub deferrals: Arc<DeferralRegistry>,
    pub catalog: Arc<C>,
}

impl<R, N, E, C> Clone for AdmissionsState<R, N, E, C> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            deferrals: self.deferrals.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SlotSelection {
    pub(crate) slot_index: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EnrollmentRequest {
    pub(crate) period_id: String,
    #[serde(default)]
    pub(crate) section_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct TransitionResponse {
    status: AdmissionStatusView,
    effects: Vec<LifecycleEffect>,
}

/// Router builder exposing the admission lifecycle over HTTP.
pub fn admission_router<R, N, E, C>(state: AdmissionsState<R, N, E, C>) -> Router
where
    R: AdmissionRepository + 'static,
    N: NotificationSink + 'static,
    E: EnrollmentExecutor + 'static,
    C: PeriodCatalog + 'static,
{
    Router::new()
        .route("/api/v1/admissions", post(submit_handler::<R, N, E, C>))
        .route(
            "/api/v1/admissions/:request_id",
            get(status_handler::<R, N, E, C>),
        )
        .route(
            "/api/v1/admissions/:request_id/actions",
            post(action_handler::<R, N, E, C>),
        )
        .route(
            "/api/v1/admissions/:request_id/selection",
            post(selection_handler::<R, N, E, C>),
        )
        .route(
            "/api/v1/admissions/:request_id/enrollment",
            post(enrollment_handler::<R, N, E, C>),
        )
        .route(
            "/api/v1/admissions/:request_id/deferral",
            post(defer_handler::<R, N, E, C>).delete(cancel_deferral_handler::<R, N, E, C>),
        )
        .with_state(state)
}

pub(crate) async fn submit_handler<R, N, E, C>(
    State(state): State<AdmissionsState<R, N, E, C>>,
    Json(intake): Json<AdmissionIntake>,
) -> Response
where
    R: AdmissionRepository + 'static,
    N: NotificationSink + 'static,
    E: EnrollmentExecutor + 'static,
    C: PeriodCatalog + 'static,
{
    match state.service.submit(intake) {
        Ok(request) => {
            let view = AdmissionStatusView::from_request(&request);
            (StatusCode::CREATED, Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<R, N, E, C>(
    State(state): State<AdmissionsState<R, N, E, C>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: AdmissionRepository + 'static,
    N: NotificationSink + 'static,
    E: EnrollmentExecutor + 'static,
    C: PeriodCatalog + 'static,
{
    match state.service.status(&AdmissionRequestId(request_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn action_handler<R, N, E, C>(
    State(state): State<AdmissionsState<R, N, E, C>>,
    Path(request_id): Path<String>,
    Json(action): Json<AdmissionAction>,
) -> Response
where
    R: AdmissionRepository + 'static,
    N: NotificationSink + 'static,
    E: EnrollmentExecutor + 'static,
    C: PeriodCatalog + 'static,
{
    let id = AdmissionRequestId(request_id);
    match state.service.apply(&id, action) {
        Ok(transition) => {
            if transition.to == AdmissionState::Rejected {
                state.deferrals.cancel(&id);
            }
            let payload = TransitionResponse {
                status: AdmissionStatusView::from_request(&transition.request),
                effects: transition.effects,
            };
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn selection_handler<R, N, E, C>(
    State(state): State<AdmissionsState<R, N, E, C>>,
    Path(request_id): Path<String>,
    Json(selection): Json<SlotSelection>,
) -> Response
where
    R: AdmissionRepository + 'static,
    N: NotificationSink + 'static,
    E: EnrollmentExecutor + 'static,
    C: PeriodCatalog + 'static,
{
    let id = AdmissionRequestId(request_id);
    match state.service.select_slot(&id, selection.slot_index) {
        Ok(request) => {
            let view = AdmissionStatusView::from_request(&request);
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn enrollment_handler<R, N, E, C>(
    State(state): State<AdmissionsState<R, N, E, C>>,
    Path(request_id): Path<String>,
    Json(body): Json<EnrollmentRequest>,
) -> Response
where
    R: AdmissionRepository + 'static,
    N: NotificationSink + 'static,
    E: EnrollmentExecutor + 'static,
    C: PeriodCatalog + 'static,
{
    let id = AdmissionRequestId(request_id);
    let period_id = PeriodId(body.period_id);
    match state
        .service
        .enroll(&id, &period_id, body.section_id.as_deref())
    {
        Ok(record) => {
            // Enrolled through another path; a waiting deferral must not fire later.
            state.deferrals.cancel(&id);
            (StatusCode::CREATED, Json(record)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn defer_handler<R, N, E, C>(
    State(state): State<AdmissionsState<R, N, E, C>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: AdmissionRepository + 'static,
    N: NotificationSink + 'static,
    E: EnrollmentExecutor + 'static,
    C: PeriodCatalog + 'static,
{
    let id = AdmissionRequestId(request_id);
    let request = match state.service.get(&id) {
        Ok(request) => request,
        Err(error) => return error_response(error),
    };

    if eligibility::is_already_enrolled(&request) {
        return error_response(LifecycleError::AlreadyEnrolled(request.id).into());
    }
    if request.state != AdmissionState::Accepted {
        return error_response(
            LifecycleError::NotEnrollable {
                id: request.id,
                state: request.state,
            }
            .into(),
        );
    }

    let periods = match state.catalog.list() {
        Ok(periods) => periods,
        Err(error) => {
            let payload = json!({ "error": error.to_string() });
            return (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response();
        }
    };

    let ticket = state.deferrals.request(&id, &periods);
    (StatusCode::ACCEPTED, Json(ticket)).into_response()
}

pub(crate) async fn cancel_deferral_handler<R, N, E, C>(
    State(state): State<AdmissionsState<R, N, E, C>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: AdmissionRepository + 'static,
    N: NotificationSink + 'static,
    E: EnrollmentExecutor + 'static,
    C: PeriodCatalog + 'static,
{
    let id = AdmissionRequestId(request_id);
    let cancelled = state.deferrals.cancel(&id);
    let payload = json!({ "request_id": id.0, "cancelled": cancelled });
    (StatusCode::OK, Json(payload)).into_response()
}

fn error_response(error: AdmissionServiceError) -> Response {
    AppError::from(error).into_response()
}
