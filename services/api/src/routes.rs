use std::sync::Arc;

use admissions::workflows::admissions::{admission_router, PeriodCatalog, SchoolPeriod};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use crate::infra::{ApiAdmissionsState, AppState, InMemoryPeriodCatalog};

#[derive(Debug, Deserialize)]
pub(crate) struct NewPeriod {
    pub(crate) id: String,
    pub(crate) order_value: i64,
    #[serde(default)]
    pub(crate) name: Option<String>,
}

pub(crate) fn with_admission_routes(state: ApiAdmissionsState) -> axum::Router {
    let catalog = state.catalog.clone();
    admission_router(state)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route(
            "/api/v1/periods",
            get(list_periods_endpoint).post(create_period_endpoint),
        )
        .layer(Extension(catalog))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn list_periods_endpoint(
    Extension(catalog): Extension<Arc<InMemoryPeriodCatalog>>,
) -> impl IntoResponse {
    match catalog.list() {
        Ok(periods) => (StatusCode::OK, Json(json!({ "periods": periods }))),
        Err(error) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": error.to_string() })),
        ),
    }
}

/// Period creation; the watcher picks the new period up on its next poll.
pub(crate) async fn create_period_endpoint(
    Extension(catalog): Extension<Arc<InMemoryPeriodCatalog>>,
    Json(payload): Json<NewPeriod>,
) -> impl IntoResponse {
    let NewPeriod {
        id,
        order_value,
        name,
    } = payload;
    let mut period = SchoolPeriod::new(id, order_value);
    period.name = name;
    catalog.create(period.clone());
    (StatusCode::CREATED, Json(period))
}
