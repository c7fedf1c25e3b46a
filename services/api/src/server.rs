use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use admissions::config::AppConfig;
use admissions::error::AppError;
use admissions::telemetry;
use admissions::workflows::admissions::{
    AdmissionServiceError, LifecycleError, PeriodWatcher, ResumeEnrollment, SchoolPeriod,
};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::ServeArgs;
use crate::infra::{admissions_state, ApiAdmissionService, AppState, InMemoryPeriodCatalog};
use crate::routes::with_admission_routes;

const RESUME_CHANNEL_CAPACITY: usize = 32;

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
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let catalog = Arc::new(InMemoryPeriodCatalog::with_periods(
        args.seed_period
            .take()
            .map(|order| vec![SchoolPeriod::new(order.to_string(), order)])
            .unwrap_or_default(),
    ));
    let (admissions, _notifier) =
        admissions_state(config.admissions.lifecycle_policy(), catalog.clone());

    let (resume_tx, resume_rx) = mpsc::channel(RESUME_CHANNEL_CAPACITY);
    PeriodWatcher::new(
        catalog,
        admissions.deferrals.clone(),
        config.admissions.period_poll_interval,
    )
    .spawn(resume_tx);
    spawn_resume_worker(admissions.service.clone(), resume_rx);

    let app = with_admission_routes(admissions)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        poll_secs = config.admissions.period_poll_interval.as_secs(),
        "admissions service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Completes deferred enrollments as the watcher reports new periods.
pub(crate) fn spawn_resume_worker(
    service: Arc<ApiAdmissionService>,
    mut events: mpsc::Receiver<ResumeEnrollment>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match service.resume(&event) {
                Ok(record) => info!(
                    request_id = %event.request_id,
                    period_id = %event.period_id,
                    student_id = ?record.student_id,
                    "deferred enrollment completed"
                ),
                Err(AdmissionServiceError::Lifecycle(LifecycleError::AlreadyEnrolled(_))) => info!(
                    request_id = %event.request_id,
                    "deferred enrollment skipped; request already enrolled"
                ),
                Err(error) => warn!(
                    request_id = %event.request_id,
                    period_id = %event.period_id,
                    %error,
                    "deferred enrollment failed"
                ),
            }
        }
    })
}
