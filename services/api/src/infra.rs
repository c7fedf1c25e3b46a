use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use admissions::workflows::admissions::{
    AdmissionRepository, AdmissionRequest, AdmissionRequestId, AdmissionService, AdmissionsState,
    CatalogError, DeferralRegistry, EnrollmentError, EnrollmentExecutor, EnrollmentRecord,
    FamilyNotification, LifecyclePolicy, NotificationError, NotificationSink, PeriodCatalog,
    PeriodId, RepositoryError, SchoolPeriod,
};
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ApiAdmissionsState = AdmissionsState<
    InMemoryAdmissionRepository,
    LoggingNotificationSink,
    CatalogEnrollmentExecutor,
    InMemoryPeriodCatalog,
>;

pub(crate) type ApiAdmissionService = AdmissionService<
    InMemoryAdmissionRepository,
    LoggingNotificationSink,
    CatalogEnrollmentExecutor,
>;

#[derive(Default, Clone)]
pub(crate) struct InMemoryAdmissionRepository {
    records: Arc<Mutex<HashMap<AdmissionRequestId, AdmissionRequest>>>,
}

impl AdmissionRepository for InMemoryAdmissionRepository {
    fn insert(&self, request: AdmissionRequest) -> Result<AdmissionRequest, RepositoryError> {
        let mut guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn update(&self, request: AdmissionRequest) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.contains_key(&request.id) {
            guard.insert(request.id.clone(), request);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &AdmissionRequestId) -> Result<Option<AdmissionRequest>, RepositoryError> {
        let guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(id).cloned())
    }

    fn pending(&self, limit: usize) -> Result<Vec<AdmissionRequest>, RepositoryError> {
        let guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut open: Vec<AdmissionRequest> = guard
            .values()
            .filter(|request| !request.state.is_terminal())
            .cloned()
            .collect();
        open.sort_by(|left, right| left.id.cmp(&right.id));
        open.truncate(limit);
        Ok(open)
    }
}

/// Writes family notices to the log and keeps them for inspection.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotificationSink {
    sent: Arc<Mutex<Vec<FamilyNotification>>>,
}

impl NotificationSink for LoggingNotificationSink {
    fn notify(&self, notification: FamilyNotification) -> Result<(), NotificationError> {
        info!(
            request_id = %notification.request_id,
            template = %notification.template,
            recipient = %notification.recipient,
            "family notification queued"
        );
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
        Ok(())
    }
}

impl LoggingNotificationSink {
    pub(crate) fn sent(&self) -> Vec<FamilyNotification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryPeriodCatalog {
    periods: Arc<Mutex<Vec<SchoolPeriod>>>,
}

impl InMemoryPeriodCatalog {
    pub(crate) fn with_periods(periods: Vec<SchoolPeriod>) -> Self {
        Self {
            periods: Arc::new(Mutex::new(periods)),
        }
    }

    pub(crate) fn create(&self, period: SchoolPeriod) {
        info!(period_id = %period.id, order_value = period.order_value, "school period created");
        self.periods
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(period);
    }

    fn contains(&self, id: &PeriodId) -> bool {
        self.periods
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|period| &period.id == id)
    }
}

impl PeriodCatalog for InMemoryPeriodCatalog {
    fn list(&self) -> Result<Vec<SchoolPeriod>, CatalogError> {
        Ok(self.periods.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

/// Creates student records against periods known to the catalog.
#[derive(Clone)]
pub(crate) struct CatalogEnrollmentExecutor {
    catalog: Arc<InMemoryPeriodCatalog>,
    sequence: Arc<AtomicU64>,
}

impl CatalogEnrollmentExecutor {
    pub(crate) fn new(catalog: Arc<InMemoryPeriodCatalog>) -> Self {
        Self {
            catalog,
            sequence: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl EnrollmentExecutor for CatalogEnrollmentExecutor {
    fn enroll(
        &self,
        request_id: &AdmissionRequestId,
        period_id: &PeriodId,
        section_id: Option<&str>,
    ) -> Result<EnrollmentRecord, EnrollmentError> {
        if !self.catalog.contains(period_id) {
            return Err(EnrollmentError::UnknownPeriod(period_id.clone()));
        }
        let student = self.sequence.fetch_add(1, Ordering::Relaxed);
        info!(%request_id, %period_id, "student record created");
        Ok(EnrollmentRecord {
            student_id: Some(format!("stu-{student:05}")),
            section_assignment_id: section_id.map(|section| format!("{period_id}:{section}")),
        })
    }
}

/// Wires the in-memory collaborators into the shared admission state.
pub(crate) fn admissions_state(
    policy: LifecyclePolicy,
    catalog: Arc<InMemoryPeriodCatalog>,
) -> (ApiAdmissionsState, Arc<LoggingNotificationSink>) {
    let notifier = Arc::new(LoggingNotificationSink::default());
    let service = Arc::new(AdmissionService::new(
        Arc::new(InMemoryAdmissionRepository::default()),
        notifier.clone(),
        Arc::new(CatalogEnrollmentExecutor::new(catalog.clone())),
        policy,
    ));
    let state = AdmissionsState {
        service,
        deferrals: Arc::new(DeferralRegistry::default()),
        catalog,
    };
    (state, notifier)
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
