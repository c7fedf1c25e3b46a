use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::workflows::admissions::deferral::DeferralRegistry;
use crate::workflows::admissions::domain::{
    AdmissionIntake, AdmissionRequest, AdmissionRequestId, AdmissionState, EnrollmentRecord,
    InterviewSlot, PeriodId, SchoolPeriod,
};
use crate::workflows::admissions::lifecycle::{
    AdmissionAction, AdmissionStateMachine, LifecyclePolicy,
};
use crate::workflows::admissions::repository::{
    AdmissionRepository, CatalogError, EnrollmentError, EnrollmentExecutor, FamilyNotification,
    NotificationError, NotificationSink, PeriodCatalog, RepositoryError,
};
use crate::workflows::admissions::{AdmissionService, AdmissionsState};

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn slot(year: i32, month: u32, day: u32) -> InterviewSlot {
    InterviewSlot::on(date(year, month, day))
}

pub(super) fn intake() -> AdmissionIntake {
    AdmissionIntake {
        applicant_name: "Lucía Fernández".to_string(),
        family_contact: "familia.fernandez@example.org".to_string(),
        requested_grade: Some("3rd grade".to_string()),
    }
}

pub(super) fn pending_request(suffix: &str) -> AdmissionRequest {
    AdmissionRequest::pending(AdmissionRequestId(format!("adm-{suffix}")), intake())
}

pub(super) fn schedule(slots: Vec<InterviewSlot>) -> AdmissionAction {
    AdmissionAction::Schedule {
        slots,
        required_documents: vec!["Birth certificate".to_string()],
        attachment_links: Vec::new(),
        response_deadline: None,
    }
}

pub(super) fn confirm(slot: InterviewSlot) -> AdmissionAction {
    AdmissionAction::ConfirmDate {
        slot,
        manual_override: false,
    }
}

pub(super) fn interview(performed: bool) -> AdmissionAction {
    AdmissionAction::RecordInterview {
        performed,
        comments: performed.then(|| "Good rapport with the family".to_string()),
    }
}

pub(super) fn decide(accept: bool, message: &str) -> AdmissionAction {
    AdmissionAction::Decide {
        accept,
        message: message.to_string(),
    }
}

pub(super) fn machine() -> AdmissionStateMachine {
    AdmissionStateMachine::default()
}

/// Drives a fresh request through the happy path until it reaches `target`.
pub(super) fn request_in_state(target: AdmissionState) -> AdmissionRequest {
    let machine = machine();
    let mut request = pending_request(target.label());
    let steps = [
        (AdmissionState::ProposalSent, schedule(vec![slot(2025, 3, 10)])),
        (AdmissionState::InterviewScheduled, confirm(slot(2025, 3, 10))),
        (AdmissionState::InterviewDone, interview(true)),
        (AdmissionState::Accepted, decide(true, "Bienvenido")),
    ];

    if target == AdmissionState::Rejected {
        return machine
            .apply(
                &request,
                AdmissionAction::Reject {
                    reason: "No places available".to_string(),
                },
            )
            .expect("early rejection")
            .request;
    }

    for (state, action) in steps {
        if request.state == target {
            break;
        }
        request = machine.apply(&request, action).expect("happy path").request;
        assert_eq!(request.state, state);
    }
    request
}

pub(super) fn periods(entries: &[(&str, i64)]) -> Vec<SchoolPeriod> {
    entries
        .iter()
        .map(|(id, order)| SchoolPeriod::new(*id, *order))
        .collect()
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<AdmissionRequestId, AdmissionRequest>>>,
}

impl MemoryRepository {
    pub(super) fn put(&self, request: AdmissionRequest) {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .insert(request.id.clone(), request);
    }
}

impl AdmissionRepository for MemoryRepository {
    fn insert(&self, request: AdmissionRequest) -> Result<AdmissionRequest, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn update(&self, request: AdmissionRequest) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.insert(request.id.clone(), request);
        Ok(())
    }

    fn fetch(&self, id: &AdmissionRequestId) -> Result<Option<AdmissionRequest>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn pending(&self, limit: usize) -> Result<Vec<AdmissionRequest>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|request| !request.state.is_terminal())
            .take(limit)
            .cloned()
            .collect())
    }
}

pub(super) struct UnavailableRepository;

impl AdmissionRepository for UnavailableRepository {
    fn insert(&self, _request: AdmissionRequest) -> Result<AdmissionRequest, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _request: AdmissionRequest) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &AdmissionRequestId) -> Result<Option<AdmissionRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn pending(&self, _limit: usize) -> Result<Vec<AdmissionRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Holds every fetch open long enough for concurrent callers to overlap.
#[derive(Clone)]
pub(super) struct SlowRepository {
    pub(super) inner: MemoryRepository,
    delay: Duration,
}

impl SlowRepository {
    pub(super) fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryRepository::default(),
            delay,
        }
    }
}

impl AdmissionRepository for SlowRepository {
    fn insert(&self, request: AdmissionRequest) -> Result<AdmissionRequest, RepositoryError> {
        self.inner.insert(request)
    }

    fn update(&self, request: AdmissionRequest) -> Result<(), RepositoryError> {
        self.inner.update(request)
    }

    fn fetch(&self, id: &AdmissionRequestId) -> Result<Option<AdmissionRequest>, RepositoryError> {
        let snapshot = self.inner.fetch(id);
        thread::sleep(self.delay);
        snapshot
    }

    fn pending(&self, limit: usize) -> Result<Vec<AdmissionRequest>, RepositoryError> {
        self.inner.pending(limit)
    }
}

/// Reads succeed but every write fails.
#[derive(Default, Clone)]
pub(super) struct ReadOnlyRepository {
    pub(super) inner: MemoryRepository,
}

impl AdmissionRepository for ReadOnlyRepository {
    fn insert(&self, _request: AdmissionRequest) -> Result<AdmissionRequest, RepositoryError> {
        Err(RepositoryError::Unavailable("replica is read-only".to_string()))
    }

    fn update(&self, _request: AdmissionRequest) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("replica is read-only".to_string()))
    }

    fn fetch(&self, id: &AdmissionRequestId) -> Result<Option<AdmissionRequest>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn pending(&self, limit: usize) -> Result<Vec<AdmissionRequest>, RepositoryError> {
        self.inner.pending(limit)
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifier {
    events: Arc<Mutex<Vec<FamilyNotification>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryNotifier {
    pub(super) fn failing() -> Self {
        let notifier = Self::default();
        notifier.failing.store(true, Ordering::SeqCst);
        notifier
    }

    pub(super) fn events(&self) -> Vec<FamilyNotification> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationSink for MemoryNotifier {
    fn notify(&self, notification: FamilyNotification) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("smtp down".to_string()));
        }
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryCatalog {
    periods: Arc<Mutex<Vec<SchoolPeriod>>>,
}

impl MemoryCatalog {
    pub(super) fn with(periods: Vec<SchoolPeriod>) -> Self {
        Self {
            periods: Arc::new(Mutex::new(periods)),
        }
    }

    pub(super) fn list_now(&self) -> Vec<SchoolPeriod> {
        self.periods.lock().expect("catalog mutex poisoned").clone()
    }

    pub(super) fn add(&self, period: SchoolPeriod) {
        self.periods
            .lock()
            .expect("catalog mutex poisoned")
            .push(period);
    }
}

impl PeriodCatalog for MemoryCatalog {
    fn list(&self) -> Result<Vec<SchoolPeriod>, CatalogError> {
        Ok(self.periods.lock().expect("catalog mutex poisoned").clone())
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingExecutor {
    calls: Arc<AtomicUsize>,
    enrolled: Arc<Mutex<Vec<(AdmissionRequestId, PeriodId, Option<String>)>>>,
}

impl RecordingExecutor {
    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(super) fn enrolled(&self) -> Vec<(AdmissionRequestId, PeriodId, Option<String>)> {
        self.enrolled.lock().expect("executor mutex poisoned").clone()
    }
}

impl EnrollmentExecutor for RecordingExecutor {
    fn enroll(
        &self,
        request_id: &AdmissionRequestId,
        period_id: &PeriodId,
        section_id: Option<&str>,
    ) -> Result<EnrollmentRecord, EnrollmentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.enrolled
            .lock()
            .expect("executor mutex poisoned")
            .push((
                request_id.clone(),
                period_id.clone(),
                section_id.map(str::to_string),
            ));
        Ok(EnrollmentRecord {
            student_id: Some(format!("stu-{call:04}")),
            section_assignment_id: section_id.map(|section| format!("{section}-{call}")),
        })
    }
}

pub(super) type TestService = AdmissionService<MemoryRepository, MemoryNotifier, RecordingExecutor>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) notifier: Arc<MemoryNotifier>,
    pub(super) executor: Arc<RecordingExecutor>,
    pub(super) catalog: Arc<MemoryCatalog>,
    pub(super) deferrals: Arc<DeferralRegistry>,
}

impl Harness {
    pub(super) fn state(
        &self,
    ) -> AdmissionsState<MemoryRepository, MemoryNotifier, RecordingExecutor, MemoryCatalog> {
        AdmissionsState {
            service: self.service.clone(),
            deferrals: self.deferrals.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

pub(super) fn harness_with(notifier: MemoryNotifier, policy: LifecyclePolicy) -> Harness {
    let repository = Arc::new(MemoryRepository::default());
    let notifier = Arc::new(notifier);
    let executor = Arc::new(RecordingExecutor::default());
    let service = Arc::new(AdmissionService::new(
        repository.clone(),
        notifier.clone(),
        executor.clone(),
        policy,
    ));
    Harness {
        service,
        repository,
        notifier,
        executor,
        catalog: Arc::new(MemoryCatalog::with(periods(&[("p-2024", 2024)]))),
        deferrals: Arc::new(DeferralRegistry::default()),
    }
}

pub(super) fn harness() -> Harness {
    harness_with(MemoryNotifier::default(), LifecyclePolicy::default())
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
