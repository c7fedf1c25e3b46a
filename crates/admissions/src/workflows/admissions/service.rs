use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use super::deferral::ResumeEnrollment;
use super::domain::{
    AdmissionIntake, AdmissionRequest, AdmissionRequestId, AdmissionState, EnrollmentRecord,
    PeriodId,
};
use super::eligibility;
use super::lifecycle::{
    AdmissionAction, AdmissionStateMachine, LifecycleEffect, LifecycleError, LifecyclePolicy,
    Transition,
};
use super::repository::{
    AdmissionRepository, AdmissionStatusView, EnrollmentError, EnrollmentExecutor,
    FamilyNotification, NotificationSink, RepositoryError,
};

/// Service composing the state machine with the external collaborators.
pub struct AdmissionService<R, N, E> {
    machine: AdmissionStateMachine,
    repository: Arc<R>,
    notifier: Arc<N>,
    executor: Arc<E>,
    /// Serializes every read-modify-write of a stored snapshot.
    write_lock: Mutex<()>,
}

static ADMISSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> AdmissionRequestId {
    let id = ADMISSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    AdmissionRequestId(format!("adm-{id:06}"))
}

impl<R, N, E> AdmissionService<R, N, E>
where
    R: AdmissionRepository + 'static,
    N: NotificationSink + 'static,
    E: EnrollmentExecutor + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifier: Arc<N>,
        executor: Arc<E>,
        policy: LifecyclePolicy,
    ) -> Self {
        Self {
            machine: AdmissionStateMachine::new(policy),
            repository,
            notifier,
            executor,
            write_lock: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> LifecyclePolicy {
        self.machine.policy()
    }

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a newly received request in `Pending`.
    pub fn submit(
        &self,
        intake: AdmissionIntake,
    ) -> Result<AdmissionRequest, AdmissionServiceError> {
        let request = AdmissionRequest::pending(next_request_id(), intake);
        let stored = self.repository.insert(request)?;
        info!(request_id = %stored.id, "admission request received");
        Ok(stored)
    }

    pub fn get(&self, id: &AdmissionRequestId) -> Result<AdmissionRequest, AdmissionServiceError> {
        let request = self
            .repository
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(request)
    }

    pub fn status(
        &self,
        id: &AdmissionRequestId,
    ) -> Result<AdmissionStatusView, AdmissionServiceError> {
        let request = self.get(id)?;
        Ok(AdmissionStatusView::from_request(&request))
    }

    pub fn pending(&self, limit: usize) -> Result<Vec<AdmissionRequest>, AdmissionServiceError> {
        Ok(self.repository.pending(limit)?)
    }

    /// Apply a staff action, persist the result, then run its side effects.
    ///
    /// The snapshot is read and written under the service write lock, so two actions
    /// never commit from the same snapshot; the later one sees the earlier result.
    pub fn apply(
        &self,
        id: &AdmissionRequestId,
        action: AdmissionAction,
    ) -> Result<Transition, AdmissionServiceError> {
        let kind = action.kind();
        let transition = {
            let _guard = self.write_guard();
            let request = self.get(id)?;
            let transition = self.machine.apply(&request, action)?;
            self.repository.update(transition.request.clone())?;
            transition
        };

        info!(
            request_id = %id,
            action = %kind,
            from = transition.from.label(),
            to = transition.to.label(),
            "admission transition committed"
        );

        self.dispatch_effects(&transition);
        Ok(transition)
    }

    /// Record the family's preferred slot without moving the lifecycle state.
    pub fn select_slot(
        &self,
        id: &AdmissionRequestId,
        index: usize,
    ) -> Result<AdmissionRequest, AdmissionServiceError> {
        let _guard = self.write_guard();
        let request = self.get(id)?;
        let next = self.machine.select_slot(&request, index)?;
        self.repository.update(next.clone())?;
        info!(request_id = %id, slot_index = index, "family slot preference recorded");
        Ok(next)
    }

    /// Enroll an accepted applicant into `period_id`.
    ///
    /// Enrollment state is re-read under the service lock, and once more after the
    /// executor returns, so a stale eligibility display can never double-enroll.
    pub fn enroll(
        &self,
        id: &AdmissionRequestId,
        period_id: &PeriodId,
        section_id: Option<&str>,
    ) -> Result<EnrollmentRecord, AdmissionServiceError> {
        let _guard = self.write_guard();

        let request = self.get(id)?;
        if eligibility::is_already_enrolled(&request) {
            return Err(LifecycleError::AlreadyEnrolled(request.id).into());
        }
        if request.state != AdmissionState::Accepted || !eligibility::is_enrollable(&request) {
            return Err(LifecycleError::NotEnrollable {
                id: request.id,
                state: request.state,
            }
            .into());
        }

        let record = self.executor.enroll(id, period_id, section_id)?;

        match self.commit_enrollment(id, &record) {
            Ok(()) => {
                info!(request_id = %id, period_id = %period_id, "admission request enrolled");
                Ok(record)
            }
            Err(AdmissionServiceError::Lifecycle(LifecycleError::AlreadyEnrolled(existing))) => {
                warn!(
                    request_id = %id,
                    period_id = %period_id,
                    "request was enrolled concurrently; discarding executor result"
                );
                Err(LifecycleError::AlreadyEnrolled(existing).into())
            }
            Err(error) => {
                warn!(
                    request_id = %id,
                    period_id = %period_id,
                    student_id = ?record.student_id,
                    section_assignment_id = ?record.section_assignment_id,
                    %error,
                    "enrollment records exist but were not stored on the request; reconcile before retrying"
                );
                Err(error)
            }
        }
    }

    /// Re-reads the snapshot after the executor ran and stores the new records on it.
    fn commit_enrollment(
        &self,
        id: &AdmissionRequestId,
        record: &EnrollmentRecord,
    ) -> Result<(), AdmissionServiceError> {
        let latest = self.get(id)?;
        let next = self.machine.record_enrollment(&latest, record.clone())?;
        self.repository.update(next)?;
        Ok(())
    }

    /// Continue a deferred enrollment into the period that just appeared.
    pub fn resume(
        &self,
        event: &ResumeEnrollment,
    ) -> Result<EnrollmentRecord, AdmissionServiceError> {
        self.enroll(&event.request_id, &event.period_id, None)
    }

    fn dispatch_effects(&self, transition: &Transition) {
        for effect in &transition.effects {
            match effect {
                LifecycleEffect::NotifyFamily { notice } => {
                    let notification =
                        FamilyNotification::for_request(*notice, &transition.request);
                    if let Err(error) = self.notifier.notify(notification) {
                        warn!(
                            request_id = %transition.request.id,
                            template = notice.template(),
                            %error,
                            "family notification failed; transition stays committed"
                        );
                    }
                }
                LifecycleEffect::RescheduleExpected => {
                    info!(
                        request_id = %transition.request.id,
                        "interview did not take place; awaiting a new proposal"
                    );
                }
            }
        }
    }
}

/// Error raised by the admission service.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionServiceError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),
}
