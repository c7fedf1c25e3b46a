//! Admission request lifecycle, progress timeline, enrollment eligibility, and
//! deferred enrollment into school periods that have not been created yet.
//!
//! The state machine, timeline, and eligibility checks are pure functions over
//! snapshots. Persistence, notifications, the period catalog, and enrollment record
//! creation are reached only through the traits in [`repository`].

pub mod deferral;
pub mod domain;
pub mod eligibility;
pub mod lifecycle;
pub mod repository;
pub mod router;
pub mod service;
pub mod timeline;
pub mod watcher;

#[cfg(test)]
mod tests;

pub use deferral::{
    DeferralRegistry, DeferralTicket, DeferredEnrollmentCoordinator, PendingDeferral,
    ResumeEnrollment,
};
pub use domain::{
    AdmissionIntake, AdmissionRequest, AdmissionRequestId, AdmissionState, EnrollmentRecord,
    InterviewSlot, LegacyEnrollmentFlags, PeriodId, SchoolPeriod, TimeRange, MAX_PROPOSED_SLOTS,
};
pub use eligibility::{is_already_enrolled, is_enrollable, EnrollmentSignal};
pub use lifecycle::{
    available_actions, ActionKind, AdmissionAction, AdmissionStateMachine, FamilyNotice,
    GuardViolation, LifecycleEffect, LifecycleError, LifecyclePolicy, Transition,
};
pub use repository::{
    AdmissionRepository, AdmissionStatusView, CatalogError, EnrollmentError, EnrollmentExecutor,
    FamilyNotification, NotificationError, NotificationSink, PeriodCatalog, RepositoryError,
};
pub use router::{admission_router, AdmissionsState};
pub use service::{AdmissionService, AdmissionServiceError};
pub use timeline::{
    confirmation_source, current_step, derive_timeline, ConfirmationSource, StepStatus,
    TimelineEntry, TimelineStep,
};
pub use watcher::PeriodWatcher;
