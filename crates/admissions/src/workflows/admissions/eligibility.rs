//! Reconciles the overlapping enrollment signals a snapshot may carry.
//!
//! Upstream records can be partially populated or stale, so "already enrolled" is an
//! OR over every named source of evidence. Under-reporting risks a double enrollment.

use serde::Serialize;

use super::domain::{AdmissionRequest, AdmissionState};

/// Every piece of evidence that an enrollment already happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentSignal {
    GeneratedFlag,
    StudentLinked,
    SectionAssigned,
    LegacyStudentCreated,
    LegacyEnrolledFlag,
}

impl EnrollmentSignal {
    pub const ALL: [Self; 5] = [
        Self::GeneratedFlag,
        Self::StudentLinked,
        Self::SectionAssigned,
        Self::LegacyStudentCreated,
        Self::LegacyEnrolledFlag,
    ];

    pub fn observed_in(self, request: &AdmissionRequest) -> bool {
        match self {
            Self::GeneratedFlag => request.enrollment_generated == Some(true),
            Self::StudentLinked => request
                .enrollment
                .as_ref()
                .and_then(|record| record.student_id.as_deref())
                .is_some_and(|id| !id.trim().is_empty()),
            Self::SectionAssigned => request
                .enrollment
                .as_ref()
                .and_then(|record| record.section_assignment_id.as_deref())
                .is_some_and(|id| !id.trim().is_empty()),
            Self::LegacyStudentCreated => request
                .legacy_flags
                .and_then(|flags| flags.student_created)
                .unwrap_or(false),
            Self::LegacyEnrolledFlag => request
                .legacy_flags
                .and_then(|flags| flags.enrolled)
                .unwrap_or(false),
        }
    }
}

/// Signals present in the snapshot, for audit displays.
pub fn enrollment_signals(request: &AdmissionRequest) -> Vec<EnrollmentSignal> {
    EnrollmentSignal::ALL
        .into_iter()
        .filter(|signal| signal.observed_in(request))
        .collect()
}

pub fn is_already_enrolled(request: &AdmissionRequest) -> bool {
    EnrollmentSignal::ALL
        .into_iter()
        .any(|signal| signal.observed_in(request))
}

pub fn is_enrollable(request: &AdmissionRequest) -> bool {
    if is_already_enrolled(request) {
        return false;
    }

    request.interview_held()
        || matches!(
            request.state,
            AdmissionState::InterviewDone | AdmissionState::Accepted
        )
}
