use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{
    AdmissionRequest, AdmissionRequestId, AdmissionState, EnrollmentRecord, PeriodId,
    SchoolPeriod,
};
use super::eligibility::{self, EnrollmentSignal};
use super::lifecycle::{self, ActionKind, FamilyNotice};
use super::timeline::{self, ConfirmationSource, TimelineEntry};

/// Storage abstraction for admission request snapshots.
pub trait AdmissionRepository: Send + Sync {
    fn insert(&self, request: AdmissionRequest) -> Result<AdmissionRequest, RepositoryError>;
    fn update(&self, request: AdmissionRequest) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &AdmissionRequestId) -> Result<Option<AdmissionRequest>, RepositoryError>;
    fn pending(&self, limit: usize) -> Result<Vec<AdmissionRequest>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Read side of the school period catalog.
pub trait PeriodCatalog: Send + Sync {
    fn list(&self) -> Result<Vec<SchoolPeriod>, CatalogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("period catalog unavailable: {0}")]
    Unavailable(String),
}

/// Outbound family notifications (e-mail or messaging adapters). Best effort.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: FamilyNotification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyNotification {
    pub template: String,
    pub request_id: AdmissionRequestId,
    pub recipient: String,
    pub details: BTreeMap<String, String>,
}

impl FamilyNotification {
    pub fn for_request(notice: FamilyNotice, request: &AdmissionRequest) -> Self {
        let mut details = BTreeMap::new();
        details.insert("applicant".to_string(), request.intake.applicant_name.clone());
        match notice {
            FamilyNotice::InterviewProposal => {
                details.insert("round".to_string(), request.proposal_round.to_string());
                let slots = request
                    .proposed_slots
                    .iter()
                    .map(|slot| slot.date.format("%Y-%m-%d").to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                details.insert("slots".to_string(), slots);
                if let Some(deadline) = request.response_deadline {
                    details.insert(
                        "respond_by".to_string(),
                        deadline.format("%Y-%m-%d").to_string(),
                    );
                }
                if !request.required_documents.is_empty() {
                    details.insert(
                        "required_documents".to_string(),
                        request.required_documents.join(", "),
                    );
                }
            }
            FamilyNotice::EarlyRejection | FamilyNotice::Rejected => {
                if let Some(reason) = &request.rejection_reason {
                    details.insert("reason".to_string(), reason.clone());
                }
            }
            FamilyNotice::Accepted => {
                if let Some(message) = &request.decision_message {
                    details.insert("message".to_string(), message.clone());
                }
            }
        }

        Self {
            template: notice.template().to_string(),
            request_id: request.id.clone(),
            recipient: request.intake.family_contact.clone(),
            details,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Creates the durable student and section records for an accepted request.
pub trait EnrollmentExecutor: Send + Sync {
    fn enroll(
        &self,
        request_id: &AdmissionRequestId,
        period_id: &PeriodId,
        section_id: Option<&str>,
    ) -> Result<EnrollmentRecord, EnrollmentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    #[error("period {0} does not exist")]
    UnknownPeriod(PeriodId),
    #[error("enrollment backend unavailable: {0}")]
    Unavailable(String),
}

/// Read model recomputed from a snapshot on every fetch.
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionStatusView {
    pub request_id: AdmissionRequestId,
    pub state: AdmissionState,
    pub status: &'static str,
    pub proposal_round: u32,
    pub timeline: [TimelineEntry; 5],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<ConfirmationSource>,
    pub available_actions: Vec<ActionKind>,
    pub enrollable: bool,
    pub already_enrolled: bool,
    pub enrollment_signals: Vec<EnrollmentSignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment: Option<EnrollmentRecord>,
}

impl AdmissionStatusView {
    pub fn from_request(request: &AdmissionRequest) -> Self {
        Self {
            request_id: request.id.clone(),
            state: request.state,
            status: request.state.label(),
            proposal_round: request.proposal_round,
            timeline: timeline::derive_timeline(request),
            confirmation: timeline::confirmation_source(request),
            available_actions: lifecycle::available_actions(request),
            enrollable: eligibility::is_enrollable(request),
            already_enrolled: eligibility::is_already_enrolled(request),
            enrollment_signals: eligibility::enrollment_signals(request),
            enrollment: request.enrollment.clone(),
        }
    }
}
