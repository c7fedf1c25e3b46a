use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of interview slots offered to a family in one proposal round.
pub const MAX_PROPOSED_SLOTS: usize = 3;

/// Identifier wrapper for admission requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdmissionRequestId(pub String);

impl fmt::Display for AdmissionRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for school periods held by the external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeriodId(pub String);

impl fmt::Display for PeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of an admission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionState {
    Pending,
    ProposalSent,
    InterviewScheduled,
    InterviewDone,
    Accepted,
    Rejected,
}

impl AdmissionState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ProposalSent => "proposal_sent",
            Self::InterviewScheduled => "interview_scheduled",
            Self::InterviewDone => "interview_done",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }
}

/// Time window attached to an interview slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// A proposed (date, optional time range) pair offered for an interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewSlot {
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

impl InterviewSlot {
    pub fn on(date: NaiveDate) -> Self {
        Self {
            date,
            time_range: None,
        }
    }

    /// A slot without a time range matches any proposal on the same date.
    pub fn matches(&self, proposed: &InterviewSlot) -> bool {
        self.date == proposed.date
            && match self.time_range {
                Some(range) => proposed.time_range == Some(range),
                None => true,
            }
    }
}

/// Durable student/section records produced by a successful enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_assignment_id: Option<String>,
}

/// Enrollment evidence carried by older upstream payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyEnrollmentFlags {
    #[serde(default, alias = "studentCreated", skip_serializing_if = "Option::is_none")]
    pub student_created: Option<bool>,
    #[serde(default, alias = "isEnrolled", skip_serializing_if = "Option::is_none")]
    pub enrolled: Option<bool>,
}

/// Applicant-facing data captured when a request is first received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionIntake {
    pub applicant_name: String,
    pub family_contact: String,
    #[serde(default)]
    pub requested_grade: Option<String>,
}

/// Snapshot of the admission request entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionRequest {
    pub id: AdmissionRequestId,
    pub state: AdmissionState,
    pub intake: AdmissionIntake,
    #[serde(default)]
    pub proposed_slots: Vec<InterviewSlot>,
    #[serde(default)]
    pub proposal_round: u32,
    #[serde(default)]
    pub selected_slot_index: Option<usize>,
    #[serde(default)]
    pub confirmed_date: Option<NaiveDate>,
    #[serde(default)]
    pub confirmed_time: Option<TimeRange>,
    #[serde(default)]
    pub interview_performed: Option<bool>,
    #[serde(default)]
    pub interview_comments: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub decision_message: Option<String>,
    #[serde(default)]
    pub required_documents: Vec<String>,
    #[serde(default)]
    pub attachment_links: Vec<String>,
    #[serde(default)]
    pub response_deadline: Option<NaiveDate>,
    #[serde(default)]
    pub reschedule_requested: bool,
    #[serde(default)]
    pub enrollment: Option<EnrollmentRecord>,
    #[serde(default)]
    pub enrollment_generated: Option<bool>,
    #[serde(default)]
    pub legacy_flags: Option<LegacyEnrollmentFlags>,
}

impl AdmissionRequest {
    /// A freshly received request in `Pending`.
    pub fn pending(id: AdmissionRequestId, intake: AdmissionIntake) -> Self {
        Self {
            id,
            state: AdmissionState::Pending,
            intake,
            proposed_slots: Vec::new(),
            proposal_round: 0,
            selected_slot_index: None,
            confirmed_date: None,
            confirmed_time: None,
            interview_performed: None,
            interview_comments: None,
            rejection_reason: None,
            decision_message: None,
            required_documents: Vec::new(),
            attachment_links: Vec::new(),
            response_deadline: None,
            reschedule_requested: false,
            enrollment: None,
            enrollment_generated: None,
            legacy_flags: None,
        }
    }

    pub fn selected_slot(&self) -> Option<&InterviewSlot> {
        self.selected_slot_index
            .and_then(|index| self.proposed_slots.get(index))
    }

    pub fn interview_held(&self) -> bool {
        self.interview_performed == Some(true)
    }
}

/// Administrative academic term ordered by a comparable ranking value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolPeriod {
    pub id: PeriodId,
    pub order_value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SchoolPeriod {
    pub fn new(id: impl Into<String>, order_value: i64) -> Self {
        Self {
            id: PeriodId(id.into()),
            order_value,
            name: None,
        }
    }
}
