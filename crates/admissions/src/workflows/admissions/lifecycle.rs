use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::domain::{
    AdmissionRequest, AdmissionRequestId, AdmissionState, EnrollmentRecord, InterviewSlot,
    MAX_PROPOSED_SLOTS,
};
use super::eligibility;

/// Staff (or family) intent applied to an admission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdmissionAction {
    Reject {
        reason: String,
    },
    Schedule {
        slots: Vec<InterviewSlot>,
        #[serde(default)]
        required_documents: Vec<String>,
        #[serde(default)]
        attachment_links: Vec<String>,
        #[serde(default)]
        response_deadline: Option<NaiveDate>,
    },
    ConfirmDate {
        slot: InterviewSlot,
        #[serde(default)]
        manual_override: bool,
    },
    RecordInterview {
        performed: bool,
        #[serde(default)]
        comments: Option<String>,
    },
    Decide {
        accept: bool,
        message: String,
    },
}

impl AdmissionAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Reject { .. } => ActionKind::Reject,
            Self::Schedule { .. } => ActionKind::Schedule,
            Self::ConfirmDate { .. } => ActionKind::ConfirmDate,
            Self::RecordInterview { .. } => ActionKind::RecordInterview,
            Self::Decide { .. } => ActionKind::Decide,
        }
    }
}

/// Discriminant of every operation that can mutate a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Reject,
    Schedule,
    ConfirmDate,
    RecordInterview,
    Decide,
    SelectSlot,
    Enroll,
}

impl ActionKind {
    pub const fn ordered() -> [Self; 7] {
        [
            Self::Schedule,
            Self::SelectSlot,
            Self::ConfirmDate,
            Self::RecordInterview,
            Self::Decide,
            Self::Reject,
            Self::Enroll,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Schedule => "schedule",
            Self::ConfirmDate => "confirm_date",
            Self::RecordInterview => "record_interview",
            Self::Decide => "decide",
            Self::SelectSlot => "select_slot",
            Self::Enroll => "enroll",
        }
    }

    /// Transition table lookup, independent of guards.
    pub const fn permitted_from(self, state: AdmissionState) -> bool {
        use AdmissionState::*;
        match self {
            Self::Reject => matches!(state, Pending | ProposalSent | InterviewScheduled),
            Self::Schedule => matches!(state, Pending | ProposalSent),
            Self::ConfirmDate | Self::SelectSlot => matches!(state, ProposalSent),
            Self::RecordInterview => matches!(state, InterviewScheduled),
            Self::Decide => matches!(state, InterviewDone),
            Self::Enroll => matches!(state, Accepted),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Actions currently offered for a request, in display order.
pub fn available_actions(request: &AdmissionRequest) -> Vec<ActionKind> {
    ActionKind::ordered()
        .into_iter()
        .filter(|kind| kind.permitted_from(request.state))
        .filter(|kind| match kind {
            ActionKind::Enroll => eligibility::is_enrollable(request),
            _ => true,
        })
        .collect()
}

/// Message the family should receive once a transition commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyNotice {
    InterviewProposal,
    EarlyRejection,
    Accepted,
    Rejected,
}

impl FamilyNotice {
    pub const fn template(self) -> &'static str {
        match self {
            Self::InterviewProposal => "admission_interview_proposal",
            Self::EarlyRejection => "admission_early_rejection",
            Self::Accepted => "admission_accepted",
            Self::Rejected => "admission_rejected",
        }
    }
}

/// Side effect the caller executes after persisting a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum LifecycleEffect {
    NotifyFamily { notice: FamilyNotice },
    RescheduleExpected,
}

/// Result of a legal transition. Nothing is committed until the caller saves `request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub request: AdmissionRequest,
    pub from: AdmissionState,
    pub to: AdmissionState,
    pub effects: Vec<LifecycleEffect>,
}

/// Preconditions rejected before any field is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardViolation {
    #[error("rejection reason must not be empty")]
    EmptyRejectionReason,
    #[error("at least one interview slot must be proposed")]
    EmptySlotList,
    #[error("at most {max} interview slots may be proposed (found {found})")]
    TooManySlots { max: usize, found: usize },
    #[error("slot on {date} was not proposed to the family")]
    SlotNotProposed { date: NaiveDate },
    #[error("slot index {index} is out of range for {len} proposed slots")]
    SlotIndexOutOfRange { index: usize, len: usize },
}

/// Errors raised by the lifecycle state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("action '{action}' is not permitted while the request is {}", .state.label())]
    InvalidTransition {
        state: AdmissionState,
        action: ActionKind,
    },
    #[error(transparent)]
    Guard(#[from] GuardViolation),
    #[error("admission request {0} is already enrolled")]
    AlreadyEnrolled(AdmissionRequestId),
    #[error("admission request {id} is not eligible for enrollment while {}", .state.label())]
    NotEnrollable {
        id: AdmissionRequestId,
        state: AdmissionState,
    },
}

/// Policy dials for the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    /// Lets staff confirm a date that was never offered to the family.
    pub allow_manual_override: bool,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            allow_manual_override: true,
        }
    }
}

/// Pure transition function over admission request snapshots.
#[derive(Debug, Clone, Default)]
pub struct AdmissionStateMachine {
    policy: LifecyclePolicy,
}

impl AdmissionStateMachine {
    pub fn new(policy: LifecyclePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> LifecyclePolicy {
        self.policy
    }

    pub fn apply(
        &self,
        request: &AdmissionRequest,
        action: AdmissionAction,
    ) -> Result<Transition, LifecycleError> {
        let from = request.state;
        ensure_permitted(request, action.kind())?;

        let mut next = request.clone();
        let mut effects = Vec::new();

        match action {
            AdmissionAction::Reject { reason } => {
                let reason = non_empty(reason).ok_or(GuardViolation::EmptyRejectionReason)?;
                next.rejection_reason = Some(reason);
                next.state = AdmissionState::Rejected;
                effects.push(LifecycleEffect::NotifyFamily {
                    notice: FamilyNotice::EarlyRejection,
                });
            }
            AdmissionAction::Schedule {
                slots,
                required_documents,
                attachment_links,
                response_deadline,
            } => {
                if slots.is_empty() {
                    return Err(GuardViolation::EmptySlotList.into());
                }
                if slots.len() > MAX_PROPOSED_SLOTS {
                    return Err(GuardViolation::TooManySlots {
                        max: MAX_PROPOSED_SLOTS,
                        found: slots.len(),
                    }
                    .into());
                }

                next.proposed_slots = slots;
                next.proposal_round += 1;
                next.selected_slot_index = None;
                next.confirmed_date = None;
                next.confirmed_time = None;
                next.interview_performed = None;
                next.reschedule_requested = false;
                next.required_documents = required_documents;
                next.attachment_links = attachment_links;
                next.response_deadline = response_deadline;
                next.state = AdmissionState::ProposalSent;
                effects.push(LifecycleEffect::NotifyFamily {
                    notice: FamilyNotice::InterviewProposal,
                });
            }
            AdmissionAction::ConfirmDate {
                slot,
                manual_override,
            } => {
                let proposed = request
                    .proposed_slots
                    .iter()
                    .find(|candidate| slot.matches(candidate));

                let confirmed = match proposed {
                    Some(candidate) => *candidate,
                    None if manual_override && self.policy.allow_manual_override => slot,
                    None => return Err(GuardViolation::SlotNotProposed { date: slot.date }.into()),
                };

                next.confirmed_date = Some(confirmed.date);
                next.confirmed_time = slot.time_range.or(confirmed.time_range);
                next.state = AdmissionState::InterviewScheduled;
            }
            AdmissionAction::RecordInterview {
                performed: true,
                comments,
            } => {
                next.interview_performed = Some(true);
                next.interview_comments = comments.and_then(non_empty);
                next.reschedule_requested = false;
                next.state = AdmissionState::InterviewDone;
            }
            AdmissionAction::RecordInterview {
                performed: false,
                comments,
            } => {
                next.interview_performed = Some(false);
                if let Some(comments) = comments.and_then(non_empty) {
                    next.interview_comments = Some(comments);
                }
                next.selected_slot_index = None;
                next.confirmed_date = None;
                next.confirmed_time = None;
                next.reschedule_requested = true;
                next.state = AdmissionState::ProposalSent;
                effects.push(LifecycleEffect::RescheduleExpected);
            }
            AdmissionAction::Decide {
                accept: true,
                message,
            } => {
                next.decision_message = non_empty(message);
                next.state = AdmissionState::Accepted;
                effects.push(LifecycleEffect::NotifyFamily {
                    notice: FamilyNotice::Accepted,
                });
            }
            AdmissionAction::Decide {
                accept: false,
                message,
            } => {
                next.rejection_reason = non_empty(message);
                next.state = AdmissionState::Rejected;
                effects.push(LifecycleEffect::NotifyFamily {
                    notice: FamilyNotice::Rejected,
                });
            }
        }

        Ok(Transition {
            to: next.state,
            request: next,
            from,
            effects,
        })
    }

    /// Records the family's preferred slot. The lifecycle state does not move.
    pub fn select_slot(
        &self,
        request: &AdmissionRequest,
        index: usize,
    ) -> Result<AdmissionRequest, LifecycleError> {
        ensure_permitted(request, ActionKind::SelectSlot)?;
        let len = request.proposed_slots.len();
        if index >= len {
            return Err(GuardViolation::SlotIndexOutOfRange { index, len }.into());
        }

        let mut next = request.clone();
        next.selected_slot_index = Some(index);
        Ok(next)
    }

    /// Stores the executor's enrollment records. Only legal once, from `Accepted`.
    pub fn record_enrollment(
        &self,
        request: &AdmissionRequest,
        record: EnrollmentRecord,
    ) -> Result<AdmissionRequest, LifecycleError> {
        if eligibility::is_already_enrolled(request) {
            return Err(LifecycleError::AlreadyEnrolled(request.id.clone()));
        }
        if request.state != AdmissionState::Accepted {
            return Err(LifecycleError::NotEnrollable {
                id: request.id.clone(),
                state: request.state,
            });
        }

        let mut next = request.clone();
        next.enrollment = Some(record);
        next.enrollment_generated = Some(true);
        Ok(next)
    }
}

fn ensure_permitted(request: &AdmissionRequest, action: ActionKind) -> Result<(), LifecycleError> {
    if action.permitted_from(request.state) {
        Ok(())
    } else {
        Err(LifecycleError::InvalidTransition {
            state: request.state,
            action,
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
