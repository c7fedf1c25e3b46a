use serde::Serialize;

use super::domain::{AdmissionRequest, AdmissionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineStep {
    Received,
    Proposal,
    Confirmation,
    Interview,
    Decision,
}

impl TimelineStep {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Received,
            Self::Proposal,
            Self::Confirmation,
            Self::Interview,
            Self::Decision,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Received => "Request received",
            Self::Proposal => "Interview proposal",
            Self::Confirmation => "Date confirmation",
            Self::Interview => "Interview",
            Self::Decision => "Decision",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Done,
    Current,
    Upcoming,
    /// Never reached before a terminal decision.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub step: TimelineStep,
    pub label: &'static str,
    pub status: StepStatus,
}

/// Who fixed the interview slot, if anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationSource {
    Staff,
    /// The family picked a slot; staff has not registered it yet.
    FamilyPending,
}

pub fn confirmation_source(request: &AdmissionRequest) -> Option<ConfirmationSource> {
    if request.confirmed_date.is_some() {
        Some(ConfirmationSource::Staff)
    } else if request.selected_slot().is_some() {
        Some(ConfirmationSource::FamilyPending)
    } else {
        None
    }
}

fn step_complete(request: &AdmissionRequest, step: TimelineStep) -> bool {
    match step {
        TimelineStep::Received => true,
        TimelineStep::Proposal => {
            !request.proposed_slots.is_empty()
                || request.proposal_round > 0
                || matches!(
                    request.state,
                    AdmissionState::InterviewScheduled
                        | AdmissionState::InterviewDone
                        | AdmissionState::Accepted
                )
        }
        TimelineStep::Confirmation => {
            confirmation_source(request).is_some()
                || matches!(
                    request.state,
                    AdmissionState::InterviewScheduled | AdmissionState::InterviewDone
                )
        }
        TimelineStep::Interview => {
            request.interview_held() || request.state == AdmissionState::InterviewDone
        }
        TimelineStep::Decision => request.state.is_terminal(),
    }
}

/// Derives the five-step progress timeline from a snapshot.
///
/// Fields can lag behind one another, so a completed later step implies the earlier
/// ones while the request is open. After a terminal decision, anything left incomplete
/// is reported as skipped rather than upcoming.
pub fn derive_timeline(request: &AdmissionRequest) -> [TimelineEntry; 5] {
    let steps = TimelineStep::ordered();
    let complete = steps.map(|step| step_complete(request, step));
    let terminal = request.state.is_terminal();

    let last_complete = complete.iter().rposition(|done| *done).unwrap_or(0);
    let mut current_assigned = false;

    std::array::from_fn(|index| {
        let step = steps[index];
        let status = if terminal {
            if complete[index] {
                StepStatus::Done
            } else {
                StepStatus::Skipped
            }
        } else if complete[index] || index < last_complete {
            StepStatus::Done
        } else if !current_assigned {
            current_assigned = true;
            StepStatus::Current
        } else {
            StepStatus::Upcoming
        };

        TimelineEntry {
            step,
            label: step.label(),
            status,
        }
    })
}

/// The step currently awaiting action, if the request is still open.
pub fn current_step(request: &AdmissionRequest) -> Option<TimelineStep> {
    derive_timeline(request)
        .into_iter()
        .find(|entry| entry.status == StepStatus::Current)
        .map(|entry| entry.step)
}
