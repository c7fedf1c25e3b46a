//! Deferred enrollment: wait for a school period that does not exist yet.
//!
//! Period creation has no event stream, so every refresh of the period catalog is
//! diffed against the highest ordering value seen when the deferral began. The
//! baseline is captured up front so a period created before the first refresh still
//! counts as new.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info};

use super::domain::{AdmissionRequestId, PeriodId, SchoolPeriod};

/// Ephemeral state of one "accept and enroll later" workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingDeferral {
    pub active: bool,
    pub baseline_max_order: i64,
}

/// Emitted at most once per deferral, when a newer period shows up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResumeEnrollment {
    pub request_id: AdmissionRequestId,
    pub period_id: PeriodId,
    pub order_value: i64,
}

/// Acknowledgement returned when a deferral starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeferralTicket {
    pub request_id: AdmissionRequestId,
    pub baseline_max_order: i64,
    /// An earlier deferral for the same workflow was still waiting and has been replaced.
    pub superseded: bool,
}

pub(crate) fn max_order(periods: &[SchoolPeriod]) -> i64 {
    periods
        .iter()
        .map(|period| period.order_value)
        .max()
        .unwrap_or(0)
}

/// Holds a single `PendingDeferral` behind one lock.
#[derive(Debug)]
pub struct DeferredEnrollmentCoordinator {
    request_id: AdmissionRequestId,
    state: Mutex<PendingDeferral>,
}

impl DeferredEnrollmentCoordinator {
    pub fn new(request_id: AdmissionRequestId) -> Self {
        Self {
            request_id,
            state: Mutex::new(PendingDeferral::default()),
        }
    }

    pub fn request_id(&self) -> &AdmissionRequestId {
        &self.request_id
    }

    fn lock(&self) -> MutexGuard<'_, PendingDeferral> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> PendingDeferral {
        *self.lock()
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn request_deferral(&self, current_periods: &[SchoolPeriod]) -> DeferralTicket {
        let baseline = max_order(current_periods);
        let mut state = self.lock();
        let superseded = state.active;
        *state = PendingDeferral {
            active: true,
            baseline_max_order: baseline,
        };

        info!(
            request_id = %self.request_id,
            baseline_max_order = baseline,
            superseded,
            "enrollment deferred until a newer school period exists"
        );

        DeferralTicket {
            request_id: self.request_id.clone(),
            baseline_max_order: baseline,
            superseded,
        }
    }

    pub fn on_period_catalog_refresh(
        &self,
        current_periods: &[SchoolPeriod],
    ) -> Option<ResumeEnrollment> {
        let mut state = self.lock();
        if !state.active {
            return None;
        }

        let newest = current_periods
            .iter()
            .max_by_key(|period| period.order_value)?;
        if newest.order_value <= state.baseline_max_order {
            debug!(
                request_id = %self.request_id,
                baseline_max_order = state.baseline_max_order,
                "period refresh carried no new period"
            );
            return None;
        }

        state.active = false;
        info!(
            request_id = %self.request_id,
            period_id = %newest.id,
            order_value = newest.order_value,
            "new school period detected, resuming enrollment"
        );

        Some(ResumeEnrollment {
            request_id: self.request_id.clone(),
            period_id: newest.id.clone(),
            order_value: newest.order_value,
        })
    }

    /// Returns whether a deferral was actually waiting.
    pub fn cancel_deferral(&self) -> bool {
        let mut state = self.lock();
        let was_active = state.active;
        state.active = false;
        if was_active {
            info!(request_id = %self.request_id, "deferred enrollment cancelled");
        }
        was_active
    }
}

/// One coordinator per admission workflow, fanned out on each catalog refresh.
#[derive(Debug, Default)]
pub struct DeferralRegistry {
    sessions: Mutex<HashMap<AdmissionRequestId, Arc<DeferredEnrollmentCoordinator>>>,
}

impl DeferralRegistry {
    fn sessions(
        &self,
    ) -> MutexGuard<'_, HashMap<AdmissionRequestId, Arc<DeferredEnrollmentCoordinator>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn request(
        &self,
        request_id: &AdmissionRequestId,
        current_periods: &[SchoolPeriod],
    ) -> DeferralTicket {
        // Held across activation so a concurrent refresh cannot prune the entry in between.
        let mut sessions = self.sessions();
        let coordinator = sessions
            .entry(request_id.clone())
            .or_insert_with(|| Arc::new(DeferredEnrollmentCoordinator::new(request_id.clone())));
        coordinator.request_deferral(current_periods)
    }

    pub fn cancel(&self, request_id: &AdmissionRequestId) -> bool {
        match self.sessions().remove(request_id) {
            Some(coordinator) => coordinator.cancel_deferral(),
            None => false,
        }
    }

    pub fn get(&self, request_id: &AdmissionRequestId) -> Option<Arc<DeferredEnrollmentCoordinator>> {
        self.sessions().get(request_id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.sessions()
            .values()
            .filter(|coordinator| coordinator.is_active())
            .count()
    }

    /// Feeds one catalog snapshot to every waiting workflow. Fired coordinators are dropped.
    pub fn refresh_all(&self, current_periods: &[SchoolPeriod]) -> Vec<ResumeEnrollment> {
        let mut sessions = self.sessions();
        let mut resumed = Vec::new();

        sessions.retain(|_, coordinator| {
            match coordinator.on_period_catalog_refresh(current_periods) {
                Some(event) => {
                    resumed.push(event);
                    false
                }
                None => coordinator.is_active(),
            }
        });

        resumed
    }
}
