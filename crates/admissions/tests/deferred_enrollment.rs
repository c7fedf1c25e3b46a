//! Deferred enrollment against a period catalog that only learns about new school years
//! when it is refreshed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use admissions::workflows::admissions::{
    AdmissionRequestId, CatalogError, DeferralRegistry, DeferredEnrollmentCoordinator,
    PeriodCatalog, PeriodId, PeriodWatcher, ResumeEnrollment, SchoolPeriod,
};
use tokio::sync::mpsc;

#[derive(Default)]
struct SharedCatalog {
    periods: Mutex<Vec<SchoolPeriod>>,
}

impl SharedCatalog {
    fn create(&self, id: &str, order_value: i64) {
        self.periods
            .lock()
            .expect("lock")
            .push(SchoolPeriod::new(id, order_value));
    }
}

impl PeriodCatalog for SharedCatalog {
    fn list(&self) -> Result<Vec<SchoolPeriod>, CatalogError> {
        Ok(self.periods.lock().expect("lock").clone())
    }
}

#[test]
fn resumes_once_when_next_school_year_appears() {
    let coordinator = DeferredEnrollmentCoordinator::new(AdmissionRequestId("adm-7".to_string()));
    let current = vec![SchoolPeriod::new("1", 2024)];

    let ticket = coordinator.request_deferral(&current);
    assert_eq!(ticket.baseline_max_order, 2024);
    assert!(!ticket.superseded);

    assert_eq!(coordinator.on_period_catalog_refresh(&current), None);

    let refreshed = vec![SchoolPeriod::new("1", 2024), SchoolPeriod::new("2", 2025)];
    let resumed = coordinator
        .on_period_catalog_refresh(&refreshed)
        .expect("new period triggers enrollment");
    assert_eq!(
        resumed,
        ResumeEnrollment {
            request_id: AdmissionRequestId("adm-7".to_string()),
            period_id: PeriodId("2".to_string()),
            order_value: 2025,
        }
    );
    assert!(!coordinator.is_active());
    assert_eq!(coordinator.on_period_catalog_refresh(&refreshed), None);
}

#[test]
fn cancelled_deferral_ignores_new_periods() {
    let coordinator = DeferredEnrollmentCoordinator::new(AdmissionRequestId("adm-8".to_string()));
    coordinator.request_deferral(&[SchoolPeriod::new("1", 2024)]);
    assert!(coordinator.cancel_deferral());

    let refreshed = vec![SchoolPeriod::new("1", 2024), SchoolPeriod::new("2", 2025)];
    assert_eq!(coordinator.on_period_catalog_refresh(&refreshed), None);
}

#[tokio::test]
async fn watcher_delivers_resume_events_for_waiting_requests() {
    let catalog = Arc::new(SharedCatalog::default());
    catalog.create("p-2024", 2024);

    let registry = Arc::new(DeferralRegistry::default());
    let waiting = AdmissionRequestId("adm-42".to_string());
    registry.request(&waiting, &catalog.list().expect("catalog lists"));

    let (sender, mut receiver) = mpsc::channel(8);
    let handle = PeriodWatcher::new(catalog.clone(), registry.clone(), Duration::from_millis(20))
        .spawn(sender);

    catalog.create("p-2025", 2025);

    let event = tokio::time::timeout(Duration::from_secs(2), receiver.recv())
        .await
        .expect("watcher fires before timeout")
        .expect("channel open");
    assert_eq!(event.request_id, waiting);
    assert_eq!(event.period_id, PeriodId("p-2025".to_string()));
    assert_eq!(registry.active_count(), 0);

    drop(receiver);
    handle.abort();
}
