use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::deferral::{DeferralRegistry, ResumeEnrollment};
use super::repository::{CatalogError, PeriodCatalog};

/// Polls the period catalog and feeds each snapshot to the deferral registry.
pub struct PeriodWatcher<C> {
    catalog: Arc<C>,
    registry: Arc<DeferralRegistry>,
    interval: Duration,
}

impl<C> PeriodWatcher<C>
where
    C: PeriodCatalog + 'static,
{
    pub fn new(catalog: Arc<C>, registry: Arc<DeferralRegistry>, interval: Duration) -> Self {
        Self {
            catalog,
            registry,
            interval,
        }
    }

    /// One catalog refresh. Useful for navigation-triggered refreshes and tests.
    pub fn poll_once(&self) -> Result<Vec<ResumeEnrollment>, CatalogError> {
        let periods = self.catalog.list()?;
        let resumed = self.registry.refresh_all(&periods);
        debug!(
            periods = periods.len(),
            resumed = resumed.len(),
            "period catalog refreshed"
        );
        Ok(resumed)
    }

    /// Poll on a fixed cadence until the receiving side of `events` is dropped.
    pub fn spawn(self, events: mpsc::Sender<ResumeEnrollment>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if events.is_closed() {
                    return;
                }
                if self.registry.active_count() == 0 {
                    continue;
                }

                match self.poll_once() {
                    Ok(resumed) => {
                        for event in resumed {
                            if events.send(event).await.is_err() {
                                debug!("resume channel closed; stopping period watcher");
                                return;
                            }
                        }
                    }
                    Err(error) => {
                        warn!(%error, "period catalog refresh failed");
                    }
                }
            }
        })
    }
}
