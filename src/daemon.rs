//! Polling loop that keeps the backup schedule current.
//!
//! [`PacerDaemon`] owns the periodic poll the scheduler itself never runs:
//! every tick it reads both inventories, counts recent faults and asks the
//! [`ScheduleController`] to reconsider. It runs until its cancellation token
//! is cancelled.
//!
//! # Usage
//!
//! ```rust,ignore
//! let daemon = PacerDaemon::new(controller, inventory, faults, invoker, cancel.child_token());
//! tokio::spawn(daemon.run());
//! ```

use crate::error::{PacerError, Result};
use crate::faults::FaultCounter;
use crate::inventory::FileInventory;
use crate::scheduler::{ScheduleController, UpdateOutcome};
use crate::sync::SyncInvoker;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default poll interval in seconds.
const POLL_INTERVAL_SECS: u64 = 60;

/// Default wait before retrying a bootstrap sync that left no backup behind.
const BOOTSTRAP_RETRY_SECS: u64 = 24 * 3600;

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The schedule was reconsidered.
    Scheduled(UpdateOutcome),
    /// No backup existed yet, so an initial sync was started.
    Bootstrapped,
    /// Still no backup; the last bootstrap sync is too recent to retry.
    AwaitingBaseline,
}

/// Periodically reconsiders the backup schedule.
pub struct PacerDaemon {
    controller: ScheduleController,
    inventory: Arc<dyn FileInventory>,
    faults: Arc<dyn FaultCounter>,
    invoker: Arc<dyn SyncInvoker>,
    cancel: CancellationToken,
    poll_interval: Duration,
    bootstrap_retry: Duration,
    last_bootstrap: Option<Instant>,
}

impl PacerDaemon {
    pub fn new(
        controller: ScheduleController,
        inventory: Arc<dyn FileInventory>,
        faults: Arc<dyn FaultCounter>,
        invoker: Arc<dyn SyncInvoker>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            controller,
            inventory,
            faults,
            invoker,
            cancel,
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            bootstrap_retry: Duration::from_secs(BOOTSTRAP_RETRY_SECS),
            last_bootstrap: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// How long to wait before another bootstrap sync while no backup exists.
    pub fn with_bootstrap_retry(mut self, retry: Duration) -> Self {
        self.bootstrap_retry = retry;
        self
    }

    pub fn controller(&self) -> &ScheduleController {
        &self.controller
    }

    /// Read inventories and reconsider the schedule once.
    ///
    /// An empty backup triggers a bootstrap sync. Until the backup shows up,
    /// later polls report [`PollOutcome::AwaitingBaseline`] and another
    /// bootstrap is started once the retry interval has passed.
    ///
    /// # Errors
    ///
    /// Inventory failures and scheduling errors.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let inventory = Arc::clone(&self.inventory);
        let (source_files, backed_up) = tokio::task::spawn_blocking(move || {
            Ok::<_, PacerError>((inventory.source_files()?, inventory.backed_up_files()?))
        })
        .await
        .map_err(|e| PacerError::Inventory(format!("inventory task failed: {e}")))??;

        let fault_count = self.faults.fault_count();
        let hours = self.controller.hours_since_last_backup();

        match self
            .controller
            .reconsider(&source_files, &backed_up, fault_count, hours)
        {
            Ok(outcome) => {
                self.last_bootstrap = None;
                debug!(
                    sources = source_files.len(),
                    backed_up = backed_up.len(),
                    fault_count,
                    hours,
                    risk = outcome.risk(),
                    "schedule reconsidered"
                );
                Ok(PollOutcome::Scheduled(outcome))
            }
            Err(PacerError::EmptyBaseline) => {
                let now = Instant::now();
                if self
                    .last_bootstrap
                    .is_some_and(|last| now.duration_since(last) < self.bootstrap_retry)
                {
                    debug!(
                        sources = source_files.len(),
                        "still no backed-up files, waiting before another initial sync"
                    );
                    return Ok(PollOutcome::AwaitingBaseline);
                }
                self.last_bootstrap = Some(now);
                warn!("no backed-up files yet, starting initial sync");
                self.controller.mark_backed_up();
                let invoker = Arc::clone(&self.invoker);
                tokio::spawn(async move {
                    if let Err(e) = invoker.sync().await {
                        warn!("initial sync failed: {e}");
                    }
                });
                Ok(PollOutcome::Bootstrapped)
            }
            Err(e) => Err(e),
        }
    }

    /// Poll until cancelled, then cancel the pending timer.
    pub async fn run(mut self) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "backup pacer started"
        );
        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.controller.shutdown();
                    info!("backup pacer stopped");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!("schedule poll failed: {e}");
                    }
                }
            }
        }
    }
}
