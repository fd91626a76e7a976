//! One-shot status report for the `status` command.
//!
//! The report previews the schedule a freshly started daemon would arm: it
//! reads both inventories, scores them, lets the controller reconsider and
//! captures [`ScheduleController::snapshot`] next to the risk breakdown.

use crate::error::{PacerError, Result};
use crate::inventory::{FileInventory, modified_fraction};
use crate::risk::{self, RiskInputs};
use crate::scheduler::{ScheduleController, ScheduleSnapshot};
use serde::Serialize;

/// How each signal contributed to the risk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskBreakdown {
    pub modified_fraction: f64,
    pub fault_count: u32,
    pub hours_since_last_backup: f64,
    pub modifications_factor: u32,
    pub fault_factor: u32,
    pub last_backup_time_factor: u32,
    pub risk: u32,
    pub timeout_ms: u64,
}

impl RiskBreakdown {
    fn new(inputs: &RiskInputs) -> Self {
        Self {
            modified_fraction: inputs.modified_fraction,
            fault_count: inputs.fault_count,
            hours_since_last_backup: inputs.hours_since_last_backup,
            modifications_factor: risk::modifications_factor(inputs.modified_fraction),
            fault_factor: risk::fault_factor(inputs.fault_count),
            last_backup_time_factor: risk::last_backup_time_factor(
                inputs.hours_since_last_backup,
            ),
            risk: inputs.risk(),
            timeout_ms: u64::try_from(inputs.timeout().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// JSON document printed by `status`, tagged by `state`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StatusReport {
    /// Inventories were scored and the schedule reconsidered.
    Scheduled {
        source_files: usize,
        backed_up_files: usize,
        breakdown: RiskBreakdown,
        schedule: ScheduleSnapshot,
    },
    /// The backup holds no files yet, so no risk can be computed.
    NoBaseline {
        source_files: usize,
        schedule: ScheduleSnapshot,
    },
}

/// Build a [`StatusReport`] and leave the previewed timer armed on `controller`.
///
/// Hours since the last backup come from the controller. Callers that only
/// want the report should call [`ScheduleController::shutdown`] afterwards.
///
/// # Errors
///
/// Inventory failures and scheduling errors. A missing baseline is reported
/// as [`StatusReport::NoBaseline`], not as an error.
pub fn status_report(
    controller: &ScheduleController,
    inventory: &dyn FileInventory,
    fault_count: u32,
) -> Result<StatusReport> {
    let source = inventory.source_files()?;
    let backed_up = inventory.backed_up_files()?;
    let hours = controller.hours_since_last_backup();

    let fraction = match modified_fraction(&source, &backed_up) {
        Ok(fraction) => fraction,
        Err(PacerError::EmptyBaseline) => {
            return Ok(StatusReport::NoBaseline {
                source_files: source.len(),
                schedule: controller.snapshot(),
            });
        }
        Err(e) => return Err(e),
    };
    let inputs = RiskInputs::new(fraction, fault_count, hours)?;
    controller.reconsider(&source, &backed_up, fault_count, hours)?;

    Ok(StatusReport::Scheduled {
        source_files: source.len(),
        backed_up_files: backed_up.len(),
        breakdown: RiskBreakdown::new(&inputs),
        schedule: controller.snapshot(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::inventory::{BackedUpFiles, FileRecord, index_by_title};
    use crate::sync::{SyncInvoker, SyncReport};
    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone, Utc};
    use std::sync::Arc;
    use std::time::Duration;

    struct NoopInvoker;

    #[async_trait]
    impl SyncInvoker for NoopInvoker {
        async fn sync(&self) -> Result<SyncReport> {
            Ok(SyncReport {
                elapsed: Duration::ZERO,
                detail: String::new(),
            })
        }
    }

    struct StaticInventory {
        source: Vec<FileRecord>,
        backed_up: BackedUpFiles,
    }

    impl FileInventory for StaticInventory {
        fn source_files(&self) -> Result<Vec<FileRecord>> {
            Ok(self.source.clone())
        }

        fn backed_up_files(&self) -> Result<BackedUpFiles> {
            Ok(self.backed_up.clone())
        }
    }

    fn record(title: &str, secs: i64) -> FileRecord {
        FileRecord::new(title, Utc.timestamp_opt(secs, 0).single().expect("timestamp"))
    }

    #[tokio::test(start_paused = true)]
    async fn report_carries_breakdown_and_snapshot() {
        let controller = ScheduleController::new(Arc::new(NoopInvoker))
            .with_last_backup_at(Utc::now() - TimeDelta::try_hours(7).expect("delta"));
        let inventory = StaticInventory {
            source: vec![record("a", 100), record("b", 200), record("c", 300)],
            backed_up: index_by_title([record("a", 100), record("b", 100)]),
        };

        let report = status_report(&controller, &inventory, 6).expect("report");
        let StatusReport::Scheduled {
            source_files,
            backed_up_files,
            breakdown,
            schedule,
        } = report
        else {
            panic!("expected a scheduled report, got {report:?}");
        };

        assert_eq!(source_files, 3);
        assert_eq!(backed_up_files, 2);
        assert_eq!(breakdown.modified_fraction, 1.0);
        assert_eq!(breakdown.fault_count, 6);
        assert!(breakdown.hours_since_last_backup >= 7.0);
        assert_eq!(breakdown.risk, 15);
        assert_eq!(breakdown.timeout_ms, 1_800_000);
        assert!(schedule.has_timer_set);
        assert_eq!(schedule.cached_risk, Some(15));
        assert_eq!(schedule.time_left_ms, 1_800_000);

        let json = serde_json::to_value(
            status_report(&controller, &inventory, 6).expect("second report"),
        )
        .expect("serialize");
        assert_eq!(json["state"], "scheduled");
        assert_eq!(json["breakdown"]["fault_factor"], 5);
        controller.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn missing_baseline_is_reported_as_state() {
        let controller = ScheduleController::new(Arc::new(NoopInvoker));
        let inventory = StaticInventory {
            source: vec![record("a", 100)],
            backed_up: BackedUpFiles::new(),
        };

        let report = status_report(&controller, &inventory, 0).expect("report");
        assert!(matches!(
            report,
            StatusReport::NoBaseline { source_files: 1, .. }
        ));
        assert!(!controller.has_timer_set());

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["state"], "no_baseline");
        assert_eq!(json["schedule"]["has_timer_set"], false);
    }
}
