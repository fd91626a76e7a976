//! Risk scoring for backup scheduling.
//!
//! The risk score sums three coarse factors, each in `1..=5`:
//!
//! | Factor | Source | Bands |
//! |--------|--------|-------|
//! | modifications | fraction of files changed since the last backup | quarter steps, `1.0` → 5 |
//! | faults | recent failed operations | `count + 1`, saturating at 5 |
//! | staleness | hours since the last backup | `<0.5`, `0.5`, `1`, `3`, `6` |
//!
//! so a risk always lies in [`MIN_RISK`]`..=`[`MAX_RISK`]. The risk then maps to
//! the delay before the next sync; a higher risk never waits longer.
//!
//! Everything here is pure arithmetic with no shared state.

use crate::error::{PacerError, Result};
use std::time::Duration;

/// Lowest possible risk score.
pub const MIN_RISK: u32 = 3;

/// Highest possible risk score.
pub const MAX_RISK: u32 = 15;

/// Width of one modification band.
const MODIFICATION_BAND_WIDTH: f64 = 0.25;

/// Upper bound for any single factor.
const FACTOR_CAP: u32 = 5;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Validated inputs to the risk model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskInputs {
    /// Ratio of changed-or-new files to backed-up files, in `[0, 1]`.
    pub modified_fraction: f64,
    /// Recent failed or faulted operations.
    pub fault_count: u32,
    /// Hours elapsed since the last backup.
    pub hours_since_last_backup: f64,
}

impl RiskInputs {
    /// Build risk inputs, rejecting a fraction outside `[0, 1]` and non-finite hours.
    ///
    /// # Errors
    ///
    /// Returns [`PacerError::InvalidInput`] when either value is out of range.
    pub fn new(
        modified_fraction: f64,
        fault_count: u32,
        hours_since_last_backup: f64,
    ) -> Result<Self> {
        if !modified_fraction.is_finite() || !(0.0..=1.0).contains(&modified_fraction) {
            return Err(PacerError::InvalidInput(format!(
                "modified fraction must be within [0, 1], got {modified_fraction}"
            )));
        }
        if !hours_since_last_backup.is_finite() {
            return Err(PacerError::InvalidInput(format!(
                "hours since last backup must be finite, got {hours_since_last_backup}"
            )));
        }
        Ok(Self {
            modified_fraction,
            fault_count,
            hours_since_last_backup,
        })
    }

    /// Risk score for these inputs.
    pub fn risk(&self) -> u32 {
        calculate_risk(
            self.modified_fraction,
            self.fault_count,
            self.hours_since_last_backup,
        )
    }

    /// Delay before the next sync for these inputs.
    pub fn timeout(&self) -> Duration {
        timeout_for_risk(self.risk())
    }
}

/// Band for the fraction of modified files.
///
/// Negative or NaN fractions fall to the lowest band; anything at or above
/// `1.0` lands in the top band.
pub fn modifications_factor(modified_fraction: f64) -> u32 {
    if modified_fraction.is_nan() || modified_fraction < 0.0 {
        return 1;
    }
    let fraction = modified_fraction.min(1.0);
    (fraction / MODIFICATION_BAND_WIDTH).floor() as u32 + 1
}

/// Band for the recent fault count.
pub fn fault_factor(fault_count: u32) -> u32 {
    fault_count.saturating_add(1).min(FACTOR_CAP)
}

/// Band for the staleness of the last backup.
pub fn last_backup_time_factor(hours_since_last_backup: f64) -> u32 {
    let hours = hours_since_last_backup;
    if hours >= 6.0 {
        5
    } else if hours >= 3.0 {
        4
    } else if hours >= 1.0 {
        3
    } else if hours >= 0.5 {
        2
    } else {
        1
    }
}

/// Compute the integer risk score (always within `3..=15`).
pub fn calculate_risk(
    modified_fraction: f64,
    fault_count: u32,
    hours_since_last_backup: f64,
) -> u32 {
    modifications_factor(modified_fraction)
        + fault_factor(fault_count)
        + last_backup_time_factor(hours_since_last_backup)
}

/// Hours to wait before the next sync at the given risk.
pub fn timeout_hours_for_risk(risk: u32) -> f64 {
    if risk >= 10 {
        0.5
    } else if risk >= 6 {
        3.0
    } else if risk >= 3 {
        6.0
    } else {
        24.0
    }
}

/// Delay before the next sync at the given risk.
pub fn timeout_for_risk(risk: u32) -> Duration {
    Duration::from_millis((timeout_hours_for_risk(risk) * MS_PER_HOUR) as u64)
}

/// Compute the delay before the next sync from the raw inputs.
pub fn calculate_timeout(
    modified_fraction: f64,
    fault_count: u32,
    hours_since_last_backup: f64,
) -> Duration {
    timeout_for_risk(calculate_risk(
        modified_fraction,
        fault_count,
        hours_since_last_backup,
    ))
}
