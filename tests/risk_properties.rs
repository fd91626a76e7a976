//! Property tests for the risk model.

use backup_pacer::risk::{
    MAX_RISK, MIN_RISK, RiskInputs, calculate_risk, calculate_timeout, timeout_for_risk,
};
use proptest::prelude::*;
use std::time::Duration;

// ── Monotonic in modified fraction ──────────────────────────────────────

proptest! {
    #[test]
    fn risk_non_decreasing_in_fraction(
        a in 0.0f64..=1.0,
        b in 0.0f64..=1.0,
        faults in 0u32..20,
        hours in 0.0f64..48.0,
    ) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            calculate_risk(low, faults, hours) <= calculate_risk(high, faults, hours),
            "risk decreased between fraction {} and {}", low, high
        );
    }
}

// ── Monotonic in staleness ──────────────────────────────────────────────

proptest! {
    #[test]
    fn risk_non_decreasing_in_hours(
        fraction in 0.0f64..=1.0,
        faults in 0u32..20,
        a in -1.0f64..48.0,
        b in -1.0f64..48.0,
    ) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            calculate_risk(fraction, faults, low) <= calculate_risk(fraction, faults, high),
            "risk decreased between {} and {} hours", low, high
        );
    }
}

// ── Fault factor saturates at five ──────────────────────────────────────

proptest! {
    #[test]
    fn faults_saturate(
        fraction in 0.0f64..=1.0,
        hours in 0.0f64..48.0,
        faults in 5u32..=u32::MAX,
    ) {
        prop_assert_eq!(
            calculate_risk(fraction, faults, hours),
            calculate_risk(fraction, 5, hours)
        );
    }
}

// ── Bounded risk ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn risk_is_bounded(
        fraction in -2.0f64..3.0,
        faults in any::<u32>(),
        hours in -10.0f64..100.0,
    ) {
        let risk = calculate_risk(fraction, faults, hours);
        prop_assert!((MIN_RISK..=MAX_RISK).contains(&risk), "risk {} out of bounds", risk);
    }
}

// ── Higher risk never waits longer ──────────────────────────────────────

proptest! {
    #[test]
    fn timeout_non_increasing_in_risk(a in 0u32..20, b in 0u32..20) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(timeout_for_risk(high) <= timeout_for_risk(low));
    }
}

proptest! {
    #[test]
    fn validated_inputs_match_free_functions(
        fraction in 0.0f64..=1.0,
        faults in 0u32..10,
        hours in 0.0f64..24.0,
    ) {
        let inputs = RiskInputs::new(fraction, faults, hours).unwrap();
        prop_assert_eq!(inputs.risk(), calculate_risk(fraction, faults, hours));
        prop_assert_eq!(inputs.timeout(), calculate_timeout(fraction, faults, hours));
    }
}

#[test]
fn few_changes_recent_backup_waits_six_hours() {
    assert_eq!(calculate_risk(0.1, 0, 0.2), 3);
    assert_eq!(calculate_timeout(0.1, 0, 0.2), Duration::from_millis(21_600_000));
}

#[test]
fn many_changes_many_faults_stale_backup_waits_half_an_hour() {
    assert_eq!(calculate_risk(0.9, 6, 7.0), 14);
    assert_eq!(calculate_timeout(0.9, 6, 7.0), Duration::from_millis(1_800_000));
}

#[test]
fn nothing_changed_just_backed_up_waits_six_hours() {
    assert_eq!(calculate_risk(0.0, 0, 0.0), 3);
    assert_eq!(calculate_timeout(0.0, 0, 0.0), Duration::from_secs(6 * 3600));
}

#[test]
fn every_file_changed_hits_top_modification_band() {
    assert_eq!(calculate_risk(1.0, 0, 0.0), 5 + 1 + 1);
    assert_eq!(calculate_timeout(1.0, 0, 0.0), Duration::from_secs(3 * 3600));
}
