//! Integration tests for the single-timer schedule.
//!
//! All timer tests run on a paused Tokio clock, so hours of scheduling
//! elapse instantly and deterministically.

use async_trait::async_trait;
use backup_pacer::inventory::index_by_title;
use backup_pacer::{
    BackedUpFiles, FileRecord, PacerError, ScheduleController, SyncInvoker, SyncReport,
    UpdateOutcome,
};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const HALF_HOUR: Duration = Duration::from_secs(1800);
const THREE_HOURS: Duration = Duration::from_secs(3 * 3600);
const SIX_HOURS: Duration = Duration::from_secs(6 * 3600);

/// Records each sync in a shared event log and signals the test.
struct RecordingInvoker {
    events: Arc<Mutex<Vec<&'static str>>>,
    done_tx: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl SyncInvoker for RecordingInvoker {
    async fn sync(&self) -> backup_pacer::Result<SyncReport> {
        self.events.lock().unwrap().push("sync");
        let _ = self.done_tx.send(());
        Ok(SyncReport {
            elapsed: Duration::ZERO,
            detail: "ok".to_owned(),
        })
    }
}

struct Harness {
    controller: ScheduleController,
    events: Arc<Mutex<Vec<&'static str>>>,
    done_rx: mpsc::UnboundedReceiver<()>,
}

fn harness() -> Harness {
    let events = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    let invoker = Arc::new(RecordingInvoker {
        events: Arc::clone(&events),
        done_tx,
    });
    Harness {
        controller: ScheduleController::new(invoker),
        events,
        done_rx,
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

/// Four backed-up files, all unchanged at t=100.
fn baseline() -> BackedUpFiles {
    index_by_title((0..4).map(|i| FileRecord::new(format!("doc-{i}.txt"), at(100))))
}

fn unchanged_sources() -> Vec<FileRecord> {
    (0..4)
        .map(|i| FileRecord::new(format!("doc-{i}.txt"), at(100)))
        .collect()
}

/// Two of four files touched, one new file: fraction 0.75.
fn busy_sources() -> Vec<FileRecord> {
    vec![
        FileRecord::new("doc-0.txt", at(200)),
        FileRecord::new("doc-1.txt", at(200)),
        FileRecord::new("doc-2.txt", at(100)),
        FileRecord::new("doc-3.txt", at(100)),
        FileRecord::new("fresh.txt", at(300)),
    ]
}

#[tokio::test(start_paused = true)]
async fn repeated_identical_updates_arm_once() {
    let h = harness();
    let first = h
        .controller
        .update_timer(&unchanged_sources(), &baseline(), 0, 0.0, |_| {})
        .unwrap();
    let armed_id = h.controller.pending_timer_id().unwrap();

    for _ in 0..5 {
        let outcome = h
            .controller
            .update_timer(&unchanged_sources(), &baseline(), 0, 0.0, |_| {})
            .unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome::Unchanged {
                risk: 3,
                timeout: SIX_HOURS
            }
        );
    }

    assert!(first.is_rearmed());
    assert_eq!(h.controller.pending_timer_id(), Some(armed_id));
    assert_eq!(h.controller.cached_risk(), Some(3));
    assert_eq!(h.controller.cached_timeout(), Some(SIX_HOURS));
}

#[tokio::test(start_paused = true)]
async fn only_one_timer_is_pending_across_rearms() {
    let mut h = harness();
    let inputs: [(u32, f64); 3] = [(0, 0.0), (6, 7.0), (0, 0.0)];

    let mut last_id = None;
    for (faults, hours) in inputs {
        h.controller
            .update_timer(&busy_sources(), &baseline(), faults, hours, |_| {})
            .unwrap();
        let id = h.controller.pending_timer_id();
        assert!(id.is_some());
        assert_ne!(id, last_id);
        last_id = id;
    }

    // Only the final timer may fire: busy sources (band 4), no faults,
    // fresh backup gives risk 6 and a three hour wait.
    assert_eq!(h.controller.cached_timeout(), Some(THREE_HOURS));
    tokio::time::sleep(THREE_HOURS + Duration::from_secs(1)).await;
    h.done_rx.recv().await.unwrap();

    tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
    assert!(h.done_rx.try_recv().is_err());
    assert_eq!(h.events.lock().unwrap().as_slice(), ["sync"]);
}

#[tokio::test(start_paused = true)]
async fn fire_runs_on_fire_before_sync_and_records_backup_time() {
    let mut h = harness();
    let controller = h.controller.clone().with_last_backup_at(at(0));
    let events = Arc::clone(&h.events);
    let on_fire_controller = controller.clone();

    controller
        .update_timer(&busy_sources(), &baseline(), 6, 7.0, move |fired| {
            events.lock().unwrap().push("on_fire");
            on_fire_controller.remove_timer_if(fired);
        })
        .unwrap();
    assert_eq!(controller.time_left(), HALF_HOUR);

    h.done_rx.recv().await.unwrap();

    assert_eq!(h.events.lock().unwrap().as_slice(), ["on_fire", "sync"]);
    assert!(!controller.has_timer_set());
    assert_eq!(controller.time_left_ms(), 0);
    assert!(controller.last_backup_at() > at(0));
    assert_eq!(controller.cached_timeout(), Some(HALF_HOUR));
}

#[tokio::test(start_paused = true)]
async fn timer_without_cleanup_still_reports_set() {
    let mut h = harness();
    h.controller
        .update_timer(&busy_sources(), &baseline(), 6, 7.0, |_| {})
        .unwrap();

    h.done_rx.recv().await.unwrap();

    assert!(h.controller.has_timer_set());
    assert_eq!(h.controller.time_left_ms(), 0);
    h.controller.remove_timer();
    assert!(!h.controller.has_timer_set());
}

#[tokio::test(start_paused = true)]
async fn get_risk_leaves_schedule_untouched() {
    let h = harness();
    h.controller
        .update_timer(&unchanged_sources(), &baseline(), 0, 0.0, |_| {})
        .unwrap();
    let id = h.controller.pending_timer_id();

    let observed = h
        .controller
        .get_risk(&busy_sources(), &baseline(), 6, 7.0)
        .unwrap();

    assert_eq!(observed, 4 + 5 + 5);
    assert_eq!(h.controller.cached_risk(), Some(3));
    assert_eq!(h.controller.pending_timer_id(), id);
}

#[tokio::test(start_paused = true)]
async fn empty_baseline_fails_fast() {
    let h = harness();
    let update = h
        .controller
        .update_timer(&busy_sources(), &BackedUpFiles::new(), 0, 0.0, |_| {});
    let risk = h
        .controller
        .get_risk(&busy_sources(), &BackedUpFiles::new(), 0, 0.0);
    let reconsider = h
        .controller
        .reconsider(&busy_sources(), &BackedUpFiles::new(), 0, 0.0);

    assert!(matches!(update, Err(PacerError::EmptyBaseline)));
    assert!(matches!(risk, Err(PacerError::EmptyBaseline)));
    assert!(matches!(reconsider, Err(PacerError::EmptyBaseline)));
    assert!(!h.controller.has_timer_set());
    assert_eq!(h.controller.cached_risk(), None);
}

#[tokio::test(start_paused = true)]
async fn reconsider_follows_risk_changes() {
    let h = harness();

    let armed = h
        .controller
        .reconsider(&unchanged_sources(), &baseline(), 0, 0.0)
        .unwrap();
    assert!(armed.is_rearmed());
    let first_id = h.controller.pending_timer_id();

    let kept = h
        .controller
        .reconsider(&unchanged_sources(), &baseline(), 0, 0.2)
        .unwrap();
    assert!(!kept.is_rearmed());
    assert_eq!(h.controller.pending_timer_id(), first_id);

    let moved = h
        .controller
        .reconsider(&busy_sources(), &baseline(), 6, 7.0)
        .unwrap();
    assert!(moved.is_rearmed());
    assert_ne!(h.controller.pending_timer_id(), first_id);
    assert_eq!(h.controller.cached_risk(), Some(14));
    assert_eq!(h.controller.time_left(), HALF_HOUR);
}

#[tokio::test(start_paused = true)]
async fn reconsider_keeps_pacing_after_each_sync() {
    let mut h = harness();

    for _ in 0..3 {
        h.controller
            .reconsider(&unchanged_sources(), &baseline(), 0, 0.0)
            .unwrap();
        assert!(h.controller.has_timer_set());
        h.done_rx.recv().await.unwrap();
        tokio::task::yield_now().await;
        assert!(!h.controller.has_timer_set());
    }

    assert_eq!(h.events.lock().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn snapshot_reports_armed_schedule() {
    let h = harness();
    h.controller
        .update_timer(&busy_sources(), &baseline(), 6, 7.0, |_| {})
        .unwrap();

    let snapshot = h.controller.snapshot();
    assert!(snapshot.has_timer_set);
    assert_eq!(snapshot.timer_id, h.controller.pending_timer_id());
    assert_eq!(snapshot.time_left_ms, 1_800_000);
    assert_eq!(snapshot.cached_risk, Some(14));
    assert_eq!(snapshot.cached_timeout_ms, Some(1_800_000));
    assert!(!snapshot.next_backup_time.is_empty());
}
