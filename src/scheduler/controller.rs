//! Single-timer backup schedule.
//!
//! [`ScheduleController`] owns at most one pending sync timer together with
//! the risk and timeout that armed it. Callers ask it to reconsider the
//! schedule whenever they have fresh inventories (per request, per poll); it
//! only cancels and rearms when the computed timeout actually changes.
//!
//! ```text
//! Idle ──update_timer (new timeout)──▶ Armed ──fires──▶ on_fire, sync ──▶ Idle
//!                                        │
//!                                        └──update_timer (same timeout)──▶ Armed
//! ```
//!
//! All state sits behind one mutex. The lock is never held across an
//! `.await` or while running `on_fire`.

use crate::error::{PacerError, Result};
use crate::inventory::{BackedUpFiles, FileRecord, modified_fraction};
use crate::risk::{RiskInputs, timeout_for_risk};
use crate::sync::SyncInvoker;
use chrono::{DateTime, Local, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default `chrono` format for [`ScheduleController::next_backup_time`].
pub const DEFAULT_NEXT_BACKUP_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

/// Identity of one armed timer. Every arming gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerId(u64);

impl TimerId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// What an [`ScheduleController::update_timer`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A new timer was armed, replacing any pending one.
    Rearmed {
        id: TimerId,
        risk: u32,
        timeout: Duration,
    },
    /// The computed timeout matched the cached one; nothing was touched.
    Unchanged { risk: u32, timeout: Duration },
}

impl UpdateOutcome {
    /// Risk observed by the call.
    pub fn risk(&self) -> u32 {
        match self {
            Self::Rearmed { risk, .. } | Self::Unchanged { risk, .. } => *risk,
        }
    }

    pub fn is_rearmed(&self) -> bool {
        matches!(self, Self::Rearmed { .. })
    }
}

/// Serialisable view of the schedule for status displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub has_timer_set: bool,
    pub timer_id: Option<TimerId>,
    pub time_left_ms: u64,
    pub next_backup_time: String,
    pub cached_risk: Option<u32>,
    pub cached_timeout_ms: Option<u64>,
    pub last_backup_at: DateTime<Utc>,
}

type OnFire = Box<dyn FnOnce(TimerId) + Send + 'static>;

struct PendingTimer {
    id: TimerId,
    armed_at: Instant,
    duration: Duration,
    handle: JoinHandle<()>,
}

impl PendingTimer {
    fn time_left(&self, now: Instant) -> Duration {
        (self.armed_at + self.duration).saturating_duration_since(now)
    }
}

struct ScheduleState {
    pending: Option<PendingTimer>,
    cached_risk: Option<u32>,
    cached_timeout: Option<Duration>,
    last_backup_at: DateTime<Utc>,
}

/// Owns the single pending backup timer.
///
/// Cloning yields another handle to the same schedule. Arming a timer
/// requires a Tokio runtime.
#[derive(Clone)]
pub struct ScheduleController {
    state: Arc<Mutex<ScheduleState>>,
    invoker: Arc<dyn SyncInvoker>,
    next_id: Arc<AtomicU64>,
    next_backup_format: String,
}

impl ScheduleController {
    /// Create an idle schedule whose last backup is "now".
    pub fn new(invoker: Arc<dyn SyncInvoker>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScheduleState {
                pending: None,
                cached_risk: None,
                cached_timeout: None,
                last_backup_at: Utc::now(),
            })),
            invoker,
            next_id: Arc::new(AtomicU64::new(0)),
            next_backup_format: DEFAULT_NEXT_BACKUP_FORMAT.to_owned(),
        }
    }

    /// Override the `chrono` format used by [`Self::next_backup_time`].
    pub fn with_next_backup_format(mut self, format: impl Into<String>) -> Self {
        self.next_backup_format = format.into();
        self
    }

    /// Seed the last-backup time, e.g. from a previous run.
    pub fn with_last_backup_at(self, at: DateTime<Utc>) -> Self {
        self.lock_state().last_backup_at = at;
        self
    }

    /// Recompute risk and timeout; rearm only if the timeout changed.
    ///
    /// When the armed timer fires it runs `on_fire` with the fired timer's
    /// id, records the backup time and starts a sync. `on_fire` is expected
    /// to call [`Self::remove_timer_if`] with that id so that
    /// [`Self::has_timer_set`] stays accurate without clearing a timer armed
    /// concurrently in its place.
    ///
    /// # Errors
    ///
    /// [`PacerError::EmptyBaseline`] when `backed_up` is empty,
    /// [`PacerError::InvalidInput`] for non-finite hours, and
    /// [`PacerError::Scheduler`] outside a Tokio runtime.
    pub fn update_timer<F>(
        &self,
        source_files: &[FileRecord],
        backed_up: &BackedUpFiles,
        fault_count: u32,
        hours_since_last_backup: f64,
        on_fire: F,
    ) -> Result<UpdateOutcome>
    where
        F: FnOnce(TimerId) + Send + 'static,
    {
        let inputs = risk_inputs(source_files, backed_up, fault_count, hours_since_last_backup)?;
        let mut state = self.lock_state();
        self.update_locked(&mut state, &inputs, Box::new(on_fire))
    }

    /// Observe the risk without touching the timer or the cache.
    ///
    /// # Errors
    ///
    /// Same input errors as [`Self::update_timer`].
    pub fn get_risk(
        &self,
        source_files: &[FileRecord],
        backed_up: &BackedUpFiles,
        fault_count: u32,
        hours_since_last_backup: f64,
    ) -> Result<u32> {
        risk_inputs(source_files, backed_up, fault_count, hours_since_last_backup)
            .map(|inputs| inputs.risk())
    }

    /// Caller policy for periodic polling.
    ///
    /// With no timer pending a fresh timer is always armed, even when the
    /// timeout equals the stale cached one. With a timer pending the schedule
    /// is only updated when the observed risk differs from the cached risk.
    /// Timers armed here clear themselves when they fire.
    ///
    /// # Errors
    ///
    /// Same errors as [`Self::update_timer`].
    pub fn reconsider(
        &self,
        source_files: &[FileRecord],
        backed_up: &BackedUpFiles,
        fault_count: u32,
        hours_since_last_backup: f64,
    ) -> Result<UpdateOutcome> {
        let inputs = risk_inputs(source_files, backed_up, fault_count, hours_since_last_backup)?;
        let risk = inputs.risk();
        let on_fire = self.clear_on_fire();

        let mut state = self.lock_state();
        if state.pending.is_none() {
            let timeout = timeout_for_risk(risk);
            let id = self.arm_locked(&mut state, risk, timeout, on_fire)?;
            return Ok(UpdateOutcome::Rearmed { id, risk, timeout });
        }
        if state.cached_risk == Some(risk) {
            debug!(risk, "risk unchanged, keeping pending timer");
            return Ok(UpdateOutcome::Unchanged {
                risk,
                timeout: state.cached_timeout.unwrap_or_else(|| timeout_for_risk(risk)),
            });
        }
        self.update_locked(&mut state, &inputs, on_fire)
    }

    /// Forget the pending timer without cancelling it.
    pub fn remove_timer(&self) {
        self.lock_state().pending = None;
    }

    /// Forget the pending timer only if it is still `id`.
    ///
    /// Returns whether a handle was dropped.
    pub fn remove_timer_if(&self, id: TimerId) -> bool {
        remove_if_pending(&mut self.lock_state(), id)
    }

    /// Cancel the pending timer. A sync already started keeps running.
    pub fn shutdown(&self) {
        if let Some(pending) = self.lock_state().pending.take() {
            pending.handle.abort();
            info!(timer = %pending.id, "backup timer cancelled on shutdown");
        }
    }

    /// Record that a backup happened now (e.g. after a manual sync).
    pub fn mark_backed_up(&self) {
        self.lock_state().last_backup_at = Utc::now();
    }

    pub fn last_backup_at(&self) -> DateTime<Utc> {
        self.lock_state().last_backup_at
    }

    /// Hours elapsed since [`Self::last_backup_at`], never negative.
    pub fn hours_since_last_backup(&self) -> f64 {
        let elapsed = Utc::now() - self.last_backup_at();
        (elapsed.num_milliseconds() as f64 / 3_600_000.0).max(0.0)
    }

    pub fn has_timer_set(&self) -> bool {
        self.lock_state().pending.is_some()
    }

    /// Id of the pending timer, if any.
    pub fn pending_timer_id(&self) -> Option<TimerId> {
        self.lock_state().pending.as_ref().map(|pending| pending.id)
    }

    /// Time until the pending timer fires; zero when idle.
    pub fn time_left(&self) -> Duration {
        self.lock_state()
            .pending
            .as_ref()
            .map(|pending| pending.time_left(Instant::now()))
            .unwrap_or_default()
    }

    pub fn time_left_ms(&self) -> u64 {
        duration_ms(self.time_left())
    }

    /// Local wall-clock time of the next backup, formatted for display.
    pub fn next_backup_time(&self) -> String {
        self.format_next_backup(self.time_left())
    }

    fn format_next_backup(&self, left: Duration) -> String {
        let left = TimeDelta::from_std(left).unwrap_or_else(|_| TimeDelta::zero());
        let at = Local::now() + left;

        let mut out = String::new();
        if write!(out, "{}", at.format(&self.next_backup_format)).is_err() {
            warn!(
                format = %self.next_backup_format,
                "invalid next-backup format, using default"
            );
            out.clear();
            let _ = write!(out, "{}", at.format(DEFAULT_NEXT_BACKUP_FORMAT));
        }
        out
    }

    pub fn cached_risk(&self) -> Option<u32> {
        self.lock_state().cached_risk
    }

    pub fn cached_timeout(&self) -> Option<Duration> {
        self.lock_state().cached_timeout
    }

    pub fn cached_timeout_ms(&self) -> Option<u64> {
        self.cached_timeout().map(duration_ms)
    }

    /// Capture every observation accessor under one lock.
    pub fn snapshot(&self) -> ScheduleSnapshot {
        let (timer_id, time_left, cached_risk, cached_timeout, last_backup_at) = {
            let state = self.lock_state();
            let now = Instant::now();
            (
                state.pending.as_ref().map(|pending| pending.id),
                state
                    .pending
                    .as_ref()
                    .map(|pending| pending.time_left(now))
                    .unwrap_or_default(),
                state.cached_risk,
                state.cached_timeout,
                state.last_backup_at,
            )
        };
        ScheduleSnapshot {
            has_timer_set: timer_id.is_some(),
            timer_id,
            time_left_ms: duration_ms(time_left),
            next_backup_time: self.format_next_backup(time_left),
            cached_risk,
            cached_timeout_ms: cached_timeout.map(duration_ms),
            last_backup_at,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ScheduleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update_locked(
        &self,
        state: &mut ScheduleState,
        inputs: &RiskInputs,
        on_fire: OnFire,
    ) -> Result<UpdateOutcome> {
        let risk = inputs.risk();
        let timeout = inputs.timeout();

        if state.cached_timeout == Some(timeout) {
            debug!(
                risk,
                timeout_ms = duration_ms(timeout),
                "timeout unchanged, leaving schedule as is"
            );
            return Ok(UpdateOutcome::Unchanged { risk, timeout });
        }

        let id = self.arm_locked(state, risk, timeout, on_fire)?;
        Ok(UpdateOutcome::Rearmed { id, risk, timeout })
    }

    /// Replace the pending timer and commit the cached risk and timeout together.
    fn arm_locked(
        &self,
        state: &mut ScheduleState,
        risk: u32,
        timeout: Duration,
        on_fire: OnFire,
    ) -> Result<TimerId> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PacerError::Scheduler(format!("cannot arm backup timer: {e}")))?;

        if let Some(previous) = state.pending.take() {
            previous.handle.abort();
            debug!(timer = %previous.id, "cancelled previous backup timer");
        }

        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let armed_at = Instant::now();
        let weak_state = Arc::downgrade(&self.state);
        let invoker = Arc::clone(&self.invoker);

        let handle = runtime.spawn(async move {
            tokio::time::sleep_until(armed_at + timeout).await;
            fire(id, on_fire, weak_state, invoker);
        });

        state.pending = Some(PendingTimer {
            id,
            armed_at,
            duration: timeout,
            handle,
        });
        state.cached_risk = Some(risk);
        state.cached_timeout = Some(timeout);

        info!(
            timer = %id,
            risk,
            timeout_ms = duration_ms(timeout),
            "armed backup timer"
        );
        Ok(id)
    }

    /// `on_fire` that drops the pending handle if it still refers to the fired timer.
    fn clear_on_fire(&self) -> OnFire {
        let weak_state = Arc::downgrade(&self.state);
        Box::new(move |fired| {
            let Some(state) = weak_state.upgrade() else {
                return;
            };
            remove_if_pending(&mut state.lock().unwrap_or_else(|e| e.into_inner()), fired);
        })
    }
}

impl std::fmt::Debug for ScheduleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("ScheduleController")
            .field("pending", &state.pending.as_ref().map(|pending| pending.id))
            .field("cached_risk", &state.cached_risk)
            .field("cached_timeout", &state.cached_timeout)
            .field("last_backup_at", &state.last_backup_at)
            .finish()
    }
}

/// Timer body: `on_fire`, then the backup time, then a detached sync.
///
/// The sync runs in its own task so that cancelling or replacing this timer
/// never interrupts it.
fn fire(
    id: TimerId,
    on_fire: OnFire,
    state: Weak<Mutex<ScheduleState>>,
    invoker: Arc<dyn SyncInvoker>,
) {
    info!(timer = %id, "backup timer fired");
    on_fire(id);

    if let Some(state) = state.upgrade() {
        state.lock().unwrap_or_else(|e| e.into_inner()).last_backup_at = Utc::now();
    }

    tokio::spawn(async move {
        match invoker.sync().await {
            Ok(report) => info!(
                timer = %id,
                elapsed_ms = duration_ms(report.elapsed),
                "sync finished"
            ),
            Err(e) => warn!(timer = %id, "sync failed: {e}"),
        }
    });
}

fn remove_if_pending(state: &mut ScheduleState, id: TimerId) -> bool {
    if state.pending.as_ref().is_some_and(|pending| pending.id == id) {
        state.pending = None;
        true
    } else {
        false
    }
}

fn risk_inputs(
    source_files: &[FileRecord],
    backed_up: &BackedUpFiles,
    fault_count: u32,
    hours_since_last_backup: f64,
) -> Result<RiskInputs> {
    let fraction = modified_fraction(source_files, backed_up)?;
    RiskInputs::new(fraction, fault_count, hours_since_last_backup)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
