//! Recent-fault counting.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of the fault count fed into the risk model.
pub trait FaultCounter: Send + Sync {
    /// Number of recent failed or faulted operations.
    fn fault_count(&self) -> u32;
}

impl FaultCounter for u32 {
    fn fault_count(&self) -> u32 {
        *self
    }
}

/// Shared ledger of failures within a sliding window.
///
/// Clones share the same ledger.
#[derive(Debug, Clone)]
pub struct FaultLedger {
    window: Duration,
    faults: Arc<Mutex<VecDeque<Instant>>>,
}

impl FaultLedger {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            faults: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Window over which faults are counted.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a fault now.
    pub fn record_fault(&self) {
        self.record_fault_at(Instant::now());
    }

    /// Record a fault at the given instant.
    pub fn record_fault_at(&self, at: Instant) {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        faults.push_back(at);
    }

    /// Count faults recorded within the window ending at `now`, dropping older ones.
    pub fn fault_count_at(&self, now: Instant) -> u32 {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(oldest) = faults.front() {
            if now.saturating_duration_since(*oldest) > self.window {
                faults.pop_front();
            } else {
                break;
            }
        }
        u32::try_from(faults.len()).unwrap_or(u32::MAX)
    }

    /// Forget every recorded fault.
    pub fn clear(&self) {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl FaultCounter for FaultLedger {
    fn fault_count(&self) -> u32 {
        self.fault_count_at(Instant::now())
    }
}
