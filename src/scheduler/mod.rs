//! Adaptive backup scheduling.
//!
//! Turns risk scores into a single pending sync timer that is only
//! replaced when the derived timeout changes.

pub mod controller;

pub use controller::{
    DEFAULT_NEXT_BACKUP_FORMAT, ScheduleController, ScheduleSnapshot, TimerId, UpdateOutcome,
};
