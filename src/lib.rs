//! Backup pacer: risk-driven scheduling of backup synchronisation.
//!
//! Decides *when* the next backup sync should run from three signals: how
//! much of the file set changed since the last backup, how many recent
//! operations failed, and how stale the last backup is.
//!
//! # Architecture
//!
//! - **Risk model** ([`risk`]): pure scoring of the three signals into a
//!   risk in `3..=15` and a delay between 30 minutes and 6 hours
//! - **Schedule controller** ([`scheduler`]): owns at most one pending sync
//!   timer and rearms it only when the delay changes
//! - **Daemon** ([`daemon`]): the periodic poll that feeds the controller
//! - **Status** ([`status`]): one-shot JSON report of risk and schedule
//! - **Collaborators**: file inventories ([`inventory`]), sync invocation
//!   ([`sync`]) and fault counting ([`faults`])

pub mod config;
pub mod daemon;
pub mod error;
pub mod faults;
pub mod inventory;
pub mod risk;
pub mod scheduler;
pub mod status;
pub mod sync;

pub use config::PacerConfig;
pub use error::{PacerError, Result};
pub use faults::{FaultCounter, FaultLedger};
pub use inventory::{BackedUpFiles, DirectoryInventory, FileInventory, FileRecord};
pub use risk::{RiskInputs, calculate_risk, calculate_timeout};
pub use scheduler::{ScheduleController, ScheduleSnapshot, TimerId, UpdateOutcome};
pub use sync::{CommandSyncInvoker, SyncInvoker, SyncReport};
