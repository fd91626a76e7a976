//! Error types for the backup pacer.

/// Top-level error type for risk scoring and backup scheduling.
#[derive(Debug, thiserror::Error)]
pub enum PacerError {
    /// The backed-up inventory is empty, so the modified fraction is undefined.
    #[error("no backed-up files to compare against; run an initial backup first")]
    EmptyBaseline,

    /// Risk inputs outside their documented ranges.
    #[error("invalid risk input: {0}")]
    InvalidInput(String),

    /// File inventory could not be read.
    #[error("inventory error: {0}")]
    Inventory(String),

    /// Sync invocation failed to start or exited unsuccessfully.
    #[error("sync error: {0}")]
    Sync(String),

    /// Timer could not be armed.
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PacerError>;
