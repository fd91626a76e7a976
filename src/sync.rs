//! Sync invocation.
//!
//! A [`SyncInvoker`] starts the external synchronisation process. The
//! scheduler never depends on its outcome, but the returned future lets the
//! boundary log the result or count failures.

use crate::error::{PacerError, Result};
use crate::faults::FaultLedger;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Completed sync invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Wall time spent waiting for the sync to finish.
    pub elapsed: Duration,
    /// Free-form detail (command output, exit status).
    pub detail: String,
}

/// Starts a backup synchronisation.
#[async_trait]
pub trait SyncInvoker: Send + Sync {
    /// Run one sync to completion.
    async fn sync(&self) -> Result<SyncReport>;
}

/// Runs an external command, e.g. `bbackupctl sync`.
#[derive(Debug, Clone)]
pub struct CommandSyncInvoker {
    program: String,
    args: Vec<String>,
}

impl CommandSyncInvoker {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from the `[sync]` config section.
    pub fn from_config(config: &crate::config::SyncConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl SyncInvoker for CommandSyncInvoker {
    async fn sync(&self) -> Result<SyncReport> {
        let command_line = self.command_line();
        info!(command = %command_line, "starting sync");
        let started = Instant::now();

        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| PacerError::Sync(format!("cannot start `{command_line}`: {e}")))?;

        let elapsed = started.elapsed();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PacerError::Sync(format!(
                "`{command_line}` exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(SyncReport {
            elapsed,
            detail: stdout.trim().to_owned(),
        })
    }
}

/// Wraps an invoker and records every failed sync in a [`FaultLedger`].
pub struct FaultRecordingInvoker<I> {
    inner: I,
    ledger: FaultLedger,
}

impl<I: SyncInvoker> FaultRecordingInvoker<I> {
    pub fn new(inner: I, ledger: FaultLedger) -> Self {
        Self { inner, ledger }
    }
}

#[async_trait]
impl<I: SyncInvoker> SyncInvoker for FaultRecordingInvoker<I> {
    async fn sync(&self) -> Result<SyncReport> {
        let result = self.inner.sync().await;
        if let Err(e) = &result {
            warn!("sync failed, recording fault: {e}");
            self.ledger.record_fault();
        }
        result
    }
}
