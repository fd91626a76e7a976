//! Configuration types for the backup pacer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PacerConfig {
    /// Where the live and backed-up file sets live.
    pub inventory: InventoryConfig,
    /// External sync command.
    pub sync: SyncConfig,
    /// Polling and display settings.
    pub schedule: ScheduleConfig,
}

/// File inventory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Live source tree.
    pub source_dir: PathBuf,
    /// Backed-up mirror of the source tree.
    pub backup_dir: PathBuf,
    /// Descend into subdirectories.
    pub recursive: bool,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        Self {
            source_dir: home.join("Documents"),
            backup_dir: home.join("Backups").join("Documents"),
            recursive: true,
        }
    }
}

/// External sync command configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Program to run.
    pub program: String,
    /// Arguments passed to `program`.
    pub args: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            program: "bbackupctl".to_owned(),
            args: vec!["sync".to_owned()],
        }
    }
}

/// Polling and display configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds between daemon reconsiderations of the schedule.
    pub poll_interval_secs: u64,
    /// Hours over which failed syncs count towards the fault factor.
    pub fault_window_hours: u64,
    /// `chrono` format string for the next-backup display.
    pub next_backup_format: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            fault_window_hours: 24,
            next_backup_format: crate::scheduler::DEFAULT_NEXT_BACKUP_FORMAT.to_owned(),
        }
    }
}

impl ScheduleConfig {
    /// Poll interval as a duration (at least one second).
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Fault window as a duration.
    pub fn fault_window(&self) -> Duration {
        Duration::from_secs(self.fault_window_hours.saturating_mul(3600))
    }
}

impl PacerConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::PacerError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::PacerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default config file path: `backup-pacer/config.toml` under the platform
    /// config directory (`$XDG_CONFIG_HOME` or `~/.config` on Linux).
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("backup-pacer")
            .join("config.toml")
    }
}
