//! File inventories and the modified-fraction calculation.
//!
//! An inventory is a flat list of [`FileRecord`]s keyed by title. The live
//! source set is compared against the backed-up set to find how much of the
//! tree has changed since the last sync.

use crate::error::{PacerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One file in either the live source set or the backed-up set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Identifier used to match a source file against its backup.
    pub title: String,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(title: impl Into<String>, modified_at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            modified_at,
        }
    }

    /// Whether the title carries anything besides whitespace.
    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }
}

/// Backed-up files keyed by title.
pub type BackedUpFiles = HashMap<String, FileRecord>;

/// Index records by title. Later duplicates replace earlier ones.
pub fn index_by_title(records: impl IntoIterator<Item = FileRecord>) -> BackedUpFiles {
    records
        .into_iter()
        .map(|record| (record.title.clone(), record))
        .collect()
}

/// Count source files that are new or whose timestamp differs from the backup.
///
/// Records with an empty or whitespace-only title are never counted.
pub fn count_modified(source_files: &[FileRecord], backed_up: &BackedUpFiles) -> usize {
    source_files
        .iter()
        .filter(|file| file.has_title())
        .filter(|file| match backed_up.get(&file.title) {
            Some(backup) => backup.modified_at != file.modified_at,
            None => true,
        })
        .count()
}

/// Ratio of modified source files to backed-up files, clamped to `[0, 1]`.
///
/// # Errors
///
/// Returns [`PacerError::EmptyBaseline`] when `backed_up` is empty.
pub fn modified_fraction(source_files: &[FileRecord], backed_up: &BackedUpFiles) -> Result<f64> {
    if backed_up.is_empty() {
        return Err(PacerError::EmptyBaseline);
    }
    let modified = count_modified(source_files, backed_up);
    Ok((modified as f64 / backed_up.len() as f64).min(1.0))
}

/// Supplies the live and backed-up file sets.
pub trait FileInventory: Send + Sync {
    /// Current files in the source tree.
    fn source_files(&self) -> Result<Vec<FileRecord>>;

    /// Files already present in the backup, keyed by title.
    fn backed_up_files(&self) -> Result<BackedUpFiles>;
}

/// Inventory over two local directories: the live tree and its backed-up mirror.
///
/// Titles are paths relative to the inventory root with `/` separators, so
/// `a/notes.md` and `b/notes.md` stay distinct. Timestamps are filesystem
/// modification times.
#[derive(Debug, Clone)]
pub struct DirectoryInventory {
    source_dir: PathBuf,
    backup_dir: PathBuf,
    recursive: bool,
}

impl DirectoryInventory {
    pub fn new(source_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            backup_dir: backup_dir.into(),
            recursive: false,
        }
    }

    /// Descend into subdirectories when listing files.
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }
}

impl FileInventory for DirectoryInventory {
    fn source_files(&self) -> Result<Vec<FileRecord>> {
        list_directory(&self.source_dir, self.recursive)
    }

    fn backed_up_files(&self) -> Result<BackedUpFiles> {
        list_directory(&self.backup_dir, self.recursive).map(index_by_title)
    }
}

fn list_directory(root: &Path, recursive: bool) -> Result<Vec<FileRecord>> {
    let mut records = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current).map_err(|e| {
            PacerError::Inventory(format!("cannot list {}: {e}", current.display()))
        })?;

        for entry in entries {
            let entry = entry?;
            let metadata = entry.metadata()?;
            let path = entry.path();
            if metadata.is_dir() {
                if recursive {
                    pending.push(path);
                }
                continue;
            }
            let modified_at: DateTime<Utc> = metadata.modified()?.into();
            records.push(FileRecord::new(relative_title(root, &path)?, modified_at));
        }
    }

    debug!(dir = %root.display(), files = records.len(), "listed inventory");
    Ok(records)
}

/// `path` relative to `root`, joined with `/` on every platform.
fn relative_title(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        PacerError::Inventory(format!(
            "{} is outside {}",
            path.display(),
            root.display()
        ))
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
