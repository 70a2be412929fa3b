use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Extension of finished archives. Anything else in the directory, such as an
/// archive still being written, is not a backup.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Extension of archives still being written.
pub const PARTIAL_EXTENSION: &str = "partial";

/// File name pattern of a backup, in local time.
pub const NAME_FORMAT: &str = "%H-%M-%S (%m-%d-%Y)";

/// One archive in an instance's backup directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub name: String,
    pub path: PathBuf,
    pub created: DateTime<Local>,
    pub size: u64,
}

/// Backup directory of a single instance.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every finished archive, newest first.
    pub fn list(&self) -> Result<Vec<BackupRecord>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ARCHIVE_EXTENSION) {
                continue;
            }
            if !entry.file_type()?.is_file() {
                continue;
            }
            records.push(self.record(&path)?);
        }

        records.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| b.name.cmp(&a.name)));
        Ok(records)
    }

    /// Describes the archive at `path`.
    pub fn record(&self, path: &Path) -> Result<BackupRecord> {
        let metadata = std::fs::metadata(path)?;
        let created: SystemTime = metadata.created().or_else(|_| metadata.modified())?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(BackupRecord {
            name,
            path: path.to_path_buf(),
            created: DateTime::<Local>::from(created),
            size: metadata.len(),
        })
    }

    /// Deletes the oldest archives until one more fits under `cap`.
    ///
    /// Returns the records removed, oldest first.
    pub fn enforce_retention(&self, cap: usize) -> Result<Vec<BackupRecord>> {
        let mut records = self.list()?;
        let mut removed = Vec::new();
        while !records.is_empty() && records.len() + 1 > cap {
            if let Some(oldest) = records.pop() {
                std::fs::remove_file(&oldest.path)?;
                tracing::info!(backup = %oldest.name, "Removed backup over retention cap");
                removed.push(oldest);
            }
        }
        Ok(removed)
    }

    /// Path for a new archive taken at `at`, suffixed when the name is taken.
    pub fn next_path(&self, at: DateTime<Local>) -> PathBuf {
        let stem = at.format(NAME_FORMAT).to_string();
        let mut candidate = self.dir.join(format!("{}.{}", stem, ARCHIVE_EXTENSION));
        let mut n = 2;
        while candidate.exists() || partial_path(&candidate).exists() {
            candidate = self
                .dir
                .join(format!("{} {}.{}", stem, n, ARCHIVE_EXTENSION));
            n += 1;
        }
        candidate
    }

    /// Removes the `index`-th archive, counting from 1 with the newest first.
    pub fn remove_at(&self, index: usize) -> Result<BackupRecord> {
        let records = self.list()?;
        let record = index
            .checked_sub(1)
            .and_then(|i| records.get(i))
            .cloned()
            .ok_or_else(|| {
                Error::Backup(format!(
                    "No backup #{} ({} available)",
                    index,
                    records.len()
                ))
            })?;
        std::fs::remove_file(&record.path)?;
        Ok(record)
    }

    /// Removes every archive, returning how many were deleted.
    pub fn remove_all(&self) -> Result<usize> {
        let records = self.list()?;
        for record in &records {
            std::fs::remove_file(&record.path)?;
        }
        Ok(records.len())
    }
}

/// Temporary name an archive is written under before it is published.
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    PathBuf::from(name)
}
