use crate::backup::archive::{ArchiveScope, create_archive};
use crate::backup::store::{BackupRecord, BackupStore, partial_path};
use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::server::{LifecycleEventKind, LifecycleStatus};
use crate::settings::{DESCRIPTOR_FILE, PROPERTIES_FILE};
use crate::transport::StdioConsole;
use chrono::Local;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time;

/// Console commands used to quiesce the world while it is archived.
pub const SAVE_OFF_COMMAND: &str = "save-off";
pub const SAVE_ALL_COMMAND: &str = "save-all";
pub const SAVE_ON_COMMAND: &str = "save-on";

/// Writes a new archive into `store`, keeping at most `cap` archives.
///
/// The archive is written under a temporary name first. Only once it is
/// complete are the oldest archives pruned and the new one published, so a
/// failed attempt leaves the existing backups alone.
pub fn write_backup(
    store: &BackupStore,
    source: &std::path::Path,
    scope: &ArchiveScope,
    cap: usize,
) -> Result<BackupRecord> {
    std::fs::create_dir_all(store.dir())?;
    let path = store.next_path(Local::now());
    let partial = partial_path(&path);

    if let Err(e) = create_archive(source, &partial, scope) {
        let _ = std::fs::remove_file(&partial);
        return Err(e);
    }
    if let Err(e) = store.enforce_retention(cap) {
        let _ = std::fs::remove_file(&partial);
        return Err(e);
    }
    std::fs::rename(&partial, &path)?;
    store.record(&path)
}

/// Undoes what a backup changed on the instance: the `BackingUp` status and
/// disabled auto-save.
///
/// `release` undoes it in order. If the backup future is dropped first, the
/// status is restored on drop and `save-on` is sent from a detached task.
struct BackupGuard<'a> {
    instance: &'a Instance,
    restore_to: Option<LifecycleStatus>,
    save_off: Option<StdioConsole>,
}

impl<'a> BackupGuard<'a> {
    fn new(instance: &'a Instance) -> Self {
        Self {
            instance,
            restore_to: None,
            save_off: None,
        }
    }

    fn restore_status(&mut self) {
        if let Some(previous) = self.restore_to.take() {
            let mut state = self.instance.state();
            if state.status.current() == LifecycleStatus::BackingUp {
                state.status.set(previous);
            }
        }
    }

    async fn release(mut self) {
        self.restore_status();
        if let Some(console) = self.save_off.take() {
            if let Err(e) = console.send_command(SAVE_ON_COMMAND).await {
                tracing::warn!(error = %e, "Failed to re-enable auto-save");
            }
        }
    }
}

impl Drop for BackupGuard<'_> {
    fn drop(&mut self) {
        self.restore_status();
        if let Some(console) = self.save_off.take() {
            tracing::warn!(owner = %self.instance.owner, "Backup interrupted, re-enabling auto-save");
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    if let Err(e) = console.send_command(SAVE_ON_COMMAND).await {
                        tracing::warn!(error = %e, "Failed to re-enable auto-save");
                    }
                });
            }
        }
    }
}

impl Instance {
    /// Archives the data directory, or only the world and settings when
    /// `full` is false.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub async fn create_backup(&self, full: bool) -> Result<BackupRecord> {
        let _op = self.op_lock.lock().await;
        let result = self.backup_locked(full).await;
        match &result {
            Ok(record) => {
                tracing::info!(backup = %record.name, size = record.size, "Backup created");
                self.record(
                    LifecycleEventKind::BackupCreated,
                    self.run_id(),
                    Some(record.name.clone()),
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Backup failed");
                self.record(
                    LifecycleEventKind::BackupFailed,
                    self.run_id(),
                    Some(e.to_string()),
                );
            }
        }
        result
    }

    async fn backup_locked(&self, full: bool) -> Result<BackupRecord> {
        let mut guard = BackupGuard::new(self);
        let result = self.quiesce_and_archive(&mut guard, full).await;
        guard.release().await;
        result
    }

    async fn quiesce_and_archive(
        &self,
        guard: &mut BackupGuard<'_>,
        full: bool,
    ) -> Result<BackupRecord> {
        let (status, console) = {
            let state = self.state();
            let status = state.status.current();
            let console = if status.is_serving() {
                state.run.as_ref().map(|run| run.console.clone())
            } else {
                None
            };
            (status, console)
        };
        if status.is_transition() {
            return Err(Error::Busy(status.to_string()));
        }

        if let Some(console) = console {
            guard.save_off = Some(console.clone());
            self.quiesce(&console).await?;
        }

        {
            let mut state = self.state();
            guard.restore_to = Some(state.status.current());
            state.status.set(LifecycleStatus::BackingUp);
        }

        self.archive(full).await
    }

    /// Turns auto-save off and waits for a forced save to finish.
    async fn quiesce(&self, console: &StdioConsole) -> Result<()> {
        let mut saves = self.save_signal.subscribe();
        saves.borrow_and_update();

        console.send_command(SAVE_OFF_COMMAND).await?;
        console.send_command(SAVE_ALL_COMMAND).await?;

        let timeout = self.ctx.config.save_timeout;
        let saved = matches!(time::timeout(timeout, saves.changed()).await, Ok(Ok(())));
        if !saved {
            return Err(Error::Timeout(format!(
                "world save did not complete within {:?}",
                timeout
            )));
        }
        tracing::debug!("World saved");
        Ok(())
    }

    async fn archive(&self, full: bool) -> Result<BackupRecord> {
        let scope = if full {
            ArchiveScope::Full
        } else {
            let level = self.properties.level_name()?;
            ArchiveScope::Only(vec![
                PathBuf::from(level),
                PathBuf::from(PROPERTIES_FILE),
                PathBuf::from(DESCRIPTOR_FILE),
            ])
        };
        let cap = self.state().settings.retention_cap();
        let store = self.backup_store.clone();
        let source = self.dir.clone();

        tokio::task::spawn_blocking(move || write_backup(&store, &source, &scope, cap))
            .await
            .map_err(|e| Error::Backup(format!("Backup task failed: {}", e)))?
    }

    /// Backups of this instance, newest first.
    pub fn backups(&self) -> Result<Vec<BackupRecord>> {
        self.backup_store.list()
    }

    /// Deletes the `index`-th backup, counting from 1 with the newest first.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub fn remove_backup(&self, index: usize) -> Result<BackupRecord> {
        let record = self.backup_store.remove_at(index)?;
        tracing::info!(backup = %record.name, "Backup removed");
        Ok(record)
    }

    /// Deletes every backup of this instance.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub fn remove_all_backups(&self) -> Result<usize> {
        let removed = self.backup_store.remove_all()?;
        tracing::info!(removed, "Backups removed");
        Ok(removed)
    }

    /// Backs up every `minutes` while the server is online and remembers the
    /// schedule. Zero cancels it.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub fn schedule_backups(&self, minutes: u64) -> Result<()> {
        if minutes == 0 {
            return self.cancel_backup_schedule();
        }
        self.install_schedule(minutes);
        self.persist_schedule(minutes)?;
        tracing::info!(minutes, "Backup schedule set");
        Ok(())
    }

    /// Starts the timer without touching the descriptor.
    pub(crate) fn install_schedule(&self, minutes: u64) {
        let weak = self.weak.clone();
        self.schedule
            .replace(Duration::from_secs(minutes * 60), move || {
                let weak = weak.clone();
                async move {
                    let Some(instance) = weak.upgrade() else {
                        return false;
                    };
                    instance.scheduled_backup().await;
                    true
                }
            });
    }

    /// Stops scheduled backups and forgets the schedule.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub fn cancel_backup_schedule(&self) -> Result<()> {
        if self.schedule.cancel() {
            tracing::info!("Backup schedule cancelled");
        }
        self.persist_schedule(0)
    }

    /// Interval of the active backup schedule.
    pub fn backup_schedule(&self) -> Option<Duration> {
        self.schedule.period()
    }

    async fn scheduled_backup(&self) {
        let status = self.status();
        if status != LifecycleStatus::Online {
            tracing::debug!(owner = %self.owner, %status, "Skipping scheduled backup");
            return;
        }
        if let Err(e) = self.create_backup(true).await {
            tracing::warn!(owner = %self.owner, error = %e, "Scheduled backup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_prunes_to_cap() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("server");
        std::fs::create_dir_all(source.join("world")).unwrap();
        std::fs::write(source.join("world/level.dat"), b"level").unwrap();
        let store = BackupStore::new(dir.path().join("backups"));
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.dir().join("old.zip"), b"PK").unwrap();

        let record = write_backup(&store, &source, &ArchiveScope::Full, 1).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, record.name);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_write_keeps_existing_backups() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("server");
        std::fs::create_dir_all(&source).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), source.join("dangling")).unwrap();
        let store = BackupStore::new(dir.path().join("backups"));
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.dir().join("old.zip"), b"PK").unwrap();

        assert!(write_backup(&store, &source, &ArchiveScope::Full, 1).is_err());

        let names: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["old.zip"]);
    }
}
