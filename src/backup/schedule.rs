use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

/// Recurring backup timer of one instance. At most one timer is active.
#[derive(Debug, Default)]
pub struct BackupSchedule {
    active: Mutex<Option<(Duration, JoinHandle<()>)>>,
}

impl BackupSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<(Duration, JoinHandle<()>)>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Installs a timer calling `tick` every `period`, first after one full
    /// period. Any previous timer is cancelled before the new one starts.
    ///
    /// Each tick runs as its own task: cancelling the timer stops further
    /// ticks but lets one already in flight finish. The timer ends on its own
    /// once `tick` resolves to `false`.
    pub fn replace<F, Fut>(&self, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let mut slot = self.slot();
        if let Some((_, previous)) = slot.take() {
            previous.abort();
        }

        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match tokio::spawn(tick()).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Scheduled backup task failed");
                    }
                }
            }
        });
        *slot = Some((period, task));
    }

    /// Cancels the active timer. Returns whether there was one.
    pub fn cancel(&self) -> bool {
        match self.slot().take() {
            Some((_, task)) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Period of the active timer.
    pub fn period(&self) -> Option<Duration> {
        match self.slot().as_ref() {
            Some((period, task)) if !task.is_finished() => Some(*period),
            _ => None,
        }
    }
}

impl Drop for BackupSchedule {
    fn drop(&mut self) {
        self.cancel();
    }
}
