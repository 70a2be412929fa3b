use serde::Serialize;
use std::fmt;

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LifecycleStatus {
    /// No process.
    Offline,
    /// Process launched, ready banner not seen yet.
    Starting,
    /// Accepting players.
    Online,
    /// World save in progress.
    Saving,
    /// Archiving the data directory.
    BackingUp,
    /// Installing a server build.
    Installing,
    /// Graceful stop in progress.
    Stopping,
    /// Process tree being terminated.
    Killing,
    /// Stopping with a start to follow.
    Restarting,
}

impl LifecycleStatus {
    /// Whether the process is up and answering console commands.
    pub fn is_serving(self) -> bool {
        matches!(self, LifecycleStatus::Online | LifecycleStatus::Saving)
    }

    /// Whether an exclusive lifecycle operation is under way.
    pub fn is_transition(self) -> bool {
        matches!(
            self,
            LifecycleStatus::Starting
                | LifecycleStatus::Stopping
                | LifecycleStatus::Killing
                | LifecycleStatus::Restarting
                | LifecycleStatus::Installing
        )
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Current status plus the one it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCell {
    current: LifecycleStatus,
    previous: LifecycleStatus,
}

impl StatusCell {
    pub fn new() -> Self {
        Self {
            current: LifecycleStatus::Offline,
            previous: LifecycleStatus::Offline,
        }
    }

    pub fn current(&self) -> LifecycleStatus {
        self.current
    }

    pub fn previous(&self) -> LifecycleStatus {
        self.previous
    }

    /// Moves to `status`, remembering the current one. Setting the current
    /// status again changes nothing.
    pub fn set(&mut self, status: LifecycleStatus) {
        if self.current != status {
            self.previous = self.current;
            self.current = status;
        }
    }

    /// Returns to the remembered status.
    pub fn restore_previous(&mut self) {
        std::mem::swap(&mut self.current, &mut self.previous);
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}
