use crate::error::{Error, Result};
use crate::server::RunId;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Number of events kept per instance.
pub const EVENT_HISTORY_LIMIT: usize = 1000;

/// Instance lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleEventKind {
    /// Server process launched
    Started,
    /// Server reported it accepts players
    Ready,
    /// Server stopped after a console stop
    Stopped,
    /// Server process tree was killed
    Killed,
    /// Server process exited on its own
    Exited,
    /// Corrective restart issued after a runtime problem
    SelfHealRestart,
    /// Corrective restarts ran out
    SelfHealExhausted,
    /// Server build installed
    Installed,
    /// Server build could not be installed
    InstallFailed,
    /// Backup archive written
    BackupCreated,
    /// Backup attempt aborted
    BackupFailed,
}

/// Instance lifecycle event
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    /// Process run the event belongs to, if any
    pub run: Option<RunId>,
    /// Event type
    pub kind: LifecycleEventKind,
    /// Event timestamp
    pub timestamp: DateTime<Local>,
    /// Event details
    pub details: Option<String>,
}

/// Bounded history of one instance's lifecycle events.
#[derive(Debug)]
pub struct LifecycleLog {
    events: Mutex<VecDeque<LifecycleEvent>>,
    limit: usize,
}

impl LifecycleLog {
    /// Create a log keeping the last [`EVENT_HISTORY_LIMIT`] events
    pub fn new() -> Self {
        Self::with_limit(EVENT_HISTORY_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            limit: limit.max(1),
        }
    }

    /// Record an event
    pub fn record(
        &self,
        kind: LifecycleEventKind,
        run: Option<RunId>,
        details: Option<String>,
    ) -> Result<()> {
        let event = LifecycleEvent {
            run,
            kind,
            timestamp: Local::now(),
            details,
        };

        let mut events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock lifecycle events".to_string()))?;
        events.push_back(event);
        while events.len() > self.limit {
            events.pop_front();
        }

        Ok(())
    }

    /// Recent events, newest first
    pub fn events(&self, limit: Option<usize>) -> Result<Vec<LifecycleEvent>> {
        let events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock lifecycle events".to_string()))?;

        let take = limit.unwrap_or(events.len());
        Ok(events.iter().rev().take(take).cloned().collect())
    }
}

impl Default for LifecycleLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_newest_first_and_bounded() {
        let log = LifecycleLog::with_limit(3);
        log.record(LifecycleEventKind::Started, None, None).unwrap();
        log.record(LifecycleEventKind::Ready, None, None).unwrap();
        log.record(LifecycleEventKind::Stopped, None, None).unwrap();
        log.record(LifecycleEventKind::Started, None, Some("again".into()))
            .unwrap();

        let kinds: Vec<_> = log.events(None).unwrap().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LifecycleEventKind::Started,
                LifecycleEventKind::Stopped,
                LifecycleEventKind::Ready
            ]
        );
        let newest = log.events(Some(1)).unwrap();
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0].details.as_deref(), Some("again"));
    }
}
