use crate::network::PlayerCounter;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

/// Player monitor configuration
#[derive(Debug, Clone)]
pub struct PlayerMonitorConfig {
    /// Refresh interval
    pub refresh_interval: Duration,
    /// Timeout of a single query
    pub query_timeout: Duration,
}

impl Default for PlayerMonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// Keeps an instance's player count fresh while its server runs.
///
/// The count is refreshed on a fixed interval and whenever the console reports
/// a join or leave. A failed query reports zero players.
pub struct PlayerMonitor {
    /// Player count source
    counter: Arc<dyn PlayerCounter>,
    /// Last known count
    count: Arc<AtomicU32>,
    /// Monitor configuration
    config: PlayerMonitorConfig,
    /// Monitor task
    monitor_task: Mutex<Option<JoinHandle<()>>>,
    /// Running flag
    running: Arc<AtomicBool>,
}

impl PlayerMonitor {
    /// Create a new player monitor
    pub fn new(counter: Arc<dyn PlayerCounter>, config: PlayerMonitorConfig) -> Self {
        Self {
            counter,
            count: Arc::new(AtomicU32::new(0)),
            config,
            monitor_task: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Last known player count
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Start refreshing the count of the server listening on `port`
    pub fn start(&self, port: u16) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let counter = Arc::clone(&self.counter);
        let count = Arc::clone(&self.count);
        let running = Arc::clone(&self.running);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            let start = time::Instant::now() + config.refresh_interval;
            let mut interval = time::interval_at(start, config.refresh_interval);

            loop {
                interval.tick().await;

                if !running.load(Ordering::SeqCst) {
                    break;
                }

                query_into(counter.as_ref(), &count, port, config.query_timeout).await;
            }
        });

        let mut slot = self
            .monitor_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Stop the monitor and reset the count
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        let task = self
            .monitor_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
        self.count.store(0, Ordering::Relaxed);
    }

    /// Query now and wait for the result
    pub async fn refresh(&self, port: u16) -> u32 {
        query_into(
            self.counter.as_ref(),
            &self.count,
            port,
            self.config.query_timeout,
        )
        .await
    }

    /// Query on a background task
    pub fn refresh_in_background(&self, port: u16) {
        let counter = Arc::clone(&self.counter);
        let count = Arc::clone(&self.count);
        let timeout = self.config.query_timeout;

        tokio::spawn(async move {
            query_into(counter.as_ref(), &count, port, timeout).await;
        });
    }
}

async fn query_into(
    counter: &dyn PlayerCounter,
    count: &AtomicU32,
    port: u16,
    timeout: Duration,
) -> u32 {
    let online = match time::timeout(timeout, counter.query(port)).await {
        Ok(Ok(reply)) => reply.online,
        Ok(Err(e)) => {
            tracing::debug!(port, error = %e, "Player count query failed");
            0
        }
        Err(_) => {
            tracing::debug!(port, "Player count query timed out");
            0
        }
    };
    count.store(online, Ordering::Relaxed);
    online
}

impl Drop for PlayerMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::network::PlayerCount;
    use async_trait::async_trait;

    struct Fixed(Option<u32>);

    #[async_trait]
    impl PlayerCounter for Fixed {
        async fn query(&self, _port: u16) -> Result<PlayerCount> {
            match self.0 {
                Some(online) => Ok(PlayerCount {
                    online,
                    max: 20,
                    ..Default::default()
                }),
                None => Err(Error::Other("refused".into())),
            }
        }
    }

    #[tokio::test]
    async fn test_refresh_updates_count() {
        let monitor = PlayerMonitor::new(Arc::new(Fixed(Some(4))), PlayerMonitorConfig::default());
        assert_eq!(monitor.refresh(25565).await, 4);
        assert_eq!(monitor.count(), 4);

        monitor.stop();
        assert_eq!(monitor.count(), 0);
    }

    #[tokio::test]
    async fn test_failed_query_reports_zero() {
        let monitor = PlayerMonitor::new(Arc::new(Fixed(None)), PlayerMonitorConfig::default());
        assert_eq!(monitor.refresh(25565).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_refresh() {
        let config = PlayerMonitorConfig {
            refresh_interval: Duration::from_secs(60),
            query_timeout: Duration::from_secs(1),
        };
        let monitor = PlayerMonitor::new(Arc::new(Fixed(Some(7))), config);
        monitor.start(25565);
        assert_eq!(monitor.count(), 0);

        time::sleep(Duration::from_secs(61)).await;
        assert_eq!(monitor.count(), 7);
        monitor.stop();
    }
}
