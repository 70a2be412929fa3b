use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Mutex;

/// Opens and closes external port forwards for instances.
///
/// Every call is best effort from the supervisor's point of view: failures are
/// logged and never stop a server from starting or exiting.
#[async_trait]
pub trait PortMapper: Send + Sync {
    /// Whether a forward for `port` is already in place.
    async fn is_open(&self, port: u16) -> Result<bool>;

    /// Adds a forward for `port`.
    async fn open(&self, port: u16, description: &str) -> Result<()>;

    /// Removes the forward for `port`.
    async fn close(&self, port: u16) -> Result<()>;
}

/// Port mapper for hosts without a gateway to talk to.
///
/// Keeps track of what would have been opened and logs every request.
#[derive(Debug, Default)]
pub struct NoopPortMapper {
    open: Mutex<BTreeSet<u16>>,
}

impl NoopPortMapper {
    pub fn new() -> Self {
        Self::default()
    }

    fn ports(&self) -> std::sync::MutexGuard<'_, BTreeSet<u16>> {
        self.open.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PortMapper for NoopPortMapper {
    async fn is_open(&self, port: u16) -> Result<bool> {
        Ok(self.ports().contains(&port))
    }

    async fn open(&self, port: u16, description: &str) -> Result<()> {
        tracing::debug!(port, description, "Port forward requested (no gateway)");
        self.ports().insert(port);
        Ok(())
    }

    async fn close(&self, port: u16) -> Result<()> {
        tracing::debug!(port, "Port forward removal requested (no gateway)");
        self.ports().remove(&port);
        Ok(())
    }
}
