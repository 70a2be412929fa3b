//! Fleet-wide port bookkeeping.
//!
//! Ports grow monotonically: a new allocation is always one past the highest
//! port ever claimed in this session, skipping the reserved set. Freed ports
//! are not handed out again within the same session.

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

/// Registry of the ports claimed by every instance on the host.
#[derive(Debug)]
pub struct PortRegistry {
    inner: Mutex<Claims>,
    reserved: BTreeSet<u16>,
}

#[derive(Debug, Default)]
struct Claims {
    ports: BTreeSet<u16>,
    high_water: Option<u16>,
}

impl Claims {
    fn insert(&mut self, port: u16) -> bool {
        self.high_water = Some(self.high_water.map_or(port, |high| high.max(port)));
        self.ports.insert(port)
    }
}

impl PortRegistry {
    /// Create a registry that never hands out any of `reserved`.
    pub fn new(reserved: impl IntoIterator<Item = u16>) -> Self {
        Self {
            inner: Mutex::new(Claims::default()),
            reserved: reserved.into_iter().collect(),
        }
    }

    fn claims(&self) -> MutexGuard<'_, Claims> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether `port` may never be allocated.
    pub fn is_reserved(&self, port: u16) -> bool {
        self.reserved.contains(&port)
    }

    /// Allocates and claims the next free port.
    #[tracing::instrument(skip(self))]
    pub fn allocate(&self) -> Result<u16> {
        let mut claims = self.claims();

        let mut candidate = match claims.high_water {
            Some(highest) => highest.checked_add(1).ok_or(Error::PortsExhausted)?,
            None => 1,
        };
        while self.reserved.contains(&candidate) || claims.ports.contains(&candidate) {
            candidate = candidate.checked_add(1).ok_or(Error::PortsExhausted)?;
        }

        claims.insert(candidate);
        tracing::debug!(port = candidate, "Allocated port");
        Ok(candidate)
    }

    /// Claims a port read back from persisted settings.
    ///
    /// Returns `false` without claiming when the port is reserved or already
    /// held by another instance.
    pub fn claim(&self, port: u16) -> bool {
        if port == 0 || self.is_reserved(port) {
            return false;
        }
        self.claims().insert(port)
    }

    /// Releases a claimed port.
    pub fn release(&self, port: u16) -> bool {
        self.claims().ports.remove(&port)
    }

    /// Snapshot of every claimed port, ascending.
    pub fn claimed(&self) -> Vec<u16> {
        self.claims().ports.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_allocation_is_one() {
        let ports = PortRegistry::new([22, 80, 5076]);
        assert_eq!(ports.allocate().unwrap(), 1);
        assert_eq!(ports.allocate().unwrap(), 2);
    }

    #[test]
    fn test_allocation_skips_reserved() {
        let ports = PortRegistry::new([22, 80, 5076]);
        assert!(ports.claim(21));
        assert_eq!(ports.allocate().unwrap(), 23);

        assert!(ports.claim(79));
        assert_eq!(ports.allocate().unwrap(), 81);

        assert!(ports.claim(5075));
        assert_eq!(ports.allocate().unwrap(), 5077);
    }

    #[test]
    fn test_allocation_starts_past_highest_claim() {
        let ports = PortRegistry::new([22, 80]);
        assert!(ports.claim(25565));
        assert!(ports.claim(100));
        assert_eq!(ports.allocate().unwrap(), 25566);
    }

    #[test]
    fn test_claim_rejects_duplicates_and_reserved() {
        let ports = PortRegistry::new([22, 80]);
        assert!(ports.claim(25565));
        assert!(!ports.claim(25565));
        assert!(!ports.claim(80));
        assert!(!ports.claim(0));
    }

    #[test]
    fn test_released_ports_are_not_reused() {
        let ports = PortRegistry::new(std::iter::empty());
        let first = ports.allocate().unwrap();
        let second = ports.allocate().unwrap();
        assert!(ports.release(second));
        assert_eq!(ports.allocate().unwrap(), second + 1);
        assert!(ports.release(first));
        assert_eq!(ports.allocate().unwrap(), second + 2);
        assert_eq!(ports.claimed(), vec![second + 1, second + 2]);
    }

    #[test]
    fn test_exhaustion() {
        let ports = PortRegistry::new(std::iter::empty());
        assert!(ports.claim(u16::MAX));
        assert!(matches!(ports.allocate(), Err(Error::PortsExhausted)));
    }
}
