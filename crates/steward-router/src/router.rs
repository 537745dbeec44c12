//! Endpoint mapping computation and publication.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use steward_topology::{EndpointMapping, TopologySnapshot};

/// Routing errors surfaced to mapping consumers.
#[derive(Debug, Error, PartialEq)]
pub enum RouterError {
    #[error("no primary available for writes")]
    NoPrimary,

    #[error("stale mapping rejected: generation {seen} does not exceed {last}")]
    StaleMappingRejected { seen: u64, last: u64 },
}

/// Maintains and publishes the authoritative endpoint mapping.
pub struct EndpointRouter {
    generation: AtomicU64,
    current: RwLock<EndpointMapping>,
    tx: watch::Sender<EndpointMapping>,
}

impl EndpointRouter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(EndpointMapping::empty());
        Self {
            generation: AtomicU64::new(0),
            current: RwLock::new(EndpointMapping::empty()),
            tx,
        }
    }

    /// Recompute the mapping from a snapshot and publish it under a
    /// fresh generation.
    ///
    /// Write endpoint is the primary's address; read endpoints are the
    /// healthy replicas, falling back to the primary when the replica
    /// set is empty (degraded mode — reads stay available but share the
    /// write node).
    pub fn republish(&self, snapshot: &TopologySnapshot) -> EndpointMapping {
        let write = snapshot.primary_node().map(|n| n.address.clone());

        let mut read: Vec<String> = snapshot
            .healthy_replicas()
            .iter()
            .map(|n| n.address.clone())
            .collect();

        let degraded = read.is_empty() && write.is_some();
        if degraded {
            warn!("no healthy replicas, reads degraded to the primary");
            read = write.iter().cloned().collect();
        }

        let mapping = EndpointMapping {
            generation: self.generation.fetch_add(1, Ordering::AcqRel) + 1,
            write,
            read,
            degraded,
        };

        *self.current.write().expect("mapping lock") = mapping.clone();
        let _ = self.tx.send(mapping.clone());
        info!(
            generation = mapping.generation,
            write = mapping.write.as_deref().unwrap_or("-"),
            reads = mapping.read.len(),
            degraded = mapping.degraded,
            "endpoint mapping published"
        );
        mapping
    }

    /// Publish only if the routes differ from the current mapping.
    ///
    /// Used by the periodic change detector so steady-state ticks do not
    /// burn generations; failover paths call `republish` directly.
    pub fn republish_if_changed(&self, snapshot: &TopologySnapshot) -> Option<EndpointMapping> {
        let next_write = snapshot.primary_node().map(|n| n.address.clone());
        let mut next_read: Vec<String> = snapshot
            .healthy_replicas()
            .iter()
            .map(|n| n.address.clone())
            .collect();
        let degraded = next_read.is_empty() && next_write.is_some();
        if degraded {
            next_read = next_write.iter().cloned().collect();
        }

        {
            let current = self.current.read().expect("mapping lock");
            if current.generation > 0
                && current.write == next_write
                && current.read == next_read
                && current.degraded == degraded
            {
                return None;
            }
        }
        debug!("topology routes changed");
        Some(self.republish(snapshot))
    }

    /// The last published mapping.
    pub fn current(&self) -> EndpointMapping {
        self.current.read().expect("mapping lock").clone()
    }

    /// Address of the write endpoint, if a primary is routable.
    pub fn write_endpoint(&self) -> Result<String, RouterError> {
        self.current
            .read()
            .expect("mapping lock")
            .write
            .clone()
            .ok_or(RouterError::NoPrimary)
    }

    /// Subscribe to mapping publications.
    pub fn subscribe(&self) -> watch::Receiver<EndpointMapping> {
        self.tx.subscribe()
    }
}

impl Default for EndpointRouter {
    fn default() -> Self {
        Self::new()
    }
}
