//! TopologyStore — per-node locked records with snapshot reads.
//!
//! Mutations lock one node record at a time; there is no lock spanning
//! all nodes, so a slow mutation never stalls the probe cycle of other
//! nodes. `snapshot()` clones each record under its own lock and hands
//! readers an immutable view.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::error::{TopologyError, TopologyResult};
use crate::types::{HealthState, Node, NodeId, NodeRole, NodeSpec};

/// Immutable point-in-time view of the topology.
#[derive(Debug, Clone)]
pub struct TopologySnapshot {
    pub nodes: Vec<Node>,
    pub primary: Option<NodeId>,
    pub promotion_in_flight: bool,
}

impl TopologySnapshot {
    /// Node record by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All nodes currently holding the replica role.
    pub fn replicas(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| n.role == NodeRole::Replica)
            .collect()
    }

    /// Replicas that are healthy right now.
    pub fn healthy_replicas(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| n.role == NodeRole::Replica && n.health == HealthState::Healthy)
            .collect()
    }

    /// The primary's node record, if one is set.
    pub fn primary_node(&self) -> Option<&Node> {
        self.primary.as_deref().and_then(|id| self.node(id))
    }

    /// Number of nodes holding the replica role.
    pub fn replica_count(&self) -> u32 {
        self.replicas().len() as u32
    }
}

/// The controller's owned, mutable view of the cluster.
pub struct TopologyStore {
    /// Node records, each behind its own lock. BTreeMap keeps iteration
    /// order stable for deterministic snapshots and candidate selection.
    nodes: RwLock<BTreeMap<NodeId, Arc<RwLock<Node>>>>,
    /// Current primary id, if any.
    primary: RwLock<Option<NodeId>>,
    /// Set while a promotion spans ticks; gates concurrent promotions
    /// and defers autoscale decisions touching the primary role.
    promotion_in_flight: AtomicBool,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            primary: RwLock::new(None),
            promotion_in_flight: AtomicBool::new(false),
        }
    }

    /// Enroll a node. The first node registered with the primary role
    /// becomes the current primary.
    pub fn register(&self, spec: &NodeSpec) -> TopologyResult<()> {
        let mut nodes = self.nodes.write().expect("nodes lock");
        if nodes.contains_key(&spec.id) {
            return Err(TopologyError::DuplicateNode(spec.id.clone()));
        }

        let node = Node {
            id: spec.id.clone(),
            role: spec.role,
            address: spec.address.clone(),
            health: HealthState::Unknown,
            lag_secs: None,
            last_seen: 0,
        };
        nodes.insert(spec.id.clone(), Arc::new(RwLock::new(node)));
        drop(nodes);

        if spec.role == NodeRole::Primary {
            let mut primary = self.primary.write().expect("primary lock");
            if let Some(existing) = primary.as_ref() {
                warn!(
                    node = %spec.id,
                    existing = %existing,
                    "second primary registered; keeping existing primary"
                );
            } else {
                *primary = Some(spec.id.clone());
            }
        }

        info!(node = %spec.id, address = %spec.address, role = ?spec.role, "node registered");
        Ok(())
    }

    /// Remove a node. Returns true if it existed.
    pub fn deregister(&self, id: &str) -> bool {
        let mut nodes = self.nodes.write().expect("nodes lock");
        let existed = nodes.remove(id).is_some();
        drop(nodes);

        if existed {
            let mut primary = self.primary.write().expect("primary lock");
            if primary.as_deref() == Some(id) {
                *primary = None;
                warn!(node = %id, "primary deregistered; no primary set");
            }
            info!(node = %id, "node deregistered");
        }
        existed
    }

    /// Probe-path write: update health, lag, and last-seen for one node.
    ///
    /// This is the only path that touches health/lag fields; the per-node
    /// lock serializes concurrent observers.
    pub fn record_probe(
        &self,
        id: &str,
        health: HealthState,
        lag_secs: Option<f64>,
        seen_at: u64,
    ) -> TopologyResult<()> {
        let slot = self.node_slot(id)?;
        let mut node = slot.write().expect("node lock");
        node.health = health;
        if let Some(lag) = lag_secs {
            node.lag_secs = Some(lag);
        }
        if seen_at > node.last_seen {
            node.last_seen = seen_at;
        }
        Ok(())
    }

    /// Set a node's role.
    pub fn set_role(&self, id: &str, role: NodeRole) -> TopologyResult<()> {
        let slot = self.node_slot(id)?;
        let mut node = slot.write().expect("node lock");
        debug!(node = %id, from = ?node.role, to = ?role, "role changed");
        node.role = role;
        Ok(())
    }

    /// Make the given node the primary.
    ///
    /// Demotes any node still holding the primary role back to replica in
    /// the same call, so at most one node ever holds the role.
    pub fn set_primary(&self, id: &str) -> TopologyResult<()> {
        // Take the primary lock across the whole transition so two
        // concurrent set_primary calls cannot interleave demotions.
        let mut primary = self.primary.write().expect("primary lock");

        let nodes = self.nodes.write().expect("nodes lock");
        if !nodes.contains_key(id) {
            return Err(TopologyError::NodeNotFound(id.to_string()));
        }
        for (other_id, slot) in nodes.iter() {
            if other_id != id {
                let mut node = slot.write().expect("node lock");
                if node.role == NodeRole::Primary {
                    node.role = NodeRole::Replica;
                    debug!(node = %other_id, "previous primary demoted to replica");
                }
            }
        }
        let slot = nodes.get(id).expect("checked above").clone();
        drop(nodes);

        slot.write().expect("node lock").role = NodeRole::Primary;
        *primary = Some(id.to_string());
        info!(node = %id, "primary set");
        Ok(())
    }

    /// Clear the primary without electing a replacement.
    pub fn clear_primary(&self) {
        let mut primary = self.primary.write().expect("primary lock");
        if let Some(old) = primary.take() {
            warn!(node = %old, "primary cleared");
        }
    }

    /// Current primary id.
    pub fn primary_id(&self) -> Option<NodeId> {
        self.primary.read().expect("primary lock").clone()
    }

    /// Try to claim the promotion-in-flight flag. Returns false if a
    /// promotion is already running.
    pub fn begin_promotion(&self) -> bool {
        self.promotion_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the promotion-in-flight flag.
    pub fn end_promotion(&self) {
        self.promotion_in_flight.store(false, Ordering::Release);
    }

    /// Whether a promotion currently spans ticks.
    pub fn promotion_in_flight(&self) -> bool {
        self.promotion_in_flight.load(Ordering::Acquire)
    }

    /// Clone a single node record.
    pub fn node(&self, id: &str) -> Option<Node> {
        let nodes = self.nodes.read().expect("nodes lock");
        nodes.get(id).map(|slot| slot.read().expect("node lock").clone())
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().expect("nodes lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone every node record into an immutable view.
    ///
    /// Each record is cloned under its own lock; a reader sees each node
    /// either before or after a concurrent mutation, never mid-write.
    pub fn snapshot(&self) -> TopologySnapshot {
        let nodes = self.nodes.read().expect("nodes lock");
        let records = nodes
            .values()
            .map(|slot| slot.read().expect("node lock").clone())
            .collect();
        drop(nodes);

        TopologySnapshot {
            nodes: records,
            primary: self.primary_id(),
            promotion_in_flight: self.promotion_in_flight(),
        }
    }

    fn node_slot(&self, id: &str) -> TopologyResult<Arc<RwLock<Node>>> {
        let nodes = self.nodes.read().expect("nodes lock");
        nodes
            .get(id)
            .cloned()
            .ok_or_else(|| TopologyError::NodeNotFound(id.to_string()))
    }
}

impl Default for TopologyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, role: NodeRole) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            address: format!("{id}.db.local:5432"),
            role,
        }
    }

    fn seeded_store() -> TopologyStore {
        let store = TopologyStore::new();
        store.register(&spec("pg-0", NodeRole::Primary)).unwrap();
        store.register(&spec("pg-1", NodeRole::Replica)).unwrap();
        store.register(&spec("pg-2", NodeRole::Replica)).unwrap();
        store
    }

    #[test]
    fn register_and_lookup() {
        let store = seeded_store();
        assert_eq!(store.len(), 3);
        assert_eq!(store.primary_id(), Some("pg-0".to_string()));

        let node = store.node("pg-1").unwrap();
        assert_eq!(node.role, NodeRole::Replica);
        assert_eq!(node.health, HealthState::Unknown);
        assert!(node.lag_secs.is_none());
    }

    #[test]
    fn duplicate_registration_rejected() {
        let store = seeded_store();
        let err = store.register(&spec("pg-1", NodeRole::Replica)).unwrap_err();
        assert!(matches!(err, TopologyError::DuplicateNode(_)));
    }

    #[test]
    fn deregister_primary_clears_primary() {
        let store = seeded_store();
        assert!(store.deregister("pg-0"));
        assert_eq!(store.primary_id(), None);
        assert!(!store.deregister("pg-0"));
    }

    #[test]
    fn record_probe_updates_health_and_lag() {
        let store = seeded_store();
        store
            .record_probe("pg-1", HealthState::Healthy, Some(0.5), 1000)
            .unwrap();

        let node = store.node("pg-1").unwrap();
        assert_eq!(node.health, HealthState::Healthy);
        assert_eq!(node.lag_secs, Some(0.5));
        assert_eq!(node.last_seen, 1000);

        // A failed probe keeps the last known lag and last-seen.
        store
            .record_probe("pg-1", HealthState::Suspect, None, 0)
            .unwrap();
        let node = store.node("pg-1").unwrap();
        assert_eq!(node.health, HealthState::Suspect);
        assert_eq!(node.lag_secs, Some(0.5));
        assert_eq!(node.last_seen, 1000);
    }

    #[test]
    fn record_probe_unknown_node() {
        let store = seeded_store();
        let err = store
            .record_probe("pg-9", HealthState::Healthy, None, 0)
            .unwrap_err();
        assert!(matches!(err, TopologyError::NodeNotFound(_)));
    }

    #[test]
    fn set_primary_demotes_previous_holder() {
        let store = seeded_store();
        store.set_primary("pg-1").unwrap();

        assert_eq!(store.primary_id(), Some("pg-1".to_string()));
        assert_eq!(store.node("pg-1").unwrap().role, NodeRole::Primary);
        assert_eq!(store.node("pg-0").unwrap().role, NodeRole::Replica);

        // At most one primary role in the snapshot.
        let snap = store.snapshot();
        let primaries = snap
            .nodes
            .iter()
            .filter(|n| n.role == NodeRole::Primary)
            .count();
        assert_eq!(primaries, 1);
    }

    #[test]
    fn set_primary_skips_demotion_of_fenced_primary() {
        let store = seeded_store();
        // Fence the old primary first, as the coordinator does.
        store.set_role("pg-0", NodeRole::Fenced).unwrap();
        store.set_primary("pg-2").unwrap();

        assert_eq!(store.node("pg-0").unwrap().role, NodeRole::Fenced);
        assert_eq!(store.node("pg-2").unwrap().role, NodeRole::Primary);
    }

    #[test]
    fn promotion_flag_is_exclusive() {
        let store = seeded_store();
        assert!(store.begin_promotion());
        assert!(!store.begin_promotion());
        assert!(store.promotion_in_flight());

        store.end_promotion();
        assert!(store.begin_promotion());
    }

    #[test]
    fn snapshot_filters_roles_and_health() {
        let store = seeded_store();
        store
            .record_probe("pg-1", HealthState::Healthy, Some(0.0), 10)
            .unwrap();
        store
            .record_probe("pg-2", HealthState::Suspect, Some(5.0), 10)
            .unwrap();

        let snap = store.snapshot();
        assert_eq!(snap.replicas().len(), 2);
        let healthy = snap.healthy_replicas();
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].id, "pg-1");
        assert_eq!(snap.primary_node().unwrap().id, "pg-0");
        assert_eq!(snap.replica_count(), 2);
    }

    #[test]
    fn second_registered_primary_does_not_displace_first() {
        let store = TopologyStore::new();
        store.register(&spec("pg-0", NodeRole::Primary)).unwrap();
        store.register(&spec("pg-9", NodeRole::Primary)).unwrap();
        assert_eq!(store.primary_id(), Some("pg-0".to_string()));
    }
}
