//! Shared fixtures for controller integration tests.

// Not every test binary touches every helper.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use steward_topology::{ClusterBackend, HealthState, NodeId, NodeRole, NodeSpec, TopologyStore};

/// In-process cluster backend that records every command in order.
pub struct RecordingBackend {
    calls: Mutex<Vec<String>>,
    fail_promote: Mutex<HashSet<NodeId>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_promote: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_promote_of(&self, id: &str) {
        self.fail_promote
            .lock()
            .expect("fail lock")
            .insert(id.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

#[async_trait]
impl ClusterBackend for RecordingBackend {
    async fn list_nodes(&self) -> anyhow::Result<Vec<NodeSpec>> {
        Ok(Vec::new())
    }

    async fn register_node(&self, spec: &NodeSpec) -> anyhow::Result<()> {
        self.record(format!("register {}", spec.id));
        Ok(())
    }

    async fn deregister_node(&self, id: &NodeId) -> anyhow::Result<()> {
        self.record(format!("deregister {id}"));
        Ok(())
    }

    async fn fence(&self, id: &NodeId) -> anyhow::Result<()> {
        self.record(format!("fence {id}"));
        Ok(())
    }

    async fn promote(&self, id: &NodeId) -> anyhow::Result<()> {
        self.record(format!("promote {id}"));
        if self.fail_promote.lock().expect("fail lock").contains(id) {
            anyhow::bail!("promote rejected");
        }
        Ok(())
    }

    async fn set_replica_count(&self, count: u32) -> anyhow::Result<()> {
        self.record(format!("set_replica_count {count}"));
        Ok(())
    }
}

/// One primary and two healthy replicas with the given lags.
pub fn seeded_topology(lags: &[(&str, f64)]) -> std::sync::Arc<TopologyStore> {
    let topology = std::sync::Arc::new(TopologyStore::new());
    topology
        .register(&NodeSpec {
            id: "pg-0".to_string(),
            address: "pg-0.db.local:5432".to_string(),
            role: NodeRole::Primary,
        })
        .unwrap();
    topology
        .record_probe("pg-0", HealthState::Healthy, None, 1)
        .unwrap();
    for (id, lag) in lags {
        topology
            .register(&NodeSpec {
                id: id.to_string(),
                address: format!("{id}.db.local:5432"),
                role: NodeRole::Replica,
            })
            .unwrap();
        topology
            .record_probe(id, HealthState::Healthy, Some(*lag), 1)
            .unwrap();
    }
    topology
}
