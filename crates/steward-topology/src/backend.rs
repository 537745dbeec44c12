//! The cluster backend seam.
//!
//! All cluster mutations — enrolling nodes, fencing, promotion, replica
//! count convergence — go through this trait. The daemon ships an HTTP
//! implementation; tests substitute in-process mocks.

use async_trait::async_trait;

use crate::types::{NodeId, NodeSpec};

/// Orchestration collaborator the controller drives.
///
/// Implementations must be safe to call concurrently; the controller
/// never issues two conflicting role changes for the same node at once
/// (promotion is serialized through the topology's in-flight flag).
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Enumerate the nodes currently provisioned by the collaborator.
    async fn list_nodes(&self) -> anyhow::Result<Vec<NodeSpec>>;

    /// Provision and enroll a new node.
    async fn register_node(&self, spec: &NodeSpec) -> anyhow::Result<()>;

    /// Tear down a node.
    async fn deregister_node(&self, id: &NodeId) -> anyhow::Result<()>;

    /// Revoke the node's write capability.
    ///
    /// Must succeed even when the node is unreachable from the controller;
    /// the collaborator owns the actual revocation (e.g., cutting the
    /// node's virtual IP or write credential).
    async fn fence(&self, id: &NodeId) -> anyhow::Result<()>;

    /// Instruct the node to assume the primary role.
    ///
    /// Resolves once the node reports the new role; the caller bounds the
    /// wait with its own timeout.
    async fn promote(&self, id: &NodeId) -> anyhow::Result<()>;

    /// Converge the replica set to the given count.
    async fn set_replica_count(&self, count: u32) -> anyhow::Result<()>;
}
