//! Domain types shared across the Steward subsystems.
//!
//! All types are JSON-serializable; the admin API and the cluster backend
//! exchange them directly.

use serde::{Deserialize, Serialize};

/// Stable identifier for a store node.
pub type NodeId = String;

/// Identity of an independent failure-detection observer.
pub type ObserverId = String;

/// Role a node plays in the replicated store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// The single node accepting writes.
    Primary,
    /// Receives a continuous copy of primary data, serves reads.
    Replica,
    /// Mid-promotion: selected but not yet confirmed as primary.
    Candidate,
    /// Write capability revoked; excluded from promotion.
    Fenced,
}

/// Health of a node as judged by the probe path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    /// Unreachable by at least one probe path; not yet confirmed down.
    Suspect,
    Down,
    /// No probe has landed yet.
    Unknown,
}

/// A node record in the topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub role: NodeRole,
    /// Physical address (`host:port`).
    pub address: String,
    pub health: HealthState,
    /// Replication lag in seconds; `None` until first reported.
    pub lag_secs: Option<f64>,
    /// Unix timestamp of the last successful probe.
    pub last_seen: u64,
}

/// Registration spec handed over by the cluster backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub address: String,
    pub role: NodeRole,
}

/// A single health verdict from one observer about one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub observer: ObserverId,
    pub node: NodeId,
    pub verdict: Verdict,
    /// Unix timestamp the verdict was formed.
    pub at: u64,
}

/// Binary verdict carried by an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Up,
    Down,
}

/// Emitted once per quorum-confirmed primary failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryDownEvent {
    pub node: NodeId,
    /// Unix timestamp of the confirming observation.
    pub confirmed_at: u64,
    /// Observers that contributed a down verdict.
    pub down_votes: u32,
}

/// Logical-role → physical-address mapping published to consumers.
///
/// `generation` is strictly monotonic for the lifetime of a controller
/// instance; consumers must discard mappings whose generation does not
/// exceed the last one they applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointMapping {
    pub generation: u64,
    /// Address of the current primary; `None` during promotion.
    pub write: Option<String>,
    /// Addresses of healthy replicas, or the primary as a fallback.
    pub read: Vec<String>,
    /// True when reads fell back to the primary.
    pub degraded: bool,
}

impl EndpointMapping {
    /// The empty mapping published before the first topology snapshot.
    pub fn empty() -> Self {
        Self {
            generation: 0,
            write: None,
            read: Vec::new(),
            degraded: false,
        }
    }

    /// Whether two mappings route identically (generation excluded).
    pub fn same_routes(&self, other: &EndpointMapping) -> bool {
        self.write == other.write && self.read == other.read && self.degraded == other.degraded
    }
}

/// Desired replica count handed to the cluster backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub desired: u32,
    pub current: u32,
    pub reason: String,
    /// Unix timestamp the decision was made.
    pub at: u64,
}

/// A raw load sample from the telemetry feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub node_id: NodeId,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub lag_secs: f64,
    /// Unix timestamp the sample was taken.
    pub at: u64,
}
