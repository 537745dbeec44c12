//! The promotion coordinator.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use steward_router::EndpointRouter;
use steward_topology::{
    ClusterBackend, Node, NodeId, NodeRole, PrimaryDownEvent, TopologyError, TopologySnapshot,
    TopologyStore,
};

/// Promotion failures surfaced to the run loop and the admin API.
#[derive(Debug, Error)]
pub enum PromoteError {
    #[error("a promotion is already in flight")]
    InFlight,

    #[error("automatic remediation is halted; forced failover required")]
    Halted,

    #[error("stale event: {0} is no longer the primary")]
    StaleEvent(NodeId),

    #[error("failed to fence {node}: {source}")]
    FenceFailed {
        node: NodeId,
        #[source]
        source: anyhow::Error,
    },

    #[error("target {0} is not a viable replica")]
    InvalidTarget(NodeId),

    #[error("no viable promotion candidate remains")]
    NoViablePrimary,

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Drives fencing and promotion against the cluster backend.
pub struct PromotionCoordinator {
    topology: Arc<TopologyStore>,
    backend: Arc<dyn ClusterBackend>,
    router: Arc<EndpointRouter>,
    promote_timeout: Duration,
    /// Set after a fail-stop; automatic events are ignored until a
    /// forced failover succeeds.
    halted: AtomicBool,
}

impl PromotionCoordinator {
    pub fn new(
        topology: Arc<TopologyStore>,
        backend: Arc<dyn ClusterBackend>,
        router: Arc<EndpointRouter>,
        promote_timeout: Duration,
    ) -> Self {
        Self {
            topology,
            backend,
            router,
            promote_timeout,
            halted: AtomicBool::new(false),
        }
    }

    /// Whether automatic remediation is halted.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// React to a quorum-confirmed primary failure.
    pub async fn handle_event(&self, event: &PrimaryDownEvent) -> Result<NodeId, PromoteError> {
        if self.is_halted() {
            warn!(node = %event.node, "primary-down event ignored: remediation halted");
            return Err(PromoteError::Halted);
        }
        if self.topology.primary_id().as_deref() != Some(event.node.as_str()) {
            // A promotion already resolved this failure.
            debug!(node = %event.node, "primary-down event coalesced");
            return Err(PromoteError::StaleEvent(event.node.clone()));
        }
        if !self.topology.begin_promotion() {
            debug!(node = %event.node, "promotion in flight, event coalesced");
            return Err(PromoteError::InFlight);
        }

        let result = self.failover(Some(event.node.clone()), None).await;
        self.topology.end_promotion();
        result
    }

    /// Operator-initiated failover, bypassing quorum detection.
    ///
    /// Fences the current primary (if any) and promotes `target` when
    /// given, otherwise the best candidate. Clears the halted flag on
    /// success.
    pub async fn force_failover(
        &self,
        target: Option<NodeId>,
    ) -> Result<NodeId, PromoteError> {
        if !self.topology.begin_promotion() {
            return Err(PromoteError::InFlight);
        }
        info!(target = target.as_deref().unwrap_or("auto"), "forced failover requested");

        let old = self.topology.primary_id();
        let result = self.failover(old, target).await;
        self.topology.end_promotion();
        result
    }

    /// Fence the old primary, then promote candidates until one sticks.
    ///
    /// The caller holds the promotion-in-flight flag.
    async fn failover(
        &self,
        old_primary: Option<NodeId>,
        target: Option<NodeId>,
    ) -> Result<NodeId, PromoteError> {
        // An explicit target is validated before anything is fenced, so a
        // mistyped operator request leaves the topology untouched. The
        // automatic path re-selects after every failed attempt.
        if let Some(t) = &target {
            let snapshot = self.topology.snapshot();
            if !is_viable(&snapshot, t) {
                return Err(PromoteError::InvalidTarget(t.clone()));
            }
        }
        let mut target = target;

        // Fencing comes next, unconditionally. Even if the old primary
        // is merely partitioned from the observers, it must lose its
        // write capability before anyone else gains it.
        if let Some(old) = &old_primary {
            self.topology.set_role(old, NodeRole::Fenced)?;
            self.topology.clear_primary();
            if let Err(e) = self.backend.fence(old).await {
                error!(node = %old, error = %e, "fencing failed, aborting failover");
                return Err(PromoteError::FenceFailed {
                    node: old.clone(),
                    source: e,
                });
            }
            info!(node = %old, "old primary fenced");
        }

        loop {
            let snapshot = self.topology.snapshot();
            let candidate = match target.take() {
                Some(t) => t,
                None => match select_candidate(&snapshot) {
                    Some(c) => c,
                    None => {
                        self.halted.store(true, Ordering::Release);
                        error!(
                            "no viable primary: all candidates fenced or unreachable, \
                             automatic remediation halted"
                        );
                        return Err(PromoteError::NoViablePrimary);
                    }
                },
            };

            self.topology.set_role(&candidate, NodeRole::Candidate)?;
            info!(node = %candidate, "promoting candidate");

            let attempt =
                tokio::time::timeout(self.promote_timeout, self.backend.promote(&candidate))
                    .await;

            match attempt {
                Ok(Ok(())) => {
                    self.topology.set_primary(&candidate)?;
                    self.router.republish(&self.topology.snapshot());
                    self.halted.store(false, Ordering::Release);
                    info!(node = %candidate, "promotion complete");
                    return Ok(candidate);
                }
                Ok(Err(e)) => {
                    warn!(node = %candidate, error = %e, "promote command failed, fencing candidate");
                }
                Err(_) => {
                    warn!(
                        node = %candidate,
                        timeout_secs = self.promote_timeout.as_secs(),
                        "promotion timed out, fencing candidate"
                    );
                }
            }

            // The half-promoted candidate can no longer be trusted as a
            // replica either.
            self.topology.set_role(&candidate, NodeRole::Fenced)?;
            if let Err(e) = self.backend.fence(&candidate).await {
                warn!(node = %candidate, error = %e, "failed to fence candidate");
            }
        }
    }

    /// Drain primary-down events until shutdown.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<PrimaryDownEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            promote_timeout_secs = self.promote_timeout.as_secs(),
            "promotion coordinator started"
        );
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => match self.handle_event(&event).await {
                            Ok(node) => info!(new_primary = %node, "failover resolved"),
                            Err(
                                PromoteError::InFlight
                                | PromoteError::Halted
                                | PromoteError::StaleEvent(_),
                            ) => {}
                            Err(e) => error!(error = %e, "failover failed"),
                        },
                        None => {
                            debug!("event channel closed");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("promotion coordinator shutting down");
                    break;
                }
            }
        }
    }
}

/// Pick the healthy, unfenced replica with minimum lag; break ties by
/// lowest node id so a given topology always selects the same node.
fn select_candidate(snapshot: &TopologySnapshot) -> Option<NodeId> {
    snapshot
        .healthy_replicas()
        .into_iter()
        .min_by(|a, b| cmp_lag(a, b).then_with(|| a.id.cmp(&b.id)))
        .map(|n| n.id.clone())
}

/// Nodes with unknown lag sort after any known lag.
fn cmp_lag(a: &Node, b: &Node) -> CmpOrdering {
    match (a.lag_secs, b.lag_secs) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    }
}

/// A forced-failover target must be a healthy, unfenced replica.
fn is_viable(snapshot: &TopologySnapshot, id: &str) -> bool {
    snapshot
        .healthy_replicas()
        .iter()
        .any(|n| n.id == id)
}
