//! The autoscale control loop.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use steward_core::epoch_secs;
use steward_metrics::MetricAggregator;
use steward_topology::{ClusterBackend, NodeId, ScalingDecision, TopologyStore};

/// Scaling bounds and targets.
#[derive(Debug, Clone)]
pub struct ScalePolicy {
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub target_cpu_pct: f64,
    pub target_mem_pct: f64,
    /// A lower desired count must persist this long before any removal.
    pub stabilization: Duration,
    /// Replicas removed per tick at most.
    pub max_step_down: u32,
}

/// Tracks how long a lower desired count has persisted.
#[derive(Debug, Clone, Copy)]
struct PendingDown {
    since: u64,
}

/// Evaluates load against targets and converges the replica count.
pub struct Autoscaler {
    topology: Arc<TopologyStore>,
    aggregator: Arc<MetricAggregator>,
    backend: Arc<dyn ClusterBackend>,
    policy: ScalePolicy,
    pending_down: Option<PendingDown>,
}

impl Autoscaler {
    pub fn new(
        topology: Arc<TopologyStore>,
        aggregator: Arc<MetricAggregator>,
        backend: Arc<dyn ClusterBackend>,
        mut policy: ScalePolicy,
    ) -> Self {
        policy.max_step_down = policy.max_step_down.max(1);
        Self {
            topology,
            aggregator,
            backend,
            policy,
            pending_down: None,
        }
    }

    /// Evaluate one tick as of `now`. Returns a decision only when the
    /// replica count should change.
    pub fn evaluate_at(&mut self, now: u64) -> Option<ScalingDecision> {
        let snapshot = self.topology.snapshot();
        if snapshot.promotion_in_flight {
            // Scaling around a role change would race the coordinator.
            debug!("promotion in flight, autoscale tick deferred");
            return None;
        }

        let replicas: Vec<NodeId> = snapshot.replicas().iter().map(|n| n.id.clone()).collect();
        let current = replicas.len() as u32;
        if current == 0 {
            return None;
        }

        let Some(agg) = self.aggregator.aggregate(&replicas, now) else {
            debug!("no samples in window, autoscale tick skipped");
            return None;
        };
        if agg.partial {
            debug!(nodes = agg.nodes, "aggregate is partial");
        }

        let ratio = (agg.cpu_pct / self.policy.target_cpu_pct)
            .max(agg.mem_pct / self.policy.target_mem_pct);
        let desired = ((current as f64) * ratio).ceil() as u32;
        let desired = desired.clamp(self.policy.min_replicas, self.policy.max_replicas);

        if desired > current {
            // Spikes are met immediately.
            self.pending_down = None;
            let reason = format!(
                "cpu {:.1}%/{:.1}% mem {:.1}%/{:.1}%",
                agg.cpu_pct,
                self.policy.target_cpu_pct,
                agg.mem_pct,
                self.policy.target_mem_pct
            );
            info!(from = current, to = desired, %reason, "scaling up");
            return Some(ScalingDecision {
                desired,
                current,
                reason,
                at: now,
            });
        }

        if desired < current {
            let since = match self.pending_down {
                Some(p) => p.since,
                None => {
                    self.pending_down = Some(PendingDown { since: now });
                    debug!(
                        desired,
                        current, "lower desired count observed, stabilization window opened"
                    );
                    return None;
                }
            };

            if now.saturating_sub(since) < self.policy.stabilization.as_secs() {
                return None;
            }

            // Stabilized; remove at most max_step_down per tick.
            let stepped = desired.max(current.saturating_sub(self.policy.max_step_down));
            self.pending_down = None;
            let reason = format!(
                "cpu {:.1}%/{:.1}% mem {:.1}%/{:.1}% stable for {}s",
                agg.cpu_pct,
                self.policy.target_cpu_pct,
                agg.mem_pct,
                self.policy.target_mem_pct,
                now.saturating_sub(since)
            );
            info!(from = current, to = stepped, %reason, "scaling down");
            return Some(ScalingDecision {
                desired: stepped,
                current,
                reason,
                at: now,
            });
        }

        self.pending_down = None;
        None
    }

    /// Run one tick against the wall clock, applying any decision
    /// through the cluster backend.
    pub async fn tick(&mut self) -> Option<ScalingDecision> {
        let decision = self.evaluate_at(epoch_secs())?;
        if let Err(e) = self.backend.set_replica_count(decision.desired).await {
            warn!(
                desired = decision.desired,
                error = %e,
                "replica count convergence failed"
            );
        }
        Some(decision)
    }

    /// Run the control loop until shutdown.
    pub async fn run(
        &mut self,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        info!(interval_secs = interval.as_secs(), "autoscaler started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }
}
