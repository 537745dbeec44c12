//! The quorum failure detector state machine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use steward_core::epoch_secs;
use steward_topology::{
    NodeId, Observation, ObserverId, PrimaryDownEvent, TopologyStore, Verdict,
};

/// Detection phase for one monitored node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Healthy,
    /// At least one observer has asserted Down; the agreement window
    /// opened at the contained timestamp.
    Suspect { window_start: u64 },
    ConfirmedDown,
}

/// Per-node detection state.
struct NodeState {
    phase: Phase,
    /// Down verdicts: observer → timestamp of the latest assertion.
    down_votes: HashMap<ObserverId, u64>,
    /// Up verdicts collected while ConfirmedDown, for recovery quorum.
    up_votes: HashMap<ObserverId, u64>,
}

impl NodeState {
    fn new() -> Self {
        Self {
            phase: Phase::Healthy,
            down_votes: HashMap::new(),
            up_votes: HashMap::new(),
        }
    }
}

/// Aggregates observer verdicts into quorum-backed down decisions.
pub struct QuorumDetector {
    topology: Arc<TopologyStore>,
    /// Number of configured observers; quorum is a strict majority.
    observers: u32,
    window: Duration,
    states: HashMap<NodeId, NodeState>,
}

impl QuorumDetector {
    pub fn new(topology: Arc<TopologyStore>, observers: u32, window: Duration) -> Self {
        Self {
            topology,
            observers: observers.max(1),
            window,
            states: HashMap::new(),
        }
    }

    /// Minimum distinct observers required for agreement.
    pub fn majority(&self) -> usize {
        (self.observers as usize) / 2 + 1
    }

    /// Feed one observation through the state machine.
    ///
    /// Returns a `PrimaryDownEvent` exactly when this observation
    /// completes the down quorum for the current primary.
    pub fn observe(&mut self, obs: Observation) -> Option<PrimaryDownEvent> {
        let majority = self.majority();
        let window_secs = self.window.as_secs();
        let state = self
            .states
            .entry(obs.node.clone())
            .or_insert_with(NodeState::new);

        match obs.verdict {
            Verdict::Down => {
                match state.phase {
                    Phase::ConfirmedDown => {
                        // Already confirmed; absorb repeats.
                        return None;
                    }
                    Phase::Healthy => {
                        state.phase = Phase::Suspect {
                            window_start: obs.at,
                        };
                        state.down_votes.clear();
                        debug!(node = %obs.node, observer = %obs.observer, "agreement window opened");
                    }
                    Phase::Suspect { window_start } => {
                        if obs.at > window_start + window_secs {
                            info!(
                                node = %obs.node,
                                votes = state.down_votes.len(),
                                needed = majority,
                                "quorum not reached before window expired, restarting"
                            );
                            state.down_votes.clear();
                            state.phase = Phase::Suspect {
                                window_start: obs.at,
                            };
                        }
                    }
                }

                state.down_votes.insert(obs.observer, obs.at);
                let cutoff = obs.at.saturating_sub(window_secs);
                state.down_votes.retain(|_, at| *at >= cutoff);

                if state.down_votes.len() >= majority {
                    let votes = state.down_votes.len() as u32;
                    state.phase = Phase::ConfirmedDown;
                    state.up_votes.clear();
                    warn!(
                        node = %obs.node,
                        votes,
                        observers = self.observers,
                        "node confirmed down by quorum"
                    );

                    if self.topology.primary_id().as_deref() == Some(obs.node.as_str()) {
                        return Some(PrimaryDownEvent {
                            node: obs.node,
                            confirmed_at: obs.at,
                            down_votes: votes,
                        });
                    }
                }
                None
            }
            Verdict::Up => {
                match state.phase {
                    Phase::Healthy => {
                        state.down_votes.remove(&obs.observer);
                    }
                    Phase::Suspect { .. } => {
                        // An observer that sees the node again retracts
                        // its down verdict.
                        state.down_votes.remove(&obs.observer);
                        if state.down_votes.is_empty() {
                            state.phase = Phase::Healthy;
                            debug!(node = %obs.node, "suspicion cleared");
                        }
                    }
                    Phase::ConfirmedDown => {
                        state.up_votes.insert(obs.observer, obs.at);
                        let cutoff = obs.at.saturating_sub(window_secs);
                        state.up_votes.retain(|_, at| *at >= cutoff);

                        if state.up_votes.len() >= majority {
                            info!(
                                node = %obs.node,
                                votes = state.up_votes.len(),
                                "recovery verified by quorum"
                            );
                            state.phase = Phase::Healthy;
                            state.down_votes.clear();
                            state.up_votes.clear();
                        }
                    }
                }
                None
            }
        }
    }

    /// Reset agreement windows that expired without reaching majority.
    ///
    /// Called periodically so a node that simply stops producing
    /// observations cannot hold a half-open window forever.
    pub fn sweep(&mut self, now: u64) {
        let window_secs = self.window.as_secs();
        let majority = self.majority();
        for (node, state) in self.states.iter_mut() {
            if let Phase::Suspect { window_start } = state.phase
                && now > window_start + window_secs
            {
                if !state.down_votes.is_empty() {
                    info!(
                        node = %node,
                        votes = state.down_votes.len(),
                        needed = majority,
                        "quorum not reached before window expired, resetting"
                    );
                }
                state.down_votes.clear();
                state.phase = Phase::Suspect { window_start: now };
            }
        }
    }

    /// Drop detection state for a deregistered node.
    pub fn forget(&mut self, node_id: &str) {
        self.states.remove(node_id);
    }

    /// Drain observations until shutdown, forwarding confirmed primary
    /// failures to the promotion coordinator.
    pub async fn run(
        mut self,
        mut observations: mpsc::UnboundedReceiver<Observation>,
        events: mpsc::UnboundedSender<PrimaryDownEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            observers = self.observers,
            window_secs = self.window.as_secs(),
            "quorum detector started"
        );
        let mut sweep_tick = tokio::time::interval(self.window);

        loop {
            tokio::select! {
                obs = observations.recv() => {
                    match obs {
                        Some(obs) => {
                            if let Some(event) = self.observe(obs) {
                                let _ = events.send(event);
                            }
                        }
                        None => {
                            debug!("observation channel closed");
                            break;
                        }
                    }
                }
                _ = sweep_tick.tick() => {
                    self.sweep(epoch_secs());
                }
                _ = shutdown.changed() => {
                    info!("quorum detector shutting down");
                    break;
                }
            }
        }
    }
}
