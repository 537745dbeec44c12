//! Probe runner — background probe tasks per (observer, node) pair.
//!
//! Each enrolled node gets one probe task per configured observer
//! identity, so the quorum detector receives genuinely independent
//! verdict streams. Tasks update the topology through the single
//! probe-write path and forward observations over an mpsc channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use steward_core::epoch_secs;
use steward_topology::{HealthState, NodeId, Observation, TopologyStore, Verdict};

use crate::prober::{ProbeOutcome, StatusProber};
use crate::tracker::SuspectTracker;

/// Handle to one observer's probe task.
struct Slot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Probe runner settings.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Interval between probes per observer.
    pub interval: Duration,
    /// Per-probe timeout; must be shorter than the interval so a hung
    /// probe never blocks the next cycle.
    pub timeout: Duration,
    /// Consecutive unreachable probes before a Down observation.
    pub suspect_threshold: u32,
    /// Independent observer identities per node.
    pub observers: u32,
}

/// Manages probe tasks for all enrolled nodes.
pub struct ProbeRunner {
    topology: Arc<TopologyStore>,
    prober: Arc<dyn StatusProber>,
    observations: mpsc::UnboundedSender<Observation>,
    settings: ProbeSettings,
    /// Active probe tasks: node id → one slot per observer.
    slots: RwLock<HashMap<NodeId, Vec<Slot>>>,
}

impl ProbeRunner {
    pub fn new(
        topology: Arc<TopologyStore>,
        prober: Arc<dyn StatusProber>,
        observations: mpsc::UnboundedSender<Observation>,
        settings: ProbeSettings,
    ) -> Self {
        Self {
            topology,
            prober,
            observations,
            settings,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Start probing a node from every configured observer.
    ///
    /// Restarting an already probed node replaces its tasks.
    pub async fn start(&self, node_id: &str, address: &str) {
        let mut new_slots = Vec::with_capacity(self.settings.observers as usize);

        for i in 0..self.settings.observers {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let observer = format!("observer-{i}");
            let node_id_owned = node_id.to_string();
            let address = address.to_string();
            let prober = self.prober.clone();
            let topology = self.topology.clone();
            let obs_tx = self.observations.clone();
            let settings = self.settings.clone();

            let handle = tokio::spawn(async move {
                run_probe_loop(
                    observer,
                    node_id_owned,
                    address,
                    prober,
                    topology,
                    obs_tx,
                    settings,
                    shutdown_rx,
                )
                .await;
            });

            new_slots.push(Slot {
                handle,
                shutdown_tx,
            });
        }

        let mut slots = self.slots.write().await;
        if let Some(old) = slots.insert(node_id.to_string(), new_slots) {
            for slot in old {
                let _ = slot.shutdown_tx.send(true);
                slot.handle.abort();
            }
        }
        info!(
            node = %node_id,
            %address,
            observers = self.settings.observers,
            "probing started"
        );
    }

    /// Stop probing a node.
    pub async fn stop(&self, node_id: &str) {
        let mut slots = self.slots.write().await;
        if let Some(old) = slots.remove(node_id) {
            for slot in old {
                let _ = slot.shutdown_tx.send(true);
                slot.handle.abort();
            }
            info!(node = %node_id, "probing stopped");
        }
    }

    /// Stop all probe tasks (for graceful shutdown).
    pub async fn stop_all(&self) {
        let mut slots = self.slots.write().await;
        for (node_id, old) in slots.drain() {
            for slot in old {
                let _ = slot.shutdown_tx.send(true);
                slot.handle.abort();
            }
            debug!(node = %node_id, "probing stopped");
        }
        info!("all probe tasks stopped");
    }

    /// Node ids currently being probed.
    pub async fn active_nodes(&self) -> Vec<NodeId> {
        let slots = self.slots.read().await;
        slots.keys().cloned().collect()
    }

    /// Whether a node has active probe tasks.
    pub async fn is_probing(&self, node_id: &str) -> bool {
        let slots = self.slots.read().await;
        slots.contains_key(node_id)
    }
}

/// The probe loop for a single (observer, node) pair.
#[allow(clippy::too_many_arguments)]
async fn run_probe_loop(
    observer: String,
    node_id: String,
    address: String,
    prober: Arc<dyn StatusProber>,
    topology: Arc<TopologyStore>,
    obs_tx: mpsc::UnboundedSender<Observation>,
    settings: ProbeSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tracker = SuspectTracker::new(settings.suspect_threshold);
    debug!(%observer, node = %node_id, %address, "probe loop starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(settings.interval) => {
                let outcome = prober.probe(&address, settings.timeout).await;
                let now = epoch_secs();
                let judgment = tracker.record(&outcome);

                let (lag, seen_at, verdict) = match &outcome {
                    ProbeOutcome::Up { lag_secs } => (*lag_secs, now, Some(Verdict::Up)),
                    ProbeOutcome::Unreachable => {
                        // Down verdicts are only asserted once the streak
                        // crosses the threshold.
                        let v = (judgment == HealthState::Down).then_some(Verdict::Down);
                        (None, 0, v)
                    }
                };

                if topology.record_probe(&node_id, judgment, lag, seen_at).is_err() {
                    // Node was deregistered under us.
                    debug!(%observer, node = %node_id, "node gone, probe loop exiting");
                    break;
                }

                if let Some(verdict) = verdict {
                    let _ = obs_tx.send(Observation {
                        observer: observer.clone(),
                        node: node_id.clone(),
                        verdict,
                        at: now,
                    });
                }
            }
            _ = shutdown.changed() => {
                debug!(%observer, node = %node_id, "probe loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use steward_topology::{NodeRole, NodeSpec};

    /// Replays a scripted sequence of outcomes, then repeats the last.
    struct ScriptedProber {
        script: Mutex<VecDeque<ProbeOutcome>>,
        last: Mutex<ProbeOutcome>,
    }

    impl ScriptedProber {
        fn new(outcomes: Vec<ProbeOutcome>) -> Self {
            let last = outcomes.last().cloned().unwrap_or(ProbeOutcome::Unreachable);
            Self {
                script: Mutex::new(outcomes.into()),
                last: Mutex::new(last),
            }
        }
    }

    #[async_trait]
    impl StatusProber for ScriptedProber {
        async fn probe(&self, _address: &str, _timeout: Duration) -> ProbeOutcome {
            let mut script = self.script.lock().expect("script lock");
            match script.pop_front() {
                Some(outcome) => outcome,
                None => self.last.lock().expect("last lock").clone(),
            }
        }
    }

    fn test_settings(observers: u32) -> ProbeSettings {
        ProbeSettings {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(5),
            suspect_threshold: 3,
            observers,
        }
    }

    fn seeded_topology() -> Arc<TopologyStore> {
        let topology = Arc::new(TopologyStore::new());
        topology
            .register(&NodeSpec {
                id: "pg-0".to_string(),
                address: "pg-0.db.local:5432".to_string(),
                role: NodeRole::Primary,
            })
            .unwrap();
        topology
    }

    #[tokio::test]
    async fn runner_starts_and_stops() {
        let topology = seeded_topology();
        let (tx, _rx) = mpsc::unbounded_channel();
        let prober = Arc::new(ScriptedProber::new(vec![ProbeOutcome::Unreachable]));
        let runner = ProbeRunner::new(topology, prober, tx, test_settings(2));

        assert!(runner.active_nodes().await.is_empty());

        runner.start("pg-0", "pg-0.db.local:5432").await;
        assert!(runner.is_probing("pg-0").await);

        runner.stop("pg-0").await;
        assert!(!runner.is_probing("pg-0").await);
    }

    #[tokio::test]
    async fn runner_stop_all() {
        let topology = seeded_topology();
        let (tx, _rx) = mpsc::unbounded_channel();
        let prober = Arc::new(ScriptedProber::new(vec![ProbeOutcome::Unreachable]));
        let runner = ProbeRunner::new(topology, prober, tx, test_settings(1));

        runner.start("pg-0", "pg-0.db.local:5432").await;
        runner.start("pg-1", "pg-1.db.local:5432").await;
        assert_eq!(runner.active_nodes().await.len(), 2);

        runner.stop_all().await;
        assert!(runner.active_nodes().await.is_empty());
    }

    #[tokio::test]
    async fn successful_probe_updates_topology_and_emits_up() {
        let topology = seeded_topology();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let prober = Arc::new(ScriptedProber::new(vec![ProbeOutcome::Up {
            lag_secs: Some(0.25),
        }]));
        let runner = ProbeRunner::new(topology.clone(), prober, tx, test_settings(1));

        runner.start("pg-0", "pg-0.db.local:5432").await;

        let obs = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("observation within deadline")
            .expect("channel open");
        assert_eq!(obs.node, "pg-0");
        assert_eq!(obs.verdict, Verdict::Up);
        assert_eq!(obs.observer, "observer-0");

        let node = topology.node("pg-0").unwrap();
        assert_eq!(node.health, HealthState::Healthy);
        assert_eq!(node.lag_secs, Some(0.25));
        assert!(node.last_seen > 0);

        runner.stop_all().await;
    }

    #[tokio::test]
    async fn down_observation_only_after_threshold() {
        let topology = seeded_topology();
        let (tx, mut rx) = mpsc::unbounded_channel();
        // Never reachable: judgments run Suspect, Suspect, Down, Down...
        let prober = Arc::new(ScriptedProber::new(vec![ProbeOutcome::Unreachable]));
        let runner = ProbeRunner::new(topology.clone(), prober, tx, test_settings(1));

        runner.start("pg-0", "pg-0.db.local:5432").await;

        // First observation on this channel must already be a Down verdict:
        // the two Suspect probes emit nothing.
        let obs = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("observation within deadline")
            .expect("channel open");
        assert_eq!(obs.verdict, Verdict::Down);

        let node = topology.node("pg-0").unwrap();
        assert_eq!(node.health, HealthState::Down);
        // Failed probes never advance last-seen.
        assert_eq!(node.last_seen, 0);

        runner.stop_all().await;
    }

    #[tokio::test]
    async fn probe_loop_exits_when_node_deregistered() {
        let topology = seeded_topology();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let prober = Arc::new(ScriptedProber::new(vec![ProbeOutcome::Up {
            lag_secs: None,
        }]));
        let runner = ProbeRunner::new(topology.clone(), prober, tx, test_settings(1));

        runner.start("pg-0", "pg-0.db.local:5432").await;
        // Wait for the first observation, then pull the node out.
        let _ = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        topology.deregister("pg-0");

        // The loop notices on its next cycle and stops sending.
        tokio::time::sleep(Duration::from_millis(50)).await;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        runner.stop_all().await;
    }

    #[tokio::test]
    async fn one_task_per_observer() {
        let topology = seeded_topology();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let prober = Arc::new(ScriptedProber::new(vec![ProbeOutcome::Up {
            lag_secs: Some(0.0),
        }]));
        let runner = ProbeRunner::new(topology, prober, tx, test_settings(3));

        runner.start("pg-0", "pg-0.db.local:5432").await;

        // All three observers report within a few cycles.
        let mut seen = std::collections::HashSet::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while seen.len() < 3 && tokio::time::Instant::now() < deadline {
            if let Ok(Some(obs)) =
                tokio::time::timeout(Duration::from_millis(100), rx.recv()).await
            {
                seen.insert(obs.observer);
            }
        }
        assert_eq!(seen.len(), 3);

        runner.stop_all().await;
    }
}
