//! Sliding-window metric aggregation.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::Duration;

use tracing::{debug, warn};

use steward_topology::{MetricSample, NodeId};

/// How sample values are smoothed into one number.
///
/// Scale decisions are sensitive to this choice, so it is always explicit
/// in configuration rather than defaulted silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    Average,
    P90,
}

impl AggregationMode {
    /// Parse the configured mode string; unknown values fall back to
    /// average with a warning.
    pub fn from_config(s: &str) -> Self {
        match s {
            "average" => AggregationMode::Average,
            "p90" => AggregationMode::P90,
            other => {
                warn!(mode = %other, "unknown aggregation mode, using average");
                AggregationMode::Average
            }
        }
    }

    fn apply(&self, values: &mut Vec<f64>) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            AggregationMode::Average => values.iter().sum::<f64>() / values.len() as f64,
            AggregationMode::P90 => {
                values.sort_by(|a, b| a.partial_cmp(b).expect("finite sample values"));
                let idx = (values.len() as f64 * 0.90) as usize;
                values[idx.min(values.len() - 1)]
            }
        }
    }
}

/// Smoothed load signals over the requested node set.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub max_lag_secs: f64,
    /// True when at least one requested node had no samples in the window.
    pub partial: bool,
    /// Nodes that contributed samples.
    pub nodes: u32,
}

/// Maintains sliding windows of raw samples per node.
pub struct MetricAggregator {
    window: Duration,
    mode: AggregationMode,
    samples: RwLock<HashMap<NodeId, VecDeque<MetricSample>>>,
}

impl MetricAggregator {
    pub fn new(window: Duration, mode: AggregationMode) -> Self {
        Self {
            window,
            mode,
            samples: RwLock::new(HashMap::new()),
        }
    }

    /// Ingest a pushed telemetry sample.
    pub fn record(&self, sample: MetricSample) {
        let cutoff = sample.at.saturating_sub(self.window.as_secs());
        let mut samples = self.samples.write().expect("samples lock");
        let queue = samples.entry(sample.node_id.clone()).or_default();
        queue.push_back(sample);
        while queue.front().is_some_and(|s| s.at < cutoff) {
            queue.pop_front();
        }
    }

    /// Drop a node's window entirely (on deregistration).
    pub fn forget(&self, node_id: &str) {
        let mut samples = self.samples.write().expect("samples lock");
        samples.remove(node_id);
    }

    /// Aggregate the requested nodes' windows as of `now`.
    ///
    /// Returns `None` when no requested node has any sample in the
    /// window — the caller skips its tick rather than scaling on nothing.
    pub fn aggregate(&self, node_ids: &[NodeId], now: u64) -> Option<Aggregate> {
        let cutoff = now.saturating_sub(self.window.as_secs());
        let samples = self.samples.read().expect("samples lock");

        let mut cpu = Vec::new();
        let mut mem = Vec::new();
        let mut max_lag: f64 = 0.0;
        let mut contributing = 0u32;
        let mut partial = false;

        for node_id in node_ids {
            let in_window: Vec<&MetricSample> = samples
                .get(node_id)
                .map(|q| q.iter().filter(|s| s.at >= cutoff).collect())
                .unwrap_or_default();

            if in_window.is_empty() {
                debug!(node = %node_id, "no samples in window, excluded from aggregate");
                partial = true;
                continue;
            }

            contributing += 1;
            for s in &in_window {
                cpu.push(s.cpu_pct);
                mem.push(s.mem_pct);
                if s.lag_secs > max_lag {
                    max_lag = s.lag_secs;
                }
            }
        }

        if contributing == 0 {
            return None;
        }

        Some(Aggregate {
            cpu_pct: self.mode.apply(&mut cpu),
            mem_pct: self.mode.apply(&mut mem),
            max_lag_secs: max_lag,
            partial,
            nodes: contributing,
        })
    }
}
