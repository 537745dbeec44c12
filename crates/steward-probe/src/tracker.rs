//! Suspect tracking for a single observer's view of one node.

use steward_topology::HealthState;
use tracing::{debug, warn};

use crate::prober::ProbeOutcome;

/// Tracks consecutive unreachable probes and escalates the local
/// judgment: one failure is Suspect, `threshold` consecutive failures
/// are Down. A single successful probe resets the streak.
#[derive(Debug)]
pub struct SuspectTracker {
    judgment: HealthState,
    streak: u32,
    threshold: u32,
}

impl SuspectTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            judgment: HealthState::Unknown,
            streak: 0,
            threshold: threshold.max(1),
        }
    }

    /// Record a probe outcome and return the new local judgment.
    pub fn record(&mut self, outcome: &ProbeOutcome) -> HealthState {
        match outcome {
            ProbeOutcome::Up { .. } => {
                if self.judgment != HealthState::Healthy && self.streak > 0 {
                    debug!(streak = self.streak, "node reachable again");
                }
                self.streak = 0;
                self.judgment = HealthState::Healthy;
            }
            ProbeOutcome::Unreachable => {
                self.streak += 1;
                if self.streak >= self.threshold {
                    if self.judgment != HealthState::Down {
                        warn!(
                            streak = self.streak,
                            threshold = self.threshold,
                            "local judgment escalated to down"
                        );
                    }
                    self.judgment = HealthState::Down;
                } else {
                    self.judgment = HealthState::Suspect;
                }
            }
        }
        self.judgment
    }

    pub fn judgment(&self) -> HealthState {
        self.judgment
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }
}
