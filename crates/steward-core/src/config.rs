//! steward.toml configuration parser.
//!
//! Every section is optional in the file; missing fields fall back to the
//! defaults documented on each struct. Durations are human-readable
//! strings ("2s", "500ms", "5m") resolved through typed accessors so the
//! parse happens once, at the call site that owns the loop.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::parse_duration_or;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StewardConfig {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub quorum: QuorumConfig,
    #[serde(default)]
    pub promotion: PromotionConfig,
    #[serde(default)]
    pub autoscale: AutoscaleConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Health probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Probe interval per node (e.g., "2s").
    #[serde(default = "default_probe_interval")]
    pub interval: String,
    /// Per-probe timeout; must be shorter than the interval.
    #[serde(default = "default_probe_timeout")]
    pub timeout: String,
    /// Consecutive unreachable probes before the local judgment is Down.
    #[serde(default = "default_suspect_threshold")]
    pub suspect_threshold: u32,
    /// Number of independent observer identities probing each node.
    #[serde(default = "default_observers")]
    pub observers: u32,
}

impl ProbeConfig {
    pub fn interval(&self) -> Duration {
        parse_duration_or(&self.interval, Duration::from_secs(2))
    }

    pub fn timeout(&self) -> Duration {
        parse_duration_or(&self.timeout, Duration::from_secs(1))
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: default_probe_interval(),
            timeout: default_probe_timeout(),
            suspect_threshold: default_suspect_threshold(),
            observers: default_observers(),
        }
    }
}

/// Metric aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Sliding sample window (e.g., "5m").
    #[serde(default = "default_metrics_window")]
    pub window: String,
    /// Aggregation mode: "average" or "p90". Scale decisions are
    /// sensitive to this choice, so it is always explicit.
    #[serde(default = "default_metrics_mode")]
    pub mode: String,
}

impl MetricsConfig {
    pub fn window(&self) -> Duration {
        parse_duration_or(&self.window, Duration::from_secs(300))
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window: default_metrics_window(),
            mode: default_metrics_mode(),
        }
    }
}

/// Quorum failure detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumConfig {
    /// Agreement window for collecting down verdicts (e.g., "10s").
    #[serde(default = "default_agreement_window")]
    pub agreement_window: String,
}

impl QuorumConfig {
    pub fn agreement_window(&self) -> Duration {
        parse_duration_or(&self.agreement_window, Duration::from_secs(10))
    }
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            agreement_window: default_agreement_window(),
        }
    }
}

/// Promotion coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionConfig {
    /// How long a candidate has to report the primary role (e.g., "30s").
    #[serde(default = "default_promote_timeout")]
    pub promote_timeout: String,
}

impl PromotionConfig {
    pub fn promote_timeout(&self) -> Duration {
        parse_duration_or(&self.promote_timeout, Duration::from_secs(30))
    }
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            promote_timeout: default_promote_timeout(),
        }
    }
}

/// Autoscale control loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscaleConfig {
    /// Evaluation tick (e.g., "30s").
    #[serde(default = "default_autoscale_tick")]
    pub tick: String,
    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,
    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,
    /// CPU utilization target, percent.
    #[serde(default = "default_target_cpu")]
    pub target_cpu_pct: f64,
    /// Memory utilization target, percent.
    #[serde(default = "default_target_mem")]
    pub target_mem_pct: f64,
    /// A lower desired count must persist this long before scale-down.
    #[serde(default = "default_stabilization")]
    pub stabilization: String,
    /// Replicas removed per tick at most.
    #[serde(default = "default_max_step_down")]
    pub max_step_down: u32,
}

impl AutoscaleConfig {
    pub fn tick(&self) -> Duration {
        parse_duration_or(&self.tick, Duration::from_secs(30))
    }

    pub fn stabilization(&self) -> Duration {
        parse_duration_or(&self.stabilization, Duration::from_secs(300))
    }
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            tick: default_autoscale_tick(),
            min_replicas: default_min_replicas(),
            max_replicas: default_max_replicas(),
            target_cpu_pct: default_target_cpu(),
            target_mem_pct: default_target_mem(),
            stabilization: default_stabilization(),
            max_step_down: default_max_step_down(),
        }
    }
}

/// Admin API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

/// Cluster backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the orchestration collaborator.
    #[serde(default = "default_orchestrator_url")]
    pub orchestrator_url: String,
    /// Timeout for backend commands (e.g., "5s").
    #[serde(default = "default_backend_timeout")]
    pub timeout: String,
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        parse_duration_or(&self.timeout, Duration::from_secs(5))
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            orchestrator_url: default_orchestrator_url(),
            timeout: default_backend_timeout(),
        }
    }
}

impl StewardConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: StewardConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

fn default_probe_interval() -> String {
    "2s".to_string()
}
fn default_probe_timeout() -> String {
    "1s".to_string()
}
fn default_suspect_threshold() -> u32 {
    3
}
fn default_observers() -> u32 {
    3
}
fn default_metrics_window() -> String {
    "5m".to_string()
}
fn default_metrics_mode() -> String {
    "average".to_string()
}
fn default_agreement_window() -> String {
    "10s".to_string()
}
fn default_promote_timeout() -> String {
    "30s".to_string()
}
fn default_autoscale_tick() -> String {
    "30s".to_string()
}
fn default_min_replicas() -> u32 {
    1
}
fn default_max_replicas() -> u32 {
    10
}
fn default_target_cpu() -> f64 {
    70.0
}
fn default_target_mem() -> f64 {
    80.0
}
fn default_stabilization() -> String {
    "5m".to_string()
}
fn default_max_step_down() -> u32 {
    1
}
fn default_api_port() -> u16 {
    7400
}
fn default_orchestrator_url() -> String {
    "http://127.0.0.1:7500".to_string()
}
fn default_backend_timeout() -> String {
    "5s".to_string()
}
