//! stewardd — the Steward daemon.
//!
//! Single binary that assembles the HA controller:
//! - Topology store seeded from the cluster backend
//! - Probe runner (one task per observer per node)
//! - Quorum failure detector
//! - Promotion coordinator
//! - Endpoint router + change publisher
//! - Metric aggregator + autoscaler
//! - Admin API
//!
//! # Usage
//!
//! ```text
//! stewardd run --config steward.toml
//! ```

mod backend;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use steward_autoscale::{Autoscaler, ScalePolicy};
use steward_core::StewardConfig;
use steward_metrics::{AggregationMode, MetricAggregator};
use steward_probe::{HttpStatusProber, ProbeRunner, ProbeSettings};
use steward_promote::PromotionCoordinator;
use steward_quorum::QuorumDetector;
use steward_router::EndpointRouter;
use steward_topology::{ClusterBackend, NodeId, TopologyStore};

use backend::HttpClusterBackend;

#[derive(Parser)]
#[command(name = "stewardd", about = "Steward HA controller daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller.
    Run {
        /// Path to steward.toml.
        #[arg(long, default_value = "steward.toml")]
        config: PathBuf,

        /// Override the admin API port.
        #[arg(long)]
        api_port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,stewardd=debug,steward=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, api_port } => run(config, api_port).await,
    }
}

async fn run(config_path: PathBuf, api_port: Option<u16>) -> anyhow::Result<()> {
    info!(path = ?config_path, "steward controller starting");

    let config = if config_path.exists() {
        StewardConfig::from_file(&config_path)?
    } else {
        warn!(path = ?config_path, "config file not found, using defaults");
        StewardConfig::default()
    };
    let port = api_port.unwrap_or(config.api.port);

    // ── Initialize subsystems ──────────────────────────────────

    let topology = Arc::new(TopologyStore::new());
    let backend: Arc<dyn ClusterBackend> = Arc::new(HttpClusterBackend::new(
        config.backend.orchestrator_url.clone(),
        config.backend.timeout(),
    ));
    let router = Arc::new(EndpointRouter::new());
    let aggregator = Arc::new(MetricAggregator::new(
        config.metrics.window(),
        AggregationMode::from_config(&config.metrics.mode),
    ));

    // Seed the topology from the collaborator's node list.
    let specs = backend.list_nodes().await?;
    info!(nodes = specs.len(), "topology seeded from cluster backend");
    for spec in &specs {
        topology.register(spec)?;
    }
    router.republish(&topology.snapshot());

    // ── Wire the failover pipeline ─────────────────────────────

    let (obs_tx, obs_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let probe_runner = Arc::new(ProbeRunner::new(
        topology.clone(),
        Arc::new(HttpStatusProber),
        obs_tx,
        ProbeSettings {
            interval: config.probe.interval(),
            timeout: config.probe.timeout(),
            suspect_threshold: config.probe.suspect_threshold,
            observers: config.probe.observers,
        },
    ));
    for spec in &specs {
        probe_runner.start(&spec.id, &spec.address).await;
    }

    let detector = QuorumDetector::new(
        topology.clone(),
        config.probe.observers,
        config.quorum.agreement_window(),
    );
    let detector_handle = tokio::spawn(detector.run(obs_rx, event_tx, shutdown_rx.clone()));

    let coordinator = Arc::new(PromotionCoordinator::new(
        topology.clone(),
        backend.clone(),
        router.clone(),
        config.promotion.promote_timeout(),
    ));
    let coordinator_handle =
        tokio::spawn(coordinator.clone().run(event_rx, shutdown_rx.clone()));

    // Publish routing changes picked up from probe health transitions.
    let publisher_handle = tokio::spawn(publish_changes(
        topology.clone(),
        router.clone(),
        config.probe.interval(),
        shutdown_rx.clone(),
    ));

    // Enroll nodes the collaborator adds or removes after startup.
    let reconcile_handle = tokio::spawn(reconcile_nodes(
        topology.clone(),
        backend.clone(),
        probe_runner.clone(),
        aggregator.clone(),
        config.autoscale.tick(),
        shutdown_rx.clone(),
    ));

    // ── Autoscaler ─────────────────────────────────────────────

    let mut autoscaler = Autoscaler::new(
        topology.clone(),
        aggregator.clone(),
        backend.clone(),
        ScalePolicy {
            min_replicas: config.autoscale.min_replicas,
            max_replicas: config.autoscale.max_replicas,
            target_cpu_pct: config.autoscale.target_cpu_pct,
            target_mem_pct: config.autoscale.target_mem_pct,
            stabilization: config.autoscale.stabilization(),
            max_step_down: config.autoscale.max_step_down,
        },
    );
    let autoscale_tick = config.autoscale.tick();
    let autoscale_shutdown = shutdown_rx.clone();
    let autoscale_handle = tokio::spawn(async move {
        autoscaler.run(autoscale_tick, autoscale_shutdown).await;
    });

    // ── Admin API ──────────────────────────────────────────────

    let api = steward_api::build_router(steward_api::ApiState {
        topology: topology.clone(),
        router: router.clone(),
        coordinator: coordinator.clone(),
        aggregator: aggregator.clone(),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "admin api starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let probe_runner_shutdown = probe_runner.clone();
    let server = axum::serve(listener, api).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
        probe_runner_shutdown.stop_all().await;
    });

    server.await?;

    let _ = detector_handle.await;
    let _ = coordinator_handle.await;
    let _ = publisher_handle.await;
    let _ = reconcile_handle.await;
    let _ = autoscale_handle.await;

    info!("steward controller stopped");
    Ok(())
}

/// Republish the endpoint mapping whenever the topology routes change.
///
/// Failover publishes immediately from the coordinator; this loop picks
/// up the gradual changes (replica health transitions, registrations)
/// at probe cadence.
async fn publish_changes(
    topology: Arc<TopologyStore>,
    router: Arc<EndpointRouter>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                router.republish_if_changed(&topology.snapshot());
            }
            _ = shutdown.changed() => {
                break;
            }
        }
    }
}

/// Converge the enrolled node set with the collaborator's node list.
///
/// Scaling decisions are applied by the collaborator, so new replicas
/// appear in (and removed ones vanish from) its list first. This loop
/// registers newcomers and starts probing them, and tears down the
/// probes and windows of nodes the collaborator has dropped.
async fn reconcile_nodes(
    topology: Arc<TopologyStore>,
    backend: Arc<dyn ClusterBackend>,
    probe_runner: Arc<ProbeRunner>,
    aggregator: Arc<MetricAggregator>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let specs = match backend.list_nodes().await {
                    Ok(specs) => specs,
                    Err(e) => {
                        warn!(error = %e, "node list unavailable, reconcile skipped");
                        continue;
                    }
                };

                for spec in &specs {
                    if topology.node(&spec.id).is_none() {
                        if let Err(e) = topology.register(spec) {
                            warn!(node = %spec.id, error = %e, "node registration failed");
                            continue;
                        }
                        probe_runner.start(&spec.id, &spec.address).await;
                    }
                }

                let listed: HashSet<NodeId> = specs.into_iter().map(|s| s.id).collect();
                for node in topology.snapshot().nodes {
                    if !listed.contains(&node.id) {
                        probe_runner.stop(&node.id).await;
                        topology.deregister(&node.id);
                        aggregator.forget(&node.id);
                    }
                }
            }
            _ = shutdown.changed() => {
                break;
            }
        }
    }
}
