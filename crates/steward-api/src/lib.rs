//! steward-api — admin REST API for the controller.
//!
//! Read-only inspection of the topology and endpoint mapping, telemetry
//! sample ingestion, and the operator-initiated forced failover.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/topology` | Topology snapshot |
//! | GET | `/api/v1/endpoints` | Current endpoint mapping |
//! | POST | `/api/v1/failover` | Forced failover (bypasses quorum) |
//! | POST | `/api/v1/samples` | Push a telemetry sample |
//! | GET | `/healthz` | Controller liveness |

pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use steward_metrics::MetricAggregator;
use steward_promote::PromotionCoordinator;
use steward_router::EndpointRouter;
use steward_topology::TopologyStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub topology: Arc<TopologyStore>,
    pub router: Arc<EndpointRouter>,
    pub coordinator: Arc<PromotionCoordinator>,
    pub aggregator: Arc<MetricAggregator>,
}

/// Build the admin API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/topology", get(handlers::get_topology))
        .route("/endpoints", get(handlers::get_endpoints))
        .route("/failover", post(handlers::force_failover))
        .route("/samples", post(handlers::push_sample))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
