//! Admin API handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::info;

use steward_promote::PromoteError;
use steward_topology::{MetricSample, Node, NodeId};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Serialized topology view.
#[derive(serde::Serialize)]
pub struct TopologyView {
    pub nodes: Vec<Node>,
    pub primary: Option<NodeId>,
    pub promotion_in_flight: bool,
    pub remediation_halted: bool,
}

/// GET /api/v1/topology
pub async fn get_topology(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.topology.snapshot();
    ApiResponse::ok(TopologyView {
        nodes: snapshot.nodes,
        primary: snapshot.primary,
        promotion_in_flight: snapshot.promotion_in_flight,
        remediation_halted: state.coordinator.is_halted(),
    })
}

/// GET /api/v1/endpoints
pub async fn get_endpoints(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.router.current())
}

/// Forced failover request body.
#[derive(serde::Deserialize, Default)]
pub struct FailoverRequest {
    /// Replica to promote; omitted selects the best candidate.
    pub target: Option<NodeId>,
}

/// Forced failover response.
#[derive(serde::Serialize)]
pub struct FailoverResponse {
    pub new_primary: NodeId,
}

/// POST /api/v1/failover
pub async fn force_failover(
    State(state): State<ApiState>,
    Json(req): Json<FailoverRequest>,
) -> impl IntoResponse {
    info!(target = req.target.as_deref().unwrap_or("auto"), "forced failover via api");

    match state.coordinator.force_failover(req.target).await {
        Ok(new_primary) => ApiResponse::ok(FailoverResponse { new_primary }).into_response(),
        Err(e @ PromoteError::InFlight) => {
            error_response(&e.to_string(), StatusCode::CONFLICT).into_response()
        }
        Err(e @ PromoteError::InvalidTarget(_)) => {
            error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response()
        }
        Err(e) => {
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

/// POST /api/v1/samples
pub async fn push_sample(
    State(state): State<ApiState>,
    Json(sample): Json<MetricSample>,
) -> impl IntoResponse {
    state.aggregator.record(sample);
    StatusCode::ACCEPTED
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
