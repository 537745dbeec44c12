//! Admin API regression tests.
//!
//! Drives the assembled axum router end to end: topology inspection,
//! endpoint mappings, telemetry ingestion, and forced failover.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use common::{seeded_topology, RecordingBackend};
use steward_api::{build_router, ApiState};
use steward_metrics::{AggregationMode, MetricAggregator};
use steward_promote::PromotionCoordinator;
use steward_router::EndpointRouter;

fn test_state() -> ApiState {
    let topology = seeded_topology(&[("pg-1", 0.0), ("pg-2", 5.0)]);
    let router = Arc::new(EndpointRouter::new());
    router.republish(&topology.snapshot());

    let coordinator = Arc::new(PromotionCoordinator::new(
        topology.clone(),
        Arc::new(RecordingBackend::new()),
        router.clone(),
        Duration::from_millis(100),
    ));
    let aggregator = Arc::new(MetricAggregator::new(
        Duration::from_secs(300),
        AggregationMode::Average,
    ));

    ApiState {
        topology,
        router,
        coordinator,
        aggregator,
    }
}

#[tokio::test]
async fn api_healthz() {
    let router = build_router(test_state());

    let req = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn api_topology_snapshot() {
    let router = build_router(test_state());

    let req = Request::builder()
        .uri("/api/v1/topology")
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["primary"], "pg-0");
    assert_eq!(json["data"]["nodes"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn api_endpoints_mapping() {
    let router = build_router(test_state());

    let req = Request::builder()
        .uri("/api/v1/endpoints")
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["data"]["generation"], 1);
    assert_eq!(json["data"]["write"], "pg-0.db.local:5432");
}

#[tokio::test]
async fn api_forced_failover_to_target() {
    let state = test_state();
    let router = build_router(state.clone());

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/failover")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"target":"pg-2"}"#))
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(state.topology.primary_id(), Some("pg-2".to_string()));

    // The failover bumped the published generation.
    assert_eq!(state.router.current().generation, 2);
}

#[tokio::test]
async fn api_forced_failover_auto_selects_least_lagged() {
    let state = test_state();
    let router = build_router(state.clone());

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/failover")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(state.topology.primary_id(), Some("pg-1".to_string()));
}

#[tokio::test]
async fn api_forced_failover_unknown_target_rejected() {
    let state = test_state();
    let router = build_router(state.clone());

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/failover")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"target":"pg-9"}"#))
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    // The old primary keeps its role.
    assert_eq!(state.topology.primary_id(), Some("pg-0".to_string()));
}

#[tokio::test]
async fn api_sample_ingestion_feeds_aggregator() {
    let state = test_state();
    let router = build_router(state.clone());

    let now = steward_core::epoch_secs();
    let body = format!(
        r#"{{"node_id":"pg-1","cpu_pct":55.0,"mem_pct":40.0,"lag_secs":0.2,"at":{now}}}"#
    );
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/samples")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let agg = state
        .aggregator
        .aggregate(&["pg-1".to_string()], now)
        .expect("sample landed");
    assert_eq!(agg.cpu_pct, 55.0);
}

#[tokio::test]
async fn api_unknown_route_is_404() {
    let router = build_router(test_state());

    let req = Request::builder()
        .uri("/api/v1/nope")
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
