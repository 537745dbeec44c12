//! Status probe against a node's HTTP status endpoint.
//!
//! Store nodes expose `GET /status` returning a small JSON document with
//! their current role and replication lag. The probe embeds an explicit
//! timeout; connection errors, timeouts, and malformed bodies all fold
//! into `ProbeOutcome::Unreachable` so a flaky path is absorbed here and
//! never escalated on its own.

use std::time::Duration;

use async_trait::async_trait;
use http_body_util::BodyExt;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// The status endpoint answered; lag is absent for primaries.
    Up { lag_secs: Option<f64> },
    /// Connect error, timeout, non-2xx, or malformed body.
    Unreachable,
}

/// Transient probe failures. Absorbed at this layer: the caller only
/// sees `ProbeOutcome::Unreachable`.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("probe timed out")]
    Timeout,

    #[error("http error: {0}")]
    Http(String),

    #[error("status endpoint returned {0}")]
    BadStatus(u16),

    #[error("malformed status body: {0}")]
    Malformed(String),
}

/// Performs a single liveness/lag probe against a node address.
#[async_trait]
pub trait StatusProber: Send + Sync {
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeOutcome;
}

/// Body of a node's `/status` response.
#[derive(Debug, Deserialize)]
struct StatusBody {
    #[allow(dead_code)]
    role: Option<String>,
    lag_seconds: Option<f64>,
}

/// Probes nodes over plain HTTP/1.
pub struct HttpStatusProber;

#[async_trait]
impl StatusProber for HttpStatusProber {
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeOutcome {
        match try_probe(address, timeout).await {
            Ok(body) => ProbeOutcome::Up {
                lag_secs: body.lag_seconds,
            },
            Err(e) => {
                debug!(%address, error = %e, "probe unreachable");
                ProbeOutcome::Unreachable
            }
        }
    }
}

async fn try_probe(address: &str, timeout: Duration) -> Result<StatusBody, ProbeError> {
    let uri = format!("http://{address}/status");

    let fut = async {
        let stream = tokio::net::TcpStream::connect(address)
            .await
            .map_err(|e| ProbeError::Connect(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProbeError::Http(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", address)
            .header("user-agent", "steward-probe/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| ProbeError::Http(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ProbeError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ProbeError::BadStatus(resp.status().as_u16()));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ProbeError::Http(e.to_string()))?
            .to_bytes();

        serde_json::from_slice(&body).map_err(|e| ProbeError::Malformed(e.to_string()))
    };

    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout),
    }
}
