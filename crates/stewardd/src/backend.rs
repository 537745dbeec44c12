//! HTTP cluster backend — drives the orchestration collaborator.
//!
//! Every command is a small JSON-over-HTTP call with an explicit
//! timeout, kept shorter than the tick interval of whichever loop
//! issues it. The orchestrator owns the slow parts (provisioning,
//! write-capability revocation, role changes); the controller only
//! waits for acknowledgement.

use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use http_body_util::BodyExt;
use tracing::debug;

use steward_topology::{ClusterBackend, NodeId, NodeSpec};

/// Cluster backend over the orchestrator's REST interface.
pub struct HttpClusterBackend {
    base_url: String,
    timeout: Duration,
}

impl HttpClusterBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, timeout }
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Vec<u8>>,
        timeout: Duration,
    ) -> anyhow::Result<bytes::Bytes> {
        let url = format!("{}{path}", self.base_url);
        let (address, uri_path) = split_url(&url)?;

        let fut = async {
            let stream = tokio::net::TcpStream::connect(&address)
                .await
                .with_context(|| format!("connect to {address}"))?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .context("http handshake")?;

            tokio::spawn(async move {
                let _ = conn.await;
            });

            let mut builder = http::Request::builder()
                .method(method)
                .uri(&uri_path)
                .header("host", &address)
                .header("user-agent", "stewardd/0.1");
            if body.is_some() {
                builder = builder.header("content-type", "application/json");
            }
            let req = builder
                .body(http_body_util::Full::new(bytes::Bytes::from(
                    body.unwrap_or_default(),
                )))
                .context("build request")?;

            let resp = sender.send_request(req).await.context("send request")?;
            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .context("read response body")?
                .to_bytes();

            if !status.is_success() {
                return Err(anyhow!(
                    "{method} {url} returned {status}: {}",
                    String::from_utf8_lossy(&bytes)
                ));
            }
            debug!(%method, %url, status = status.as_u16(), "backend command ok");
            Ok(bytes)
        };

        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| anyhow!("{method} {url} timed out"))?
    }
}

/// Split "http://host:port/path" into (host:port, /path).
fn split_url(url: &str) -> anyhow::Result<(String, String)> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| anyhow!("unsupported url: {url}"))?;
    match rest.split_once('/') {
        Some((authority, path)) => Ok((authority.to_string(), format!("/{path}"))),
        None => Ok((rest.to_string(), "/".to_string())),
    }
}

#[async_trait]
impl ClusterBackend for HttpClusterBackend {
    async fn list_nodes(&self) -> anyhow::Result<Vec<NodeSpec>> {
        let body = self.request("GET", "/nodes", None, self.timeout).await?;
        serde_json::from_slice(&body).context("parse node list")
    }

    async fn register_node(&self, spec: &NodeSpec) -> anyhow::Result<()> {
        let body = serde_json::to_vec(spec)?;
        self.request("POST", "/nodes", Some(body), self.timeout)
            .await?;
        Ok(())
    }

    async fn deregister_node(&self, id: &NodeId) -> anyhow::Result<()> {
        self.request("DELETE", &format!("/nodes/{id}"), None, self.timeout)
            .await?;
        Ok(())
    }

    async fn fence(&self, id: &NodeId) -> anyhow::Result<()> {
        self.request("POST", &format!("/nodes/{id}/fence"), None, self.timeout)
            .await?;
        Ok(())
    }

    async fn promote(&self, id: &NodeId) -> anyhow::Result<()> {
        // The promotion coordinator bounds this wait with its own
        // timeout; give the orchestrator the full window to confirm the
        // role change rather than the short command timeout.
        self.request(
            "POST",
            &format!("/nodes/{id}/promote"),
            None,
            Duration::from_secs(3600),
        )
        .await?;
        Ok(())
    }

    async fn set_replica_count(&self, count: u32) -> anyhow::Result<()> {
        let body = serde_json::to_vec(&serde_json::json!({ "count": count }))?;
        self.request("PUT", "/replicas", Some(body), self.timeout)
            .await?;
        Ok(())
    }
}
