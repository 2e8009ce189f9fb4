//! HTTP client for the storage node (page server) management API.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use serde_json::{Value, json};
use strata_builder::dns;
use strata_core::Generation;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(String),
}

/// Operations the control plane drives on a storage node.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageNodeApi: Send + Sync {
    /// Attach `tenant_id` under `generation`.
    async fn attach_tenant(
        &self,
        node_id: &str,
        tenant_id: &str,
        generation: Generation,
    ) -> StorageResult<()>;

    async fn detach_tenant(&self, node_id: &str, tenant_id: &str) -> StorageResult<()>;

    /// Create a timeline. An existing timeline counts as success.
    async fn create_timeline(
        &self,
        node_id: &str,
        tenant_id: &str,
        timeline_id: &str,
        pg_version: u32,
    ) -> StorageResult<()>;

    /// Delete a timeline. A missing timeline counts as success.
    async fn delete_timeline(
        &self,
        node_id: &str,
        tenant_id: &str,
        timeline_id: &str,
    ) -> StorageResult<()>;
}

/// Talks HTTP/1.1 to `pageserver-{node}.pageserver.{namespace}`.
#[derive(Debug, Clone)]
pub struct HttpStorageNodeClient {
    namespace: String,
    port: u16,
    timeout: Duration,
}

impl HttpStorageNodeClient {
    pub fn new(namespace: &str, port: u16, timeout: Duration) -> Self {
        Self {
            namespace: namespace.to_string(),
            port,
            timeout,
        }
    }

    pub fn address(&self, node_id: &str) -> String {
        format!("{}:{}", dns::pageserver_host(node_id, &self.namespace), self.port)
    }

    async fn send(
        &self,
        node_id: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> StorageResult<(StatusCode, String)> {
        self.send_to(&self.address(node_id), method, path, body).await
    }

    /// Send one request to `address` (`host:port`) and return the status and body.
    async fn send_to(
        &self,
        address: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> StorageResult<(StatusCode, String)> {
        let uri = format!("http://{address}{path}");

        let result = tokio::time::timeout(self.timeout, async {
            let stream = tokio::net::TcpStream::connect(address)
                .await
                .map_err(|e| StorageError::Connect(e.to_string()))?;
            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| StorageError::Connect(e.to_string()))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let payload = body.map(|b| b.to_string()).unwrap_or_default();
            let req = http::Request::builder()
                .method(method.clone())
                .uri(&uri)
                .header("host", address)
                .header("content-type", "application/json")
                .header("user-agent", "strata-control-plane/0.1")
                .body(Full::new(Bytes::from(payload)))
                .map_err(|e| StorageError::Request(e.to_string()))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| StorageError::Request(e.to_string()))?;
            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| StorageError::Request(e.to_string()))?
                .to_bytes();
            Ok((status, String::from_utf8_lossy(&bytes).into_owned()))
        })
        .await;

        match result {
            Ok(Ok((status, body))) => {
                debug!(%method, %uri, %status, "storage node call");
                Ok((status, body))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(StorageError::Timeout(self.timeout)),
        }
    }
}

/// Tenant and timeline ids are opaque, so each one is a single escaped
/// path segment.
fn tenant_path(tenant_id: &str) -> String {
    format!("/v1/tenant/{}", urlencoding::encode(tenant_id))
}

fn timeline_path(tenant_id: &str, timeline_id: &str) -> String {
    format!(
        "{}/timeline/{}",
        tenant_path(tenant_id),
        urlencoding::encode(timeline_id)
    )
}

/// Map a response to success when its status is 2xx or one of `also_ok`.
fn expect_status(
    (status, body): (StatusCode, String),
    also_ok: &[StatusCode],
) -> StorageResult<()> {
    if status.is_success() || also_ok.contains(&status) {
        Ok(())
    } else {
        Err(StorageError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl StorageNodeApi for HttpStorageNodeClient {
    async fn attach_tenant(
        &self,
        node_id: &str,
        tenant_id: &str,
        generation: Generation,
    ) -> StorageResult<()> {
        let body = json!({
            "mode": "AttachedSingle",
            "generation": generation,
            "secondary_conf": null,
            "tenant_conf": {},
        });
        let path = format!("{}/location_config", tenant_path(tenant_id));
        expect_status(self.send(node_id, Method::PUT, &path, Some(body)).await?, &[])
    }

    async fn detach_tenant(&self, node_id: &str, tenant_id: &str) -> StorageResult<()> {
        let body = json!({
            "mode": "Detached",
            "generation": null,
            "secondary_conf": null,
            "tenant_conf": {},
        });
        let path = format!("{}/location_config", tenant_path(tenant_id));
        expect_status(
            self.send(node_id, Method::PUT, &path, Some(body)).await?,
            &[StatusCode::NOT_FOUND],
        )
    }

    async fn create_timeline(
        &self,
        node_id: &str,
        tenant_id: &str,
        timeline_id: &str,
        pg_version: u32,
    ) -> StorageResult<()> {
        let body = json!({
            "new_timeline_id": timeline_id,
            "pg_version": pg_version,
        });
        let path = format!("{}/timeline", tenant_path(tenant_id));
        expect_status(
            self.send(node_id, Method::POST, &path, Some(body)).await?,
            &[StatusCode::CONFLICT],
        )
    }

    async fn delete_timeline(
        &self,
        node_id: &str,
        tenant_id: &str,
        timeline_id: &str,
    ) -> StorageResult<()> {
        let path = timeline_path(tenant_id, timeline_id);
        expect_status(
            self.send(node_id, Method::DELETE, &path, None).await?,
            &[StatusCode::NOT_FOUND],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_uses_pod_dns() {
        let client = HttpStorageNodeClient::new("neon", 9898, Duration::from_secs(1));
        assert_eq!(
            client.address("0"),
            "pageserver-0.pageserver.neon.svc.cluster.local:9898"
        );
    }

    #[test]
    fn ids_are_escaped_into_single_segments() {
        assert_eq!(tenant_path("t1"), "/v1/tenant/t1");
        assert_eq!(
            timeline_path("a/b", "../c?d#e"),
            "/v1/tenant/a%2Fb/timeline/..%2Fc%3Fd%23e"
        );
        assert_eq!(
            format!("{}/location_config", tenant_path("x y")),
            "/v1/tenant/x%20y/location_config"
        );
    }

    #[test]
    fn tolerated_statuses_count_as_success() {
        let conflict = (StatusCode::CONFLICT, "exists".to_string());
        assert!(expect_status(conflict.clone(), &[StatusCode::CONFLICT]).is_ok());
        assert_eq!(
            expect_status(conflict, &[]),
            Err(StorageError::Status {
                status: 409,
                body: "exists".to_string()
            })
        );
        assert!(expect_status((StatusCode::CREATED, String::new()), &[]).is_ok());
    }

    #[tokio::test]
    async fn unreachable_node_is_an_error() {
        // Nothing resolves in the test environment; either a DNS failure or
        // the timeout is fine.
        let client = HttpStorageNodeClient::new("nowhere", 9898, Duration::from_millis(200));
        let err = client
            .create_timeline("0", "t1", "tl1", 16)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Connect(_) | StorageError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn talks_http_to_a_local_listener() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 409 Conflict\r\ncontent-length: 0\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        let client = HttpStorageNodeClient::new("neon", 9898, Duration::from_secs(2));
        let path = format!("{}/timeline", tenant_path("a/b"));
        let (status, _) = client
            .send_to(&address, Method::POST, &path, None)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CONFLICT);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/tenant/a%2Fb/timeline HTTP/1.1"), "{request}");
    }
}
