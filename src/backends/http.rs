//! HTTP Origin Adapter
//!
//! Downloads images from the external origin host with a plain GET.

use crate::domain::ports::{FetchedAsset, OriginFetcher};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use bytes::BytesMut;
use std::time::Duration;
use tracing::debug;

/// Default cap on a downloaded body
const DEFAULT_BODY_LIMIT: u64 = 10 * 1024 * 1024;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the origin HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Per-request timeout enforced by the HTTP client
    pub request_timeout_secs: u64,
    /// Connection establishment timeout
    pub connect_timeout_secs: u64,
    /// User-Agent header sent to the origin
    pub user_agent: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: format!("storefront-assets/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// =============================================================================
// HTTP Origin
// =============================================================================

/// Origin fetcher backed by reqwest
#[derive(Clone)]
pub struct HttpOrigin {
    http: reqwest::Client,
    request_timeout: Duration,
    body_limit: u64,
}

impl HttpOrigin {
    pub fn new(config: &OriginConfig) -> Result<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            request_timeout,
            body_limit: DEFAULT_BODY_LIMIT,
        })
    }

    /// Refuse bodies larger than `bytes`
    pub fn with_body_limit(mut self, bytes: u64) -> Self {
        self.body_limit = bytes;
        self
    }

    fn too_large(&self, url: &str, size: u64) -> Error {
        Error::Validation(format!(
            "{} is at least {} bytes, limit is {}",
            url, size, self.body_limit
        ))
    }

    fn map_error(&self, url: &str, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                operation: format!("GET {}", url),
                duration: self.request_timeout,
            }
        } else {
            Error::network(url, e)
        }
    }
}

#[async_trait]
impl OriginFetcher for HttpOrigin {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset> {
        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::network(url, format!("HTTP {}", status)));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if let Some(length) = response.content_length() {
            if length > self.body_limit {
                return Err(self.too_large(url, length));
            }
        }

        // Content-Length can be missing; cap the streamed body as well
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_error(url, e))? {
            let size = (body.len() + chunk.len()) as u64;
            if size > self.body_limit {
                return Err(self.too_large(url, size));
            }
            body.extend_from_slice(&chunk);
        }
        let bytes = body.freeze();

        debug!(url = %url, size = bytes.len(), content_type = ?content_type, "Fetched origin asset");
        Ok(FetchedAsset {
            bytes,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and return its URL
    async fn serve_once(head: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}/img.jpg", addr)
    }

    fn origin(limit: u64) -> HttpOrigin {
        HttpOrigin::new(&OriginConfig::default())
            .unwrap()
            .with_body_limit(limit)
    }

    #[tokio::test]
    async fn test_fetch_within_limit() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: 8\r\nConnection: close\r\n\r\n",
            vec![7u8; 8],
        )
        .await;

        let asset = origin(8).fetch(&url).await.unwrap();
        assert_eq!(asset.bytes.len(), 8);
        assert_eq!(asset.content_type.as_deref(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn test_declared_oversized_body_is_rejected() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 64\r\nConnection: close\r\n\r\n",
            vec![0u8; 64],
        )
        .await;

        assert_matches!(origin(16).fetch(&url).await, Err(Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_undeclared_oversized_body_is_rejected() {
        // No Content-Length: the body runs until the connection closes
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n",
            vec![0u8; 64],
        )
        .await;

        assert_matches!(origin(16).fetch(&url).await, Err(Error::Validation(_)));
    }

    #[test]
    fn test_client_builds_from_default_config() {
        let config = OriginConfig::default();
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.user_agent.starts_with("storefront-assets/"));
        assert!(HttpOrigin::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_origin_is_network_error() {
        let origin = HttpOrigin::new(&OriginConfig {
            request_timeout_secs: 2,
            connect_timeout_secs: 1,
            ..Default::default()
        })
        .unwrap();

        // Nothing listens on port 9 of the loopback interface
        let result = origin.fetch("http://127.0.0.1:9/missing.jpg").await;
        assert_matches!(result, Err(Error::Network { .. }) | Err(Error::Timeout { .. }));
        assert!(result.unwrap_err().is_transient());
    }
}
