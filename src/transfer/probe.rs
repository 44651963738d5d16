//! Metadata probes against the dataset host

use async_trait::async_trait;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH};
use std::time::Duration;

/// Determines whether a remote endpoint honors byte ranges
#[async_trait]
pub trait RangeProbe: Send + Sync {
    /// True only when the server advertises `Accept-Ranges: bytes`
    ///
    /// Never fails: anything unexpected means "no".
    async fn supports_resume(&self, url: &str) -> bool;
}

/// Determines the size of a remote file before downloading it
#[async_trait]
pub trait RemoteSizeProbe: Send + Sync {
    /// Size in bytes, or 0 when it cannot be determined
    async fn size_of(&self, url: &str) -> u64;
}

/// HEAD-request based implementation of both probes
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    /// Create a probe sharing `client`, bounding each request by `timeout`
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn head(&self, url: &str) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .head(url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()
    }
}

#[async_trait]
impl RangeProbe for HttpProbe {
    async fn supports_resume(&self, url: &str) -> bool {
        match self.head(url).await {
            Ok(response) => response
                .headers()
                .get(ACCEPT_RANGES)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("bytes")),
            Err(e) => {
                tracing::warn!(url, error = %e, "Could not determine range support");
                false
            }
        }
    }
}

#[async_trait]
impl RemoteSizeProbe for HttpProbe {
    async fn size_of(&self, url: &str) -> u64 {
        // The header is read directly: HEAD responses carry no body to size
        match self.head(url).await {
            Ok(response) => header_u64(response.headers(), CONTENT_LENGTH).unwrap_or(0),
            Err(e) => {
                tracing::warn!(url, error = %e, "Could not determine remote file size");
                0
            }
        }
    }
}

/// Parse a numeric header value
pub(crate) fn header_u64(
    headers: &reqwest::header::HeaderMap,
    name: reqwest::header::HeaderName,
) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}
