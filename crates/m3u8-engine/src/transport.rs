// Transport: the narrow network contract the pipeline depends on.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use tracing::trace;

use crate::DownloadError;
use crate::config::DownloaderConfig;

/// Largest body buffer reserved up front from a `Content-Length` header.
const MAX_PREALLOCATION: u64 = 64 << 20;

/// Buffer size to reserve for a body announced as `content_length` bytes.
fn initial_capacity(content_length: Option<u64>) -> usize {
    content_length.unwrap_or(0).min(MAX_PREALLOCATION) as usize
}

/// Status and full body of one GET request.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Blocking-style `url -> (status, body)` fetch.
///
/// Request timeouts and headers are the implementation's business; callers
/// only look at the status and the body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchResponse, DownloadError>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &DownloaderConfig) -> Result<Self, DownloadError> {
        Ok(Self::new(config.build_client()?))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<FetchResponse, DownloadError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let capacity = initial_capacity(response.content_length());

        // Read the body in chunks so a truncated transfer surfaces as an error
        // instead of a short body where possible.
        let mut buffer = BytesMut::with_capacity(capacity);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }

        trace!(url, status = %status, bytes = buffer.len(), "GET finished");

        Ok(FetchResponse {
            status,
            body: buffer.freeze(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preallocation_ignores_oversized_content_length() {
        assert_eq!(initial_capacity(None), 0);
        assert_eq!(initial_capacity(Some(1_024)), 1_024);
        assert_eq!(
            initial_capacity(Some(1_000_000_000_000)),
            MAX_PREALLOCATION as usize
        );
    }
}
