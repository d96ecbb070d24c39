// HLS Segment Fetcher: downloads one segment and accepts it only once two
// consecutive attempts agree.

use crate::DownloadError;
use crate::hls::config::{HlsFetcherConfig, VerifyMode};
use crate::hls::playlist::SegmentDescriptor;
use crate::hls::retry::RetryPolicy;
use crate::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, instrument, trace};

#[async_trait]
pub trait SegmentDownloader: Send + Sync {
    async fn download_segment(&self, segment: &SegmentDescriptor) -> Result<Bytes, DownloadError>;
}

/// What is compared between consecutive attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fingerprint {
    Length(usize),
    Digest([u8; 32]),
}

impl Fingerprint {
    fn of(mode: VerifyMode, body: &[u8]) -> Self {
        match mode {
            VerifyMode::Length => Fingerprint::Length(body.len()),
            VerifyMode::Sha256 => {
                let mut digest = [0u8; 32];
                digest.copy_from_slice(&Sha256::digest(body));
                Fingerprint::Digest(digest)
            }
        }
    }
}

pub struct SegmentFetcher {
    transport: Arc<dyn Transport>,
    max_attempts: u32,
    verify_mode: VerifyMode,
    retry: RetryPolicy,
}

impl SegmentFetcher {
    pub fn new(transport: Arc<dyn Transport>, config: &HlsFetcherConfig) -> Self {
        Self {
            transport,
            max_attempts: config.max_segment_attempts,
            verify_mode: config.verify_mode,
            retry: config.segment_retry_policy(),
        }
    }

    /// Fetch once. Non-success statuses are turned into errors.
    async fn fetch_once(&self, url: &str) -> Result<Bytes, DownloadError> {
        let response = self.transport.get(url).await?;
        if response.is_success() {
            Ok(response.body)
        } else {
            Err(DownloadError::http_status(response.status, url, "segment fetch"))
        }
    }
}

#[async_trait]
impl SegmentDownloader for SegmentFetcher {
    /// Repeats the request until two consecutive successful attempts produce the
    /// same fingerprint, returning the earlier body of that pair.
    ///
    /// A failed attempt breaks the chain: the next success has nothing to be
    /// compared with. Failures back off; successful attempts are repeated at once.
    #[instrument(skip(self, segment), fields(name = %segment.name))]
    async fn download_segment(&self, segment: &SegmentDescriptor) -> Result<Bytes, DownloadError> {
        let mut previous: Option<(Fingerprint, Bytes)> = None;
        let mut last_error: Option<DownloadError> = None;
        let mut failures = 0u32;
        let mut attempts = 0u32;

        while attempts < self.max_attempts {
            attempts += 1;
            match self.fetch_once(&segment.uri).await {
                Ok(body) => {
                    trace!(attempt = attempts, size = body.len(), "Segment attempt finished");
                    let fingerprint = Fingerprint::of(self.verify_mode, &body);
                    if let Some((prev_fingerprint, prev_body)) = previous.take()
                        && prev_fingerprint == fingerprint
                    {
                        debug!(attempts, size = prev_body.len(), "Segment verified");
                        return Ok(prev_body);
                    }
                    previous = Some((fingerprint, body));
                }
                Err(e) => {
                    debug!(attempt = attempts, error = %e, "Segment attempt failed");
                    previous = None;
                    let retryable = e.is_retryable();
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                    if attempts < self.max_attempts {
                        self.retry.backoff(failures).await;
                    }
                    failures += 1;
                }
            }
        }

        let reason = match last_error {
            Some(e) if previous.is_none() => e.to_string(),
            _ => format!(
                "content did not stabilise across {attempts} attempts ({:?} check)",
                self.verify_mode
            ),
        };
        Err(DownloadError::SegmentFetch { reason, attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ScriptedTransport, Step};
    use reqwest::StatusCode;
    use std::time::Duration;

    const URL: &str = "http://h/p/seg1.ts";

    fn segment() -> SegmentDescriptor {
        SegmentDescriptor::new(1, URL, "ts")
    }

    fn fetcher(transport: &ScriptedTransport, attempts: u32, mode: VerifyMode) -> SegmentFetcher {
        let config = HlsFetcherConfig {
            max_segment_attempts: attempts,
            verify_mode: mode,
            segment_retry_delay_base: Duration::ZERO,
            segment_retry_max_delay: Duration::ZERO,
            retry_jitter: false,
            ..Default::default()
        };
        SegmentFetcher::new(Arc::new(transport.clone()), &config)
    }

    #[tokio::test]
    async fn accepts_first_pair_of_equal_lengths() {
        let transport = ScriptedTransport::new();
        transport.script(
            URL,
            [
                Step::body(vec![1u8; 10]),
                Step::body(vec![2u8; 7]),
                Step::body(vec![3u8; 7]),
                Step::body(vec![4u8; 5]),
            ],
        );

        let body = fetcher(&transport, 4, VerifyMode::Length)
            .download_segment(&segment())
            .await
            .unwrap();

        // The second attempt's content, not the fourth
        assert_eq!(body.as_ref(), &[2u8; 7]);
        assert_eq!(transport.request_count(URL), 3);
    }

    #[tokio::test]
    async fn distinct_lengths_exhaust_attempts() {
        let transport = ScriptedTransport::new();
        transport.script(
            URL,
            [
                Step::body(vec![0u8; 1]),
                Step::body(vec![0u8; 2]),
                Step::body(vec![0u8; 3]),
                Step::body(vec![0u8; 4]),
            ],
        );

        let err = fetcher(&transport, 4, VerifyMode::Length)
            .download_segment(&segment())
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::SegmentFetch { attempts: 4, .. }));
        assert_eq!(transport.request_count(URL), 4);
    }

    #[tokio::test]
    async fn digest_mode_rejects_equal_length_different_content() {
        let transport = ScriptedTransport::new();
        transport.script(
            URL,
            [
                Step::body(vec![1u8; 8]),
                Step::body(vec![2u8; 8]),
                Step::body(vec![2u8; 8]),
            ],
        );

        let body = fetcher(&transport, 5, VerifyMode::Sha256)
            .download_segment(&segment())
            .await
            .unwrap();

        assert_eq!(body.as_ref(), &[2u8; 8]);
        assert_eq!(transport.request_count(URL), 3);
    }

    #[tokio::test]
    async fn failed_attempt_breaks_the_chain() {
        let transport = ScriptedTransport::new();
        transport.script(
            URL,
            [
                Step::body(&b"abc"[..]),
                Step::Fail,
                Step::body(&b"abc"[..]),
                Step::Status(StatusCode::BAD_GATEWAY),
                Step::body(&b"abc"[..]),
                Step::body(&b"abc"[..]),
            ],
        );

        let body = fetcher(&transport, 10, VerifyMode::Sha256)
            .download_segment(&segment())
            .await
            .unwrap();

        assert_eq!(body.as_ref(), b"abc");
        assert_eq!(transport.request_count(URL), 6);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let transport = ScriptedTransport::new();

        let err = fetcher(&transport, 20, VerifyMode::Sha256)
            .download_segment(&segment())
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::SegmentFetch { attempts: 1, .. }));
        assert_eq!(transport.request_count(URL), 1);
    }
}
