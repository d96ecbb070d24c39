// HLS Downloader: runs one complete download, from playlist URL to merged file.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tracing::{info, instrument, warn};

use crate::DownloadError;
use crate::hls::config::HlsConfig;
use crate::hls::coordinator::{PipelineCoordinator, RunSummary};
use crate::hls::decryption::KeyResolver;
use crate::hls::events::ProgressCallback;
use crate::hls::fetcher::SegmentFetcher;
use crate::hls::merger::{MergeReport, Merger};
use crate::hls::playlist::{Playlist, parse_playlist, resolve_base};
use crate::hls::retry::retry_request;
use crate::hls::writer::SegmentWriter;
use crate::transport::{HttpTransport, Transport};

/// Outcome of [`HlsDownloader::download`].
#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub summary: RunSummary,
    /// `None` when merging is disabled
    pub merge: Option<MergeReport>,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs_f64")]
    pub elapsed: Duration,
    pub encrypted: bool,
}

fn as_secs_f64<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Cheap sanity check applied before any request: an http(s) URL naming an m3u8.
pub fn validate_playlist_url(url: &str) -> Result<(), DownloadError> {
    if !url.starts_with("http") {
        return Err(DownloadError::invalid_url(url, "must start with http"));
    }
    if !url.contains("m3u8") {
        return Err(DownloadError::invalid_url(url, "does not reference an m3u8 playlist"));
    }
    Ok(())
}

pub struct HlsDownloader {
    config: HlsConfig,
    transport: Arc<dyn Transport>,
    progress: Option<ProgressCallback>,
}

impl HlsDownloader {
    pub fn new(config: HlsConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            progress: None,
        }
    }

    /// Build a downloader that talks HTTP with a client made from `config.base`.
    pub fn from_config(config: HlsConfig) -> Result<Self, DownloadError> {
        let transport = HttpTransport::from_config(&config.base)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Download every segment of the playlist at `url` into `segment_dir`, then
    /// merge them into `output`.
    ///
    /// Playlist, key and configuration problems fail the call before any segment
    /// is requested. Segment failures do not: they are listed in the returned
    /// summary.
    #[instrument(skip(self, segment_dir, output), level = "debug")]
    pub async fn download(
        &self,
        url: &str,
        segment_dir: &Path,
        output: &Path,
    ) -> Result<DownloadReport, DownloadError> {
        let start_time = Instant::now();
        validate_playlist_url(url)?;
        self.config.validate()?;

        let base = resolve_base(url, self.config.playlist_config.host_mode)?;
        info!(url, base = %base, "Starting m3u8 download");

        let playlist = self.load_playlist(url, &base).await?;
        if playlist.has_variants {
            warn!("Playlist references other playlists; variant streams are not followed");
        }
        if playlist.segments.is_empty() {
            return Err(DownloadError::Playlist {
                reason: "playlist lists no segments".to_string(),
            });
        }

        let key_resolver = KeyResolver::new(
            Arc::clone(&self.transport),
            self.config.fetcher_config.resource_retry_policy(),
        );
        let key = key_resolver
            .resolve(playlist.key.as_ref())
            .await?
            .map(Arc::new);
        let encrypted = key.is_some();

        tokio::fs::create_dir_all(segment_dir).await?;

        let fetcher = Arc::new(SegmentFetcher::new(
            Arc::clone(&self.transport),
            &self.config.fetcher_config,
        ));
        let writer = Arc::new(SegmentWriter::new(
            segment_dir,
            key,
            &self.config.decryption_config,
            playlist.media_sequence,
        ));
        let summary = PipelineCoordinator::new(
            fetcher,
            writer,
            self.config.scheduler_config.download_concurrency,
        )
        .with_progress(self.progress.clone())
        .run(&playlist.segments)
        .await;

        let merge = if self.config.output_config.merge_segments {
            let merger = Merger::new(&self.config.output_config);
            Some(
                merger
                    .merge(segment_dir, playlist.segments.len(), output)
                    .await?,
            )
        } else {
            None
        };

        let elapsed = start_time.elapsed();
        info!(
            segments = playlist.segments.len(),
            failed = summary.failed.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Download finished"
        );

        Ok(DownloadReport {
            summary,
            merge,
            elapsed,
            encrypted,
        })
    }

    async fn load_playlist(&self, url: &str, base: &str) -> Result<Playlist, DownloadError> {
        let retry = self.config.fetcher_config.resource_retry_policy();
        let body = retry_request(&retry, "playlist", |_| async move {
            self.transport.get(url).await.and_then(|response| {
                if response.is_success() {
                    Ok(response.body)
                } else {
                    Err(DownloadError::http_status(
                        response.status,
                        url,
                        "playlist fetch",
                    ))
                }
            })
        })
        .await?;

        let text = String::from_utf8_lossy(&body);
        Ok(parse_playlist(
            &text,
            base,
            &self.config.output_config.segment_extension,
        ))
    }
}
