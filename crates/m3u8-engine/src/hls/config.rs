use std::time::Duration;

use crate::DownloaderConfig;
use crate::hls::retry::RetryPolicy;

// --- Top-Level Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsConfig {
    /// Base transport configuration
    pub base: DownloaderConfig,
    pub playlist_config: HlsPlaylistConfig,
    pub scheduler_config: HlsSchedulerConfig,
    pub fetcher_config: HlsFetcherConfig,
    pub decryption_config: HlsDecryptionConfig,
    pub output_config: HlsOutputConfig,
}

// --- Playlist Configuration ---

/// How the base host for relative segment and key URIs is derived from the
/// playlist URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum HostMode {
    /// `scheme://host` plus the directory of the playlist path
    #[default]
    #[cfg_attr(feature = "clap", value(name = "apiv1"))]
    PathDir,
    /// `scheme://host` only
    #[cfg_attr(feature = "clap", value(name = "apiv2"))]
    HostOnly,
}

#[derive(Debug, Clone, Default)]
pub struct HlsPlaylistConfig {
    pub host_mode: HostMode,
}

// --- Scheduler Configuration ---
#[derive(Debug, Clone)]
pub struct HlsSchedulerConfig {
    /// Max segments fetched and written at the same time (default: 4).
    /// `1` reproduces strictly serial downloads.
    pub download_concurrency: usize,
}

impl Default for HlsSchedulerConfig {
    fn default() -> Self {
        Self {
            download_concurrency: 4,
        }
    }
}

// --- Fetcher Configuration ---

/// What two consecutive attempts must agree on before a segment is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum VerifyMode {
    /// SHA-256 digest of the body
    #[default]
    Sha256,
    /// Body length only
    Length,
}

#[derive(Debug, Clone)]
pub struct HlsFetcherConfig {
    /// Attempts per segment before it is given up (default: 20)
    pub max_segment_attempts: u32,
    pub verify_mode: VerifyMode,
    /// Base for exponential backoff after a failed segment attempt
    pub segment_retry_delay_base: Duration,
    pub segment_retry_max_delay: Duration,
    /// Retries (after the first try) for the playlist and key requests
    pub max_resource_retries: u32,
    pub resource_retry_delay_base: Duration,
    pub retry_jitter: bool,
}

impl Default for HlsFetcherConfig {
    fn default() -> Self {
        Self {
            max_segment_attempts: 20,
            verify_mode: VerifyMode::default(),
            segment_retry_delay_base: Duration::from_millis(500),
            segment_retry_max_delay: Duration::from_secs(5),
            max_resource_retries: 3,
            resource_retry_delay_base: Duration::from_millis(200),
            retry_jitter: true,
        }
    }
}

impl HlsFetcherConfig {
    pub fn segment_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_segment_attempts.saturating_sub(1),
            base_delay: self.segment_retry_delay_base,
            max_delay: self.segment_retry_max_delay,
            jitter: self.retry_jitter,
        }
    }

    pub fn resource_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_resource_retries,
            base_delay: self.resource_retry_delay_base,
            max_delay: self.resource_retry_delay_base * 10,
            jitter: self.retry_jitter,
        }
    }
}

// --- Decryption Configuration ---

/// IV used when the key directive carries no `IV` attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum IvPolicy {
    /// Reuse the key bytes as the IV. Weak, kept for compatibility with
    /// servers that were packaged this way.
    #[default]
    KeyAsIv,
    /// Big-endian media sequence number of the segment (RFC 8216 §5.2)
    MediaSequence,
}

#[derive(Debug, Clone)]
pub struct HlsDecryptionConfig {
    pub iv_policy: IvPolicy,
    /// Whether to run AES on tokio's blocking thread pool
    pub offload_decryption_to_cpu_pool: bool,
}

impl Default for HlsDecryptionConfig {
    fn default() -> Self {
        Self {
            iv_policy: IvPolicy::default(),
            offload_decryption_to_cpu_pool: true,
        }
    }
}

// --- Output Configuration ---

/// What the merger does about segments that never made it to disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum GapPolicy {
    /// Concatenate what exists; missing segments contribute nothing
    #[default]
    Omit,
    /// Refuse to merge when any expected segment is missing
    Abort,
    /// Write one MPEG-TS null packet in place of each missing segment
    NullPacket,
}

#[derive(Debug, Clone)]
pub struct HlsOutputConfig {
    /// Extension of persisted segment files (default: `ts`)
    pub segment_extension: String,
    pub gap_policy: GapPolicy,
    /// Concatenate the segments once downloads finish (default: true)
    pub merge_segments: bool,
    /// Delete the segment directory after a successful merge
    pub cleanup_segments: bool,
}

impl Default for HlsOutputConfig {
    fn default() -> Self {
        Self {
            segment_extension: "ts".to_string(),
            gap_policy: GapPolicy::default(),
            merge_segments: true,
            cleanup_segments: false,
        }
    }
}

impl HlsConfig {
    /// Reject settings that would make a run meaningless before any request is made.
    pub fn validate(&self) -> Result<(), crate::DownloadError> {
        if self.scheduler_config.download_concurrency == 0 {
            return Err(crate::DownloadError::configuration(
                "download concurrency must be at least 1",
            ));
        }
        if self.fetcher_config.max_segment_attempts < 2 {
            return Err(crate::DownloadError::configuration(
                "at least 2 attempts per segment are needed to verify a download",
            ));
        }
        let ext = &self.output_config.segment_extension;
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(crate::DownloadError::configuration(format!(
                "invalid segment extension `{ext}`"
            )));
        }
        Ok(())
    }
}
