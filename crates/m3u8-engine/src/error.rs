use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("playlist error: {reason}")]
    Playlist { reason: String },

    #[error("failed to fetch decryption key from {url}: {reason}")]
    KeyFetch { url: String, reason: String },

    #[error("invalid decryption key from {url}: {len} bytes (expected 16)")]
    InvalidKey { url: String, len: usize },

    #[error("segment fetch error after {attempts} attempts: {reason}")]
    SegmentFetch { reason: String, attempts: u32 },

    #[error("decryption error: {reason}")]
    Decryption { reason: String },

    #[error("segment {name} is empty after decryption")]
    EmptySegment { name: String },

    #[error("merge aborted, missing segments: {missing:?}")]
    MergeGap { missing: Vec<u32> },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl DownloadError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn key_fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::KeyFetch {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn decryption(reason: impl Into<String>) -> Self {
        Self::Decryption {
            reason: reason.into(),
        }
    }

    /// Whether repeating the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidUrl { .. }
            | Self::Configuration { .. }
            | Self::Playlist { .. }
            | Self::InvalidKey { .. }
            | Self::Decryption { .. }
            | Self::EmptySegment { .. }
            | Self::MergeGap { .. } => false,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Network { .. }
            | Self::Io { .. }
            | Self::KeyFetch { .. }
            | Self::SegmentFetch { .. }
            | Self::Internal { .. } => true,
        }
    }
}
