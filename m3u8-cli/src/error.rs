use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(#[from] m3u8_engine::DownloadError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to encode report: {0}")]
    Report(#[from] serde_json::Error),

    #[error("{failed} of {total} segments failed")]
    IncompleteRun { failed: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, AppError>;
