//! Download engine for m3u8 (HLS) playlists.
//!
//! A run fetches the playlist, resolves its AES-128 key if there is one,
//! downloads every segment until two consecutive attempts agree, decrypts and
//! persists each one under a fixed-width name, and finally concatenates them in
//! manifest order. See [`hls::HlsDownloader`] for the entry point.

pub mod config;
pub mod error;
pub mod hls;
pub mod proxy;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use config::DownloaderConfig;
pub use error::DownloadError;
pub use hls::{DownloadReport, HlsConfig, HlsDownloader, RunSummary};
pub use transport::{FetchResponse, HttpTransport, Transport};
