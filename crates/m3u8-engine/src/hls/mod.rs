// m3u8 download pipeline: playlist -> key -> verified segments -> merged file

pub mod config;
mod coordinator;
mod decryption;
mod downloader;
pub mod events;
mod fetcher;
mod merger;
mod playlist;
pub mod retry;
mod writer;

pub use config::{
    GapPolicy, HlsConfig, HlsDecryptionConfig, HlsFetcherConfig, HlsOutputConfig,
    HlsPlaylistConfig, HlsSchedulerConfig, HostMode, IvPolicy, VerifyMode,
};
pub use coordinator::{PipelineCoordinator, RunSummary, SegmentFailure};
pub use decryption::{DecryptionOffloader, EncryptionKey, KEY_LEN, KeyResolver};
pub use downloader::{DownloadReport, HlsDownloader, validate_playlist_url};
pub use events::{ProgressCallback, ProgressEvent, SegmentOutcome};
pub use fetcher::{SegmentDownloader, SegmentFetcher};
pub use merger::{MERGE_TEMP_NAME, MergeReport, Merger, TS_NULL_PACKET};
pub use playlist::{
    KeyDirective, KeyMethod, Playlist, SegmentDescriptor, join_with_base, parse_playlist,
    resolve_base, segment_file_name,
};
pub use retry::RetryPolicy;
pub use writer::{SegmentWriter, TS_SYNC_BYTE, WriteOutcome, align_to_sync_byte};
