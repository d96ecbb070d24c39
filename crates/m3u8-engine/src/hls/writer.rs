// HLS Segment Writer: decrypts, aligns and persists one verified segment.

use crate::DownloadError;
use crate::hls::config::{HlsDecryptionConfig, IvPolicy};
use crate::hls::decryption::{DecryptionOffloader, EncryptionKey};
use crate::hls::playlist::SegmentDescriptor;
use bytes::Bytes;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// MPEG-TS packet sync byte.
pub const TS_SYNC_BYTE: u8 = 0x47;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// A file of the same length was already on disk
    Skipped,
    Written { bytes: u64 },
}

/// Drop everything before the first sync byte. Content without one is kept as is.
pub fn align_to_sync_byte(data: Bytes) -> Bytes {
    match memchr::memchr(TS_SYNC_BYTE, &data) {
        Some(0) | None => data,
        Some(offset) => {
            trace!(offset, "Stripping bytes before first sync byte");
            data.slice(offset..)
        }
    }
}

pub struct SegmentWriter {
    dir: PathBuf,
    key: Option<Arc<EncryptionKey>>,
    iv_policy: IvPolicy,
    /// `#EXT-X-MEDIA-SEQUENCE` of the playlist, used for sequence-derived IVs
    media_sequence_base: u64,
    offloader: DecryptionOffloader,
}

impl SegmentWriter {
    pub fn new(
        dir: impl Into<PathBuf>,
        key: Option<Arc<EncryptionKey>>,
        config: &HlsDecryptionConfig,
        media_sequence_base: u64,
    ) -> Self {
        Self {
            dir: dir.into(),
            key,
            iv_policy: config.iv_policy,
            media_sequence_base,
            offloader: DecryptionOffloader::new(config.offload_decryption_to_cpu_pool),
        }
    }

    /// Media sequence number of `segment`. The sequence space wraps at 2^64.
    fn media_sequence_of(&self, segment: &SegmentDescriptor) -> u64 {
        self.media_sequence_base
            .wrapping_add(u64::from(segment.sequence.saturating_sub(1)))
    }

    pub fn segment_path(&self, segment: &SegmentDescriptor) -> PathBuf {
        self.dir.join(&segment.name)
    }

    /// Persist one segment.
    ///
    /// `content` is the verified, still encrypted body. When a file of exactly
    /// that length already exists nothing is decrypted or written.
    pub async fn write_segment(
        &self,
        segment: &SegmentDescriptor,
        content: Bytes,
    ) -> Result<WriteOutcome, DownloadError> {
        let path = self.segment_path(segment);

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() == content.len() as u64 => {
                debug!(name = %segment.name, "Segment already on disk, skipping");
                return Ok(WriteOutcome::Skipped);
            }
            Ok(_) => {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(name = %segment.name, error = %e, "Cannot delete stale segment file");
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(name = %segment.name, error = %e, "Cannot inspect existing segment file");
            }
        }

        let data = match &self.key {
            None => content,
            Some(key) => {
                let iv = key.iv_for(self.iv_policy, self.media_sequence_of(segment));
                self.offloader.decrypt(content, key.raw(), &iv).await?
            }
        };

        if data.is_empty() {
            return Err(DownloadError::EmptySegment {
                name: segment.name.clone(),
            });
        }

        let data = align_to_sync_byte(data);

        // Write next to the target and rename, so an interrupted write never
        // leaves a file that a later run could mistake for a finished one.
        let partial = path.with_extension("part");
        tokio::fs::write(&partial, &data).await?;
        tokio::fs::rename(&partial, &path).await?;

        debug!(name = %segment.name, bytes = data.len(), "Segment written");
        Ok(WriteOutcome::Written {
            bytes: data.len() as u64,
        })
    }
}
