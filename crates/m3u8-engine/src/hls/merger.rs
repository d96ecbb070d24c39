// HLS Merger: concatenates persisted segments in sequence order into one file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::DownloadError;
use crate::hls::config::{GapPolicy, HlsOutputConfig};
use crate::hls::playlist::segment_file_name;

/// Scratch file inside the segment directory; renamed onto the output once complete.
pub const MERGE_TEMP_NAME: &str = "merge.tmp";

/// MPEG-TS null packet (PID 0x1FFF, payload only, stuffing bytes).
pub const TS_NULL_PACKET: [u8; 188] = {
    let mut packet = [0xFF; 188];
    packet[0] = 0x47;
    packet[1] = 0x1F;
    packet[2] = 0xFF;
    packet[3] = 0x10;
    packet
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub output: PathBuf,
    pub segments_merged: usize,
    pub bytes_written: u64,
    /// Sequences in `1..=expected` with no segment file
    pub gaps: Vec<u32>,
}

enum Piece {
    File(PathBuf),
    NullPacket,
}

pub struct Merger {
    extension: String,
    gap_policy: GapPolicy,
    cleanup: bool,
}

impl Merger {
    pub fn new(config: &HlsOutputConfig) -> Self {
        Self {
            extension: config.segment_extension.clone(),
            gap_policy: config.gap_policy,
            cleanup: config.cleanup_segments,
        }
    }

    /// Sequence number encoded in a segment file name, if the name is one of ours.
    ///
    /// Only the exact names the writer produces are accepted, so `1.ts` or
    /// `000003.ts` are not taken for segments 1 and 3.
    fn sequence_of(&self, file_name: &str) -> Option<u32> {
        let stem = file_name
            .strip_suffix(self.extension.as_str())?
            .strip_suffix('.')?;
        if !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let sequence: u32 = stem.parse().ok()?;
        (segment_file_name(sequence, &self.extension) == file_name).then_some(sequence)
    }

    /// Segment files in `dir`, in sequence order.
    async fn list_segments(&self, dir: &Path) -> Result<Vec<(u32, PathBuf)>, DownloadError> {
        let mut found = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(sequence) = self.sequence_of(name) {
                found.push((sequence, entry.path()));
            }
        }
        // Names past 99,999 are wider, so name order is not sequence order
        found.sort_by_key(|(sequence, _)| *sequence);
        Ok(found)
    }

    /// Merge the segments of `dir` into `output`.
    ///
    /// `expected` is the number of segments the manifest listed; it is only used
    /// to find gaps. Every segment file in the directory is merged.
    pub async fn merge(
        &self,
        dir: &Path,
        expected: usize,
        output: &Path,
    ) -> Result<MergeReport, DownloadError> {
        let segments = self.list_segments(dir).await?;
        let present: BTreeSet<u32> = segments.iter().map(|(sequence, _)| *sequence).collect();
        let gaps: Vec<u32> = (1..=expected as u32)
            .filter(|sequence| !present.contains(sequence))
            .collect();

        if !gaps.is_empty() {
            match self.gap_policy {
                GapPolicy::Abort => return Err(DownloadError::MergeGap { missing: gaps }),
                GapPolicy::Omit => warn!(?gaps, "Merging without missing segments"),
                GapPolicy::NullPacket => {
                    warn!(?gaps, "Filling missing segments with null packets")
                }
            }
        }

        let mut pieces: Vec<(u32, Piece)> = segments
            .iter()
            .map(|(sequence, path)| (*sequence, Piece::File(path.clone())))
            .collect();
        if self.gap_policy == GapPolicy::NullPacket {
            pieces.extend(gaps.iter().map(|sequence| (*sequence, Piece::NullPacket)));
            pieces.sort_by_key(|(sequence, _)| *sequence);
        }

        let temp_path = dir.join(MERGE_TEMP_NAME);
        let bytes_written = write_pieces(&temp_path, &pieces).await?;
        publish(&temp_path, output).await?;

        info!(
            output = %output.display(),
            segments = segments.len(),
            bytes = bytes_written,
            gaps = gaps.len(),
            "Merge complete"
        );

        if self.cleanup {
            remove_segments(dir, &segments).await;
        }

        Ok(MergeReport {
            output: output.to_path_buf(),
            segments_merged: segments.len(),
            bytes_written,
            gaps,
        })
    }
}

async fn write_pieces(path: &Path, pieces: &[(u32, Piece)]) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(File::create(path).await?);
    let mut total = 0u64;

    for (sequence, piece) in pieces {
        match piece {
            Piece::File(segment_path) => {
                let mut segment = File::open(segment_path).await?;
                let copied = tokio::io::copy(&mut segment, &mut writer).await?;
                debug!(sequence, bytes = copied, "Appended segment");
                total += copied;
            }
            Piece::NullPacket => {
                writer.write_all(&TS_NULL_PACKET).await?;
                total += TS_NULL_PACKET.len() as u64;
            }
        }
    }

    writer.flush().await?;
    writer.into_inner().sync_all().await?;
    Ok(total)
}

/// Move the finished merge onto `output`, copying when a rename is not possible
/// (e.g. across filesystems).
async fn publish(temp_path: &Path, output: &Path) -> Result<(), DownloadError> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    if let Err(e) = fs::rename(temp_path, output).await {
        debug!(error = %e, "Rename failed, copying merged file instead");
        fs::copy(temp_path, output).await?;
        fs::remove_file(temp_path).await?;
    }
    Ok(())
}

async fn remove_segments(dir: &Path, segments: &[(u32, PathBuf)]) {
    for (_, path) in segments {
        if let Err(e) = fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Cannot delete segment file");
        }
    }
    // Only succeeds when nothing else lives there.
    if let Err(e) = fs::remove_dir(dir).await {
        debug!(dir = %dir.display(), error = %e, "Segment directory left in place");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merger(gap_policy: GapPolicy, cleanup: bool) -> Merger {
        Merger::new(&HlsOutputConfig {
            gap_policy,
            cleanup_segments: cleanup,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn concatenates_in_sequence_order() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let dir = temp_dir.path().join("segments");
        std::fs::create_dir(&dir)?;
        // Created out of order on purpose
        std::fs::write(dir.join("00003.ts"), b"CCC")?;
        std::fs::write(dir.join("00001.ts"), b"A")?;
        std::fs::write(dir.join("00002.ts"), b"BB")?;
        let output = temp_dir.path().join("out.mp4");

        let report = merger(GapPolicy::Omit, false)
            .merge(&dir, 3, &output)
            .await?;

        assert_eq!(std::fs::read(&output)?, b"ABBCCC");
        assert_eq!(report.segments_merged, 3);
        assert_eq!(report.bytes_written, 6);
        assert!(report.gaps.is_empty());
        assert!(!dir.join(MERGE_TEMP_NAME).exists());
        // Segments stay unless cleanup is requested
        assert!(dir.join("00001.ts").exists());
        Ok(())
    }

    #[tokio::test]
    async fn ignores_files_that_are_not_segments() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let dir = temp_dir.path();
        std::fs::write(dir.join("00001.ts"), b"A")?;
        std::fs::write(dir.join("00002.part"), b"partial")?;
        std::fs::write(dir.join("1.ts"), b"short")?;
        std::fs::write(dir.join("000003.ts"), b"long")?;
        std::fs::write(dir.join("notes.txt"), b"x")?;
        std::fs::create_dir(dir.join("00004.ts"))?;
        let output = dir.join("out.mp4");

        let report = merger(GapPolicy::Omit, false)
            .merge(dir, 1, &output)
            .await?;

        assert_eq!(std::fs::read(&output)?, b"A");
        assert_eq!(report.segments_merged, 1);
        Ok(())
    }

    #[tokio::test]
    async fn segments_past_five_digits_merge_in_numeric_order()
    -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let dir = temp_dir.path().join("segments");
        std::fs::create_dir(&dir)?;
        std::fs::write(dir.join(segment_file_name(100_000, "ts")), b"B")?;
        std::fs::write(dir.join(segment_file_name(99_999, "ts")), b"A")?;
        std::fs::write(dir.join(segment_file_name(100_001, "ts")), b"C")?;
        let output = temp_dir.path().join("out.mp4");

        let report = merger(GapPolicy::Omit, false)
            .merge(&dir, 100_001, &output)
            .await?;

        assert_eq!(std::fs::read(&output)?, b"ABC");
        assert_eq!(report.segments_merged, 3);
        // Only the sequences never written count as gaps
        assert_eq!(report.gaps.len(), 99_998);
        assert_eq!(report.gaps.last(), Some(&99_998));
        Ok(())
    }

    #[tokio::test]
    async fn omit_reports_gaps() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let dir = temp_dir.path().join("segments");
        std::fs::create_dir(&dir)?;
        std::fs::write(dir.join("00001.ts"), b"A")?;
        std::fs::write(dir.join("00003.ts"), b"C")?;
        let output = temp_dir.path().join("out.mp4");

        let report = merger(GapPolicy::Omit, false)
            .merge(&dir, 4, &output)
            .await?;

        assert_eq!(std::fs::read(&output)?, b"AC");
        assert_eq!(report.gaps, vec![2, 4]);
        Ok(())
    }

    #[tokio::test]
    async fn abort_refuses_to_merge_with_gaps() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let dir = temp_dir.path().join("segments");
        std::fs::create_dir(&dir)?;
        std::fs::write(dir.join("00002.ts"), b"B")?;
        let output = temp_dir.path().join("out.mp4");

        let err = merger(GapPolicy::Abort, false)
            .merge(&dir, 2, &output)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::MergeGap { ref missing } if missing == &vec![1]));
        assert!(!output.exists());
        assert!(!dir.join(MERGE_TEMP_NAME).exists());
        Ok(())
    }

    #[tokio::test]
    async fn null_packets_fill_gaps_in_place() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let dir = temp_dir.path().join("segments");
        std::fs::create_dir(&dir)?;
        std::fs::write(dir.join("00001.ts"), b"A")?;
        std::fs::write(dir.join("00003.ts"), b"C")?;
        let output = temp_dir.path().join("out.mp4");

        let report = merger(GapPolicy::NullPacket, false)
            .merge(&dir, 3, &output)
            .await?;

        let merged = std::fs::read(&output)?;
        assert_eq!(merged.len(), 1 + 188 + 1);
        assert_eq!(merged[0], b'A');
        assert_eq!(&merged[1..189], &TS_NULL_PACKET[..]);
        assert_eq!(merged[189], b'C');
        assert_eq!(report.bytes_written, 190);
        assert_eq!(report.gaps, vec![2]);
        Ok(())
    }

    #[tokio::test]
    async fn cleanup_removes_segments_and_directory() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let dir = temp_dir.path().join("segments");
        std::fs::create_dir(&dir)?;
        std::fs::write(dir.join("00001.ts"), b"A")?;
        std::fs::write(dir.join("00002.ts"), b"B")?;
        let output = temp_dir.path().join("out.mp4");

        merger(GapPolicy::Omit, true)
            .merge(&dir, 2, &output)
            .await?;

        assert_eq!(std::fs::read(&output)?, b"AB");
        assert!(!dir.exists());
        Ok(())
    }

    #[test]
    fn null_packet_layout() {
        assert_eq!(&TS_NULL_PACKET[..4], &[0x47, 0x1F, 0xFF, 0x10]);
        assert!(TS_NULL_PACKET[4..].iter().all(|&b| b == 0xFF));
    }
}
