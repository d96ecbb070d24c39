// HLS Pipeline Coordinator: fans segment fetch+write units out under a
// concurrency gate and folds their results into a run summary.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::DownloadError;
use crate::hls::events::{ProgressCallback, ProgressEvent, SegmentOutcome};
use crate::hls::fetcher::SegmentDownloader;
use crate::hls::playlist::SegmentDescriptor;
use crate::hls::writer::{SegmentWriter, WriteOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentFailure {
    pub sequence: u32,
    pub name: String,
    pub reason: String,
}

/// Per-run tally of segment outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    /// Segments that are on disk after the run, including `skipped_existing`
    pub succeeded: usize,
    pub skipped_existing: usize,
    pub failed: Vec<SegmentFailure>,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(
        &mut self,
        segment: &SegmentDescriptor,
        result: &Result<WriteOutcome, DownloadError>,
    ) {
        self.attempted += 1;
        match result {
            Ok(WriteOutcome::Written { .. }) => self.succeeded += 1,
            Ok(WriteOutcome::Skipped) => {
                self.succeeded += 1;
                self.skipped_existing += 1;
            }
            Err(e) => self.failed.push(SegmentFailure {
                sequence: segment.sequence,
                name: segment.name.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

pub struct PipelineCoordinator {
    fetcher: Arc<dyn SegmentDownloader>,
    writer: Arc<SegmentWriter>,
    concurrency: usize,
    progress: Option<ProgressCallback>,
}

impl PipelineCoordinator {
    pub fn new(
        fetcher: Arc<dyn SegmentDownloader>,
        writer: Arc<SegmentWriter>,
        concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            writer,
            concurrency: concurrency.max(1),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress(event);
        }
    }

    /// One fetch+write per segment. Failures are recorded, never returned.
    pub async fn run(&self, segments: &[SegmentDescriptor]) -> RunSummary {
        let total = segments.len();
        info!(total, concurrency = self.concurrency, "Starting segment downloads");
        self.emit(ProgressEvent::RunStarted { total });

        let gate = Semaphore::new(self.concurrency);
        let mut units: FuturesUnordered<_> = segments
            .iter()
            .map(|segment| self.process_segment(&gate, segment))
            .collect();

        let mut summary = RunSummary::default();
        let mut completed = 0usize;

        while let Some((segment, result)) = units.next().await {
            completed += 1;
            if let Err(e) = &result {
                warn!(
                    sequence = segment.sequence,
                    name = %segment.name,
                    error = %e,
                    "Segment failed"
                );
            }
            summary.record(segment, &result);

            let outcome = match result {
                Ok(outcome) => SegmentOutcome::from(outcome),
                Err(e) => SegmentOutcome::Failed {
                    reason: e.to_string(),
                },
            };
            self.emit(ProgressEvent::SegmentFinished {
                completed,
                total,
                sequence: segment.sequence,
                outcome,
            });
        }

        info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped_existing,
            failed = summary.failed.len(),
            "Segment downloads finished"
        );
        self.emit(ProgressEvent::RunFinished {
            summary: summary.clone(),
        });
        summary
    }

    async fn process_segment<'a>(
        &self,
        gate: &Semaphore,
        segment: &'a SegmentDescriptor,
    ) -> (&'a SegmentDescriptor, Result<WriteOutcome, DownloadError>) {
        let _permit = match gate.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                let err = DownloadError::Internal {
                    reason: "concurrency gate closed".to_string(),
                };
                return (segment, Err(err));
            }
        };

        debug!(sequence = segment.sequence, uri = %segment.uri, "Processing segment");
        // A failed fetch never reaches the writer, so whatever is on disk stays.
        let result = match self.fetcher.download_segment(segment).await {
            Ok(content) => self.writer.write_segment(segment, content).await,
            Err(e) => Err(e),
        };
        (segment, result)
    }
}
