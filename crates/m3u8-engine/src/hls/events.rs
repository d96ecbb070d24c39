use std::sync::Arc;

use serde::Serialize;

use crate::hls::coordinator::RunSummary;
use crate::hls::writer::WriteOutcome;

/// How a single segment ended up after its fetch and write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentOutcome {
    Written { bytes: u64 },
    Skipped,
    Failed { reason: String },
}

impl From<WriteOutcome> for SegmentOutcome {
    fn from(outcome: WriteOutcome) -> Self {
        match outcome {
            WriteOutcome::Written { bytes } => SegmentOutcome::Written { bytes },
            WriteOutcome::Skipped => SegmentOutcome::Skipped,
        }
    }
}

impl SegmentOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SegmentOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    RunStarted {
        total: usize,
    },
    /// Emitted once per segment, in completion order (not manifest order)
    SegmentFinished {
        completed: usize,
        total: usize,
        sequence: u32,
        outcome: SegmentOutcome,
    },
    RunFinished {
        summary: RunSummary,
    },
}

/// Receives [`ProgressEvent`]s. Called from the coordinator's task, so it
/// should return quickly.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
