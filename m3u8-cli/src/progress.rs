use std::sync::Arc;

use indicatif::ProgressStyle;
use m3u8_engine::hls::{ProgressCallback, ProgressEvent, SegmentOutcome};
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

const BAR_TEMPLATE: &str =
    "{span_child_prefix}{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} segments ({eta}) {msg}";

pub fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Drive the progress bar attached to `span` from the engine's progress events.
pub fn span_progress(span: Span) -> ProgressCallback {
    Arc::new(move |event: ProgressEvent| match event {
        ProgressEvent::RunStarted { total } => {
            span.pb_set_length(total as u64);
            span.pb_set_position(0);
        }
        ProgressEvent::SegmentFinished {
            completed,
            sequence,
            outcome,
            ..
        } => {
            span.pb_set_position(completed as u64);
            if let SegmentOutcome::Failed { .. } = outcome {
                span.pb_set_message(&format!("segment {sequence} failed"));
            }
        }
        ProgressEvent::RunFinished { summary } => {
            span.pb_set_finish_message(&format!(
                "{} ok, {} failed",
                summary.succeeded,
                summary.failed.len()
            ));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use m3u8_engine::hls::RunSummary;

    #[test]
    fn handles_every_event_without_a_subscriber() {
        let callback = span_progress(Span::none());
        callback(ProgressEvent::RunStarted { total: 2 });
        callback(ProgressEvent::SegmentFinished {
            completed: 1,
            total: 2,
            sequence: 2,
            outcome: SegmentOutcome::Failed {
                reason: "HTTP 404".to_string(),
            },
        });
        callback(ProgressEvent::RunFinished {
            summary: RunSummary::default(),
        });
    }
}
