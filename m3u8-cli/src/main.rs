use std::process;

use clap::Parser;
use m3u8_engine::hls::{DownloadReport, HlsDownloader};
use m3u8dl::cli::Args;
use m3u8dl::error::{AppError, Result};
use m3u8dl::progress;
use m3u8dl::utils::output_paths;
use tracing::{Instrument, Level, error, info, info_span};
use tracing_indicatif::IndicatifLayer;
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.to_config()?;
    let paths = output_paths(&args.output_dir, &args.name)?;

    let run_span = info_span!("m3u8dl", name = %args.name);
    run_span.pb_set_style(&progress::bar_style());

    let downloader = HlsDownloader::from_config(config)?
        .with_progress(progress::span_progress(run_span.clone()));

    info!(
        url = %args.url,
        segments = %paths.segment_dir.display(),
        output = %paths.output_file.display(),
        "Downloading"
    );
    let report = downloader
        .download(&args.url, &paths.segment_dir, &paths.output_file)
        .instrument(run_span)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if args.strict && !report.summary.is_complete() {
        return Err(AppError::IncompleteRun {
            failed: report.summary.failed.len(),
            total: report.summary.attempted,
        });
    }
    Ok(())
}

fn print_report(report: &DownloadReport) {
    let summary = &report.summary;
    println!(
        "Downloaded {}/{} segments ({} already present){} in {:.1}s",
        summary.succeeded,
        summary.attempted,
        summary.skipped_existing,
        if report.encrypted { ", decrypted" } else { "" },
        report.elapsed.as_secs_f64()
    );
    for failure in &summary.failed {
        println!("  failed {} (#{}): {}", failure.name, failure.sequence, failure.reason);
    }
    if let Some(merge) = &report.merge {
        println!(
            "Merged {} segments ({} bytes) into {}",
            merge.segments_merged,
            merge.bytes_written,
            merge.output.display()
        );
        if !merge.gaps.is_empty() {
            println!("  missing segments: {:?}", merge.gaps);
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // Log lines go through the indicatif writer so they print above the bars.
    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(indicatif_layer.get_stderr_writer()),
        )
        .with(indicatif_layer)
        .init();
}
