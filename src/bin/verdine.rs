//! verdine CLI - extract per-point vegetation index series from GeoTIFF frames.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use verdine::core::{max_per_point, CancellationToken, Pipeline, PointSummary};
use verdine::io::{CsvExporter, FrameReader, PointReader, RowSink};
use verdine::{MergedRow, PipelineConfig, VegResult};

#[derive(Debug, Parser)]
#[command(name = "verdine", version, about = "Cloud-masked NDVI time series for sample points")]
struct Cli {
    /// Points table with `id,x,y` columns
    #[arg(long)]
    points: PathBuf,

    /// Directory of GeoTIFF frames, one granule per file
    #[arg(long)]
    frames: PathBuf,

    /// Output CSV (one row per point, one column per date)
    #[arg(long, short)]
    output: PathBuf,

    /// JSON configuration; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Optional per-point maximum summary CSV
    #[arg(long)]
    summary: Option<PathBuf>,
}

/// Writes chunks to the exporter and accumulates per-point summaries
struct SummarizingSink<W: std::io::Write> {
    exporter: CsvExporter<W>,
    summaries: Vec<PointSummary>,
    sentinel: f64,
}

impl<W: std::io::Write> RowSink for SummarizingSink<W> {
    fn write_chunk(&mut self, rows: &[MergedRow]) -> VegResult<()> {
        self.exporter.write_chunk(rows)?;
        self.summaries.extend(max_per_point(rows, self.sentinel));
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let sentinel = config.sentinel;
    let fill = config.fill_missing;
    let pipeline = Pipeline::new(config).context("invalid configuration")?;

    let points = PointReader::read_csv(&cli.points)
        .with_context(|| format!("reading points {}", cli.points.display()))?;

    let frames = FrameReader::read_dir(&cli.frames)
        .with_context(|| format!("listing frames in {}", cli.frames.display()))?;
    let prepared = pipeline.prepare_frames(frames).context("preparing frames")?;

    let header = pipeline.header_keys(&points, &prepared);
    let exporter = CsvExporter::create(&cli.output, header, fill, sentinel)
        .with_context(|| format!("creating {}", cli.output.display()))?;
    let mut sink = SummarizingSink {
        exporter,
        summaries: Vec::new(),
        sentinel,
    };

    let report = pipeline
        .run(&points, &prepared, &mut sink, &CancellationToken::new())
        .context("extracting time series")?;

    if let Some(path) = &cli.summary {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("creating {}", path.display()))?;
        for summary in &sink.summaries {
            writer.serialize(summary)?;
        }
        writer.flush()?;
    }

    for rejection in &report.frames_rejected {
        eprintln!("rejected {}: {}", rejection.frame_id, rejection.reason);
    }
    println!(
        "{} points, {} frames ({} rejected), {} rows written to {}",
        report.points,
        report.frames_accepted,
        report.frames_rejected.len(),
        report.rows,
        cli.output.display()
    );
    Ok(())
}
