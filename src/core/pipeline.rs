use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::core::cloud_mask::{CloudMaskParams, RasterPreprocessor};
use crate::core::granule_merge::GranuleMerger;
use crate::core::pivot::TemporalPivot;
use crate::core::spatial_reduce::{ReduceParams, ReductionStats, SpatialReducer};
use crate::io::export::RowSink;
use crate::io::frame_id::FrameIdParser;
use crate::types::{
    Frame, FrameRejection, MaskedFrame, MergedRow, Point, VegError, VegResult,
};

/// Cooperative cancellation flag, checked between chunks
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Masked frames ready for reduction
#[derive(Debug, Clone, Default)]
pub struct PreparedFrames {
    frames: Vec<MaskedFrame>,
    rejected: Vec<FrameRejection>,
    date_keys: BTreeSet<String>,
}

impl PreparedFrames {
    pub fn frames(&self) -> &[MaskedFrame] {
        &self.frames
    }

    pub fn rejected(&self) -> &[FrameRejection] {
        &self.rejected
    }

    /// Union of the date keys of all accepted frames, sorted
    ///
    /// Includes frames that may cover none of the points; see
    /// [`Pipeline::header_keys`] for the export header.
    pub fn date_keys(&self) -> Vec<String> {
        self.date_keys.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Summary of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub points: usize,
    pub frames_accepted: usize,
    pub frames_rejected: Vec<FrameRejection>,
    /// Accepted frames whose footprint holds none of the points
    pub frames_without_points: usize,
    pub triplets: usize,
    pub missing_observations: usize,
    pub rows: usize,
    pub chunks: usize,
}

/// Staged batch pipeline: mask, reduce, pivot, merge, export
pub struct Pipeline {
    config: PipelineConfig,
    parser: FrameIdParser,
    preprocessor: RasterPreprocessor,
    reducer: SpatialReducer,
    pivot: TemporalPivot,
    merger: GranuleMerger,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> VegResult<Self> {
        config.validate()?;
        let parser = FrameIdParser::new(config.date_prefix_length)?;
        Ok(Self {
            preprocessor: RasterPreprocessor::new(CloudMaskParams::from(&config)),
            reducer: SpatialReducer::new(ReduceParams {
                scale: config.scale,
                sentinel: config.sentinel,
            }),
            pivot: TemporalPivot::new(config.duplicate_policy),
            merger: GranuleMerger::with_parser(parser.clone()),
            parser,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate and mask frames
    ///
    /// A source error or a repeated frame id aborts; frames with a bad id,
    /// a date outside the window, or unusable bands are rejected and
    /// reported while the rest go on.
    pub fn prepare_frames<I>(&self, frames: I) -> VegResult<PreparedFrames>
    where
        I: IntoIterator<Item = VegResult<Frame>>,
    {
        let mut prepared = PreparedFrames::default();
        let mut seen = HashSet::new();
        let mut accepted = Vec::new();

        for (position, frame) in frames.into_iter().enumerate() {
            let frame = frame.map_err(|e| match e {
                VegError::Source { .. } => e,
                other => VegError::Source {
                    context: format!("frame #{}", position),
                    message: other.to_string(),
                },
            })?;

            if !seen.insert(frame.id.clone()) {
                return Err(VegError::DuplicateId { kind: "frame", id: frame.id });
            }

            match self.check_frame_id(&frame.id) {
                Ok(()) => accepted.push(frame),
                Err(reason) => Self::reject(&mut prepared, frame.id, reason),
            }
        }

        log::info!("🛰️  Masking {} frames", accepted.len());

        #[cfg(feature = "parallel")]
        let masked: Vec<(String, VegResult<MaskedFrame>)> = {
            use rayon::prelude::*;
            accepted
                .par_iter()
                .map(|frame| (frame.id.clone(), self.preprocessor.process(frame)))
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let masked: Vec<(String, VegResult<MaskedFrame>)> = accepted
            .iter()
            .map(|frame| (frame.id.clone(), self.preprocessor.process(frame)))
            .collect();
        drop(accepted);

        for (frame_id, result) in masked {
            match result {
                Ok(frame) => {
                    let key = self.parser.date_key(&frame.id)?.to_string();
                    prepared.date_keys.insert(key);
                    prepared.frames.push(frame);
                }
                Err(VegError::InvalidFrame { reason, .. }) => {
                    Self::reject(&mut prepared, frame_id, reason)
                }
                Err(other) => return Err(other),
            }
        }

        log::info!(
            "✅ {} frames ready, {} rejected, {} distinct dates",
            prepared.frames.len(),
            prepared.rejected.len(),
            prepared.date_keys.len()
        );
        Ok(prepared)
    }

    /// Export header for `points`: sorted date keys of the frames whose
    /// footprint contains at least one point
    ///
    /// Each such frame yields a triplet for every point it covers, so this
    /// is exactly the union of the merged rows' keys.
    pub fn header_keys(&self, points: &[Point], prepared: &PreparedFrames) -> Vec<String> {
        let keys: BTreeSet<String> = prepared
            .frames()
            .iter()
            .filter(|frame| covers_any(frame, points))
            .filter_map(|frame| self.parser.date_key(&frame.id).ok().map(str::to_string))
            .collect();
        keys.into_iter().collect()
    }

    fn check_frame_id(&self, frame_id: &str) -> Result<(), String> {
        match self.parser.acquisition_date(frame_id) {
            Ok(Some(date)) if !self.config.accepts_date(date) => {
                Err(format!("acquired {} outside the configured date window", date))
            }
            Ok(_) => Ok(()),
            Err(VegError::InvalidFrameId { reason, .. }) => Err(reason),
            Err(other) => Err(other.to_string()),
        }
    }

    fn reject(prepared: &mut PreparedFrames, frame_id: String, reason: String) {
        log::warn!("Rejecting frame {}: {}", frame_id, reason);
        prepared.rejected.push(FrameRejection { frame_id, reason });
    }

    /// Reduce, pivot and merge one batch of points
    pub fn process_chunk(
        &self,
        points: &[Point],
        frames: &[MaskedFrame],
    ) -> VegResult<(Vec<MergedRow>, ReductionStats)> {
        let reduction = self.reducer.reduce_with_stats(points, frames);
        let pivoted = if self.config.emit_empty_rows {
            self.pivot.pivot_points(points, &reduction.triplets)?
        } else {
            self.pivot.pivot(&reduction.triplets)?
        };
        let merged = self.merger.merge_rows(&pivoted)?;
        Ok((merged, reduction.stats))
    }

    /// Stream merged rows to `sink` one chunk of points at a time
    ///
    /// Cancellation is honoured before each chunk; chunks already handed
    /// to the sink are left as they are.
    pub fn run<S: RowSink>(
        &self,
        points: &[Point],
        prepared: &PreparedFrames,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> VegResult<RunReport> {
        let mut seen = HashSet::new();
        if let Some(dup) = points.iter().find(|p| !seen.insert(p.id.as_str())) {
            return Err(VegError::DuplicateId { kind: "point", id: dup.id.clone() });
        }

        let mut report = RunReport {
            points: points.len(),
            frames_accepted: prepared.len(),
            frames_rejected: prepared.rejected().to_vec(),
            ..Default::default()
        };

        let frames = prepared.frames();
        report.frames_without_points = frames
            .iter()
            .filter(|f| !covers_any(f, points))
            .count();

        log::info!(
            "🎯 Extracting series for {} points from {} frames ({} frames cover no point)",
            points.len(),
            frames.len(),
            report.frames_without_points
        );

        for (chunk_index, chunk) in points.chunks(self.config.chunk_size).enumerate() {
            if cancel.is_cancelled() {
                log::warn!("Run cancelled after {} chunks", chunk_index);
                return Err(VegError::Cancelled { chunks_flushed: chunk_index });
            }

            let (rows, stats) = self.process_chunk(chunk, frames)?;
            sink.write_chunk(&rows).map_err(|e| with_point_bounds(e, chunk))?;

            report.triplets += stats.triplets;
            report.missing_observations += stats.missing;
            report.rows += rows.len();
            report.chunks += 1;
            log::debug!(
                "Chunk {}: {} points, {} triplets, {} rows",
                chunk_index,
                chunk.len(),
                stats.triplets,
                rows.len()
            );
        }

        log::info!(
            "✅ Wrote {} rows in {} chunks ({} triplets, {} missing)",
            report.rows,
            report.chunks,
            report.triplets,
            report.missing_observations
        );
        Ok(report)
    }

    /// Run into memory
    pub fn collect(
        &self,
        points: &[Point],
        prepared: &PreparedFrames,
    ) -> VegResult<(Vec<MergedRow>, RunReport)> {
        let mut rows = Vec::new();
        let report = self.run(points, prepared, &mut rows, &CancellationToken::new())?;
        Ok((rows, report))
    }
}

fn covers_any(frame: &MaskedFrame, points: &[Point]) -> bool {
    points.iter().any(|p| frame.footprint.contains(&p.geometry))
}

/// Export errors name the point chunk, which may be non-empty even when the
/// sink received no rows
fn with_point_bounds(error: VegError, chunk: &[Point]) -> VegError {
    match (error, chunk.first(), chunk.last()) {
        (VegError::Export { chunk: index, message, .. }, Some(first), Some(last)) => VegError::Export {
            chunk: index,
            first_id: first.id.clone(),
            last_id: last.id.clone(),
            message,
        },
        (other, _, _) => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use ndarray::Array2;
    use std::collections::HashMap;

    fn frame(id: &str, nir: f32, red: f32, cloud: f32) -> Frame {
        let shape = (2, 2);
        let mut bands = HashMap::new();
        bands.insert("MSK_CLDPRB".to_string(), Array2::from_elem(shape, cloud));
        bands.insert("MSK_SNWPRB".to_string(), Array2::<f32>::zeros(shape));
        bands.insert("SCL".to_string(), Array2::from_elem(shape, 4.0f32));
        bands.insert("B8".to_string(), Array2::from_elem(shape, nir));
        bands.insert("B4".to_string(), Array2::from_elem(shape, red));
        Frame::new(id, bands, GeoTransform::north_up(0.0, 20.0, 10.0))
    }

    #[test]
    fn test_short_frame_id_rejected_not_truncated() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let frames = vec![frame("2019010_A", 3.0, 1.0, 0.0), frame("20190101_A", 3.0, 1.0, 0.0)];
        let prepared = pipeline.prepare_frames(frames.into_iter().map(Ok)).unwrap();

        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared.rejected().len(), 1);
        assert_eq!(prepared.rejected()[0].frame_id, "2019010_A");
        assert_eq!(prepared.date_keys(), vec!["20190101".to_string()]);
    }

    #[test]
    fn test_duplicate_frame_id_is_fatal() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let frames = vec![frame("20190101_A", 3.0, 1.0, 0.0), frame("20190101_A", 3.0, 1.0, 0.0)];
        assert!(matches!(
            pipeline.prepare_frames(frames.into_iter().map(Ok)),
            Err(VegError::DuplicateId { kind: "frame", .. })
        ));
    }

    #[test]
    fn test_source_failure_is_fatal() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let frames: Vec<VegResult<Frame>> = vec![
            Ok(frame("20190101_A", 3.0, 1.0, 0.0)),
            Err(VegError::Processing("backend unreachable".to_string())),
        ];
        match pipeline.prepare_frames(frames) {
            Err(VegError::Source { context, .. }) => assert_eq!(context, "frame #1"),
            other => panic!("unexpected result: {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_missing_band_rejected_per_frame() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let mut broken = frame("20190102_A", 3.0, 1.0, 0.0);
        broken.bands.remove("B8");
        let frames = vec![broken, frame("20190101_A", 3.0, 1.0, 0.0)];
        let prepared = pipeline.prepare_frames(frames.into_iter().map(Ok)).unwrap();
        assert_eq!(prepared.len(), 1);
        assert!(prepared.rejected()[0].reason.contains("B8"));
    }

    #[test]
    fn test_cancelled_before_first_chunk() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let prepared = pipeline
            .prepare_frames(vec![Ok(frame("20190101_A", 3.0, 1.0, 0.0))])
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut rows: Vec<MergedRow> = Vec::new();
        let err = pipeline
            .run(&[Point::new("p1", 5.0, 5.0)], &prepared, &mut rows, &cancel)
            .unwrap_err();
        assert!(matches!(err, VegError::Cancelled { chunks_flushed: 0 }));
        assert!(rows.is_empty());
    }

    #[test]
    fn test_cloudy_frame_gives_sentinel_cell() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let frames = vec![
            Ok(frame("20190101_A", 3.0, 1.0, 10.0)),
            Ok(frame("20190105_A", 3.0, 1.0, 0.0)),
        ];
        let prepared = pipeline.prepare_frames(frames).unwrap();
        let (rows, report) = pipeline.collect(&[Point::new("p1", 5.0, 5.0)], &prepared).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("20190101"), Some(-9999.0));
        assert_eq!(rows[0].get("20190105"), Some(0.5));
        assert_eq!(report.missing_observations, 1);
        assert_eq!(report.triplets, 2);
    }

    #[test]
    fn test_header_skips_frames_covering_no_point() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let mut remote = frame("20190202_A", 3.0, 1.0, 0.0);
        remote.footprint = crate::types::BoundingBox { min_x: 1000.0, max_x: 1020.0, min_y: 0.0, max_y: 20.0 };
        let prepared = pipeline
            .prepare_frames(vec![Ok(frame("20190101_A", 3.0, 1.0, 0.0)), Ok(remote)])
            .unwrap();
        let points = [Point::new("p1", 5.0, 5.0)];

        assert_eq!(prepared.date_keys().len(), 2);
        assert_eq!(pipeline.header_keys(&points, &prepared), vec!["20190101".to_string()]);

        let mut exporter = crate::io::CsvExporter::new(
            Vec::new(),
            pipeline.header_keys(&points, &prepared),
            crate::config::FillMissing::Sentinel,
            -9999.0,
        )
        .unwrap();
        pipeline.run(&points, &prepared, &mut exporter, &CancellationToken::new()).unwrap();
        let text = String::from_utf8(exporter.into_inner().unwrap()).unwrap();
        assert_eq!(text, "id,20190101\np1,0.5\n");
    }

    /// Sink whose export always fails without knowing any row ids
    struct FailingSink;

    impl RowSink for FailingSink {
        fn write_chunk(&mut self, _rows: &[MergedRow]) -> VegResult<()> {
            Err(VegError::Export {
                chunk: 0,
                first_id: String::new(),
                last_id: String::new(),
                message: "disk full".to_string(),
            })
        }
    }

    #[test]
    fn test_export_error_names_point_chunk_when_rows_empty() {
        let config = PipelineConfig { emit_empty_rows: false, chunk_size: 2, ..Default::default() };
        let pipeline = Pipeline::new(config).unwrap();
        let prepared = pipeline
            .prepare_frames(vec![Ok(frame("20190101_A", 3.0, 1.0, 0.0))])
            .unwrap();
        let points = [Point::new("far1", 900.0, 900.0), Point::new("far2", 901.0, 900.0)];

        match pipeline.run(&points, &prepared, &mut FailingSink, &CancellationToken::new()) {
            Err(VegError::Export { first_id, last_id, message, .. }) => {
                assert_eq!(first_id, "far1");
                assert_eq!(last_id, "far2");
                assert_eq!(message, "disk full");
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.rows)),
        }
    }
}
