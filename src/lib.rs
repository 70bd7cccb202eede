//! verdine: cloud-masked vegetation index time series for point sets
//!
//! Turns a stack of Sentinel-2 frames and a fixed set of sample points into
//! a per-point table with one column per acquisition date. Cloud, snow,
//! shadow and cirrus pixels are masked, each (point, frame) pair is reduced
//! to one value, and same-day granules are merged.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    Point, GeoPoint, Frame, MaskedFrame, Triplet, PivotedRow, MergedRow,
    BoundingBox, GeoTransform, FrameRejection, VegError, VegResult
};
pub use config::{PipelineConfig, DuplicatePolicy, FillMissing};
pub use self::core::{
    RasterPreprocessor, SpatialReducer, TemporalPivot, GranuleMerger,
    Pipeline, PreparedFrames, RunReport, CancellationToken
};
pub use io::{CsvExporter, PointReader, RowSink};
