//! Core processing stages

pub mod cloud_mask;
pub mod spatial_reduce;
pub mod pivot;
pub mod granule_merge;
pub mod summary;
pub mod pipeline;

// Re-export main types
pub use cloud_mask::{RasterPreprocessor, CloudMaskParams, normalized_difference};
pub use spatial_reduce::{SpatialReducer, ReduceParams, ReductionOutput, ReductionStats};
pub use pivot::TemporalPivot;
pub use granule_merge::GranuleMerger;
pub use summary::{max_per_point, PointSummary};
pub use pipeline::{Pipeline, PreparedFrames, RunReport, CancellationToken};
