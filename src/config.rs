//! Run configuration

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::{VegError, VegResult};

/// Resolution rule for repeated (point, frame) observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail the run on the first repeated pair
    Reject,
    /// Keep the earliest observation in input order
    FirstWins,
    /// Keep the latest observation in input order
    LastWins,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        DuplicatePolicy::Reject
    }
}

/// What an exported cell holds when a row has no value for a date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMissing {
    Sentinel,
    Blank,
}

impl Default for FillMissing {
    fn default() -> Self {
        FillMissing::Sentinel
    }
}

/// Pipeline parameters
///
/// Defaults follow Sentinel-2 L2A band naming and scene classification codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cloud and snow probability threshold (percent, exclusive)
    pub cloud_threshold: f32,
    pub cloud_band: String,
    pub snow_band: String,
    pub scene_class_band: String,
    /// Scene classification value for cloud shadow
    pub shadow_code: u8,
    /// Scene classification value for cirrus
    pub cirrus_code: u8,
    /// (A, B) for the normalized difference (A - B) / (A + B)
    pub index_bands: (String, String),
    pub index_name: String,
    /// Sampling resolution in raster coordinate units
    pub scale: f64,
    /// Value stored for "no valid observation"
    pub sentinel: f64,
    pub date_prefix_length: usize,
    /// Inclusive lower bound on acquisition date
    pub start_date: Option<NaiveDate>,
    /// Exclusive upper bound on acquisition date
    pub end_date: Option<NaiveDate>,
    pub duplicate_policy: DuplicatePolicy,
    /// Points per streamed chunk
    pub chunk_size: usize,
    pub fill_missing: FillMissing,
    /// Emit an id-only row for points with no observations
    pub emit_empty_rows: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cloud_threshold: 5.0,
            cloud_band: "MSK_CLDPRB".to_string(),
            snow_band: "MSK_SNWPRB".to_string(),
            scene_class_band: "SCL".to_string(),
            shadow_code: 3,
            cirrus_code: 10,
            index_bands: ("B8".to_string(), "B4".to_string()),
            index_name: "ndvi".to_string(),
            scale: 10.0,
            sentinel: -9999.0,
            date_prefix_length: 8,
            start_date: None,
            end_date: None,
            duplicate_policy: DuplicatePolicy::default(),
            chunk_size: 500,
            fill_missing: FillMissing::default(),
            emit_empty_rows: true,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; absent fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> VegResult<Self> {
        log::info!("Reading configuration from: {}", path.as_ref().display());
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VegResult<()> {
        if !self.cloud_threshold.is_finite() || self.cloud_threshold <= 0.0 {
            return Err(VegError::InvalidConfig(format!(
                "cloud_threshold must be a positive number, got {}",
                self.cloud_threshold
            )));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(VegError::InvalidConfig(format!(
                "scale must be a positive number, got {}",
                self.scale
            )));
        }
        // Valid index values live in [-1, 1]
        if !self.sentinel.is_finite() || (-1.0..=1.0).contains(&self.sentinel) {
            return Err(VegError::InvalidConfig(format!(
                "sentinel {} collides with the index value range [-1, 1]",
                self.sentinel
            )));
        }
        if self.date_prefix_length == 0 {
            return Err(VegError::InvalidConfig(
                "date_prefix_length must be at least 1".to_string(),
            ));
        }
        if self.index_bands.0 == self.index_bands.1 {
            return Err(VegError::InvalidConfig(format!(
                "index bands must differ, got '{}' twice",
                self.index_bands.0
            )));
        }
        if self.chunk_size == 0 {
            return Err(VegError::InvalidConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start >= end {
                return Err(VegError::InvalidConfig(format!(
                    "start_date {} must precede end_date {}",
                    start, end
                )));
            }
        }
        Ok(())
    }

    /// Whether an acquisition date falls inside `[start_date, end_date)`
    pub fn accepts_date(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |start| date >= start)
            && self.end_date.map_or(true, |end| date < end)
    }
}
