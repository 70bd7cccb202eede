use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Single raster band (rows x cols)
pub type BandImage = Array2<f32>;

/// Pixel validity mask (true = usable)
pub type ValidMask = Array2<bool>;

/// Point geometry in the raster coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub x: f64,
    pub y: f64,
}

/// Sample location with a stable identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: String,
    pub geometry: GeoPoint,
}

impl Point {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            geometry: GeoPoint { x, y },
        }
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Edge-inclusive containment test
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn is_north_up(&self) -> bool {
        self.rotation_x == 0.0 && self.rotation_y == 0.0
    }

    /// Fractional (col, row) position of a coordinate
    pub fn to_pixel(&self, point: &GeoPoint) -> (f64, f64) {
        let col = (point.x - self.top_left_x) / self.pixel_width;
        let row = (point.y - self.top_left_y) / self.pixel_height;
        (col, row)
    }

    /// Extent covered by a (rows, cols) grid
    pub fn extent(&self, shape: (usize, usize)) -> BoundingBox {
        let (rows, cols) = shape;
        let x0 = self.top_left_x;
        let x1 = self.top_left_x + self.pixel_width * cols as f64;
        let y0 = self.top_left_y;
        let y1 = self.top_left_y + self.pixel_height * rows as f64;
        BoundingBox {
            min_x: x0.min(x1),
            max_x: x0.max(x1),
            min_y: y0.min(y1),
            max_y: y0.max(y1),
        }
    }
}

/// One raster acquisition (granule)
///
/// The first `date_prefix_length` characters of `id` encode the acquisition
/// date as `YYYYMMDD`.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: String,
    pub bands: HashMap<String, BandImage>,
    pub geo_transform: GeoTransform,
    pub footprint: BoundingBox,
}

impl Frame {
    /// Build a frame whose footprint is the full extent of its grid
    pub fn new(
        id: impl Into<String>,
        bands: HashMap<String, BandImage>,
        geo_transform: GeoTransform,
    ) -> Self {
        let shape = bands
            .values()
            .next()
            .map(|b| b.dim())
            .unwrap_or((0, 0));
        Self {
            id: id.into(),
            footprint: geo_transform.extent(shape),
            bands,
            geo_transform,
        }
    }

    pub fn band(&self, name: &str) -> Option<&BandImage> {
        self.bands.get(name)
    }
}

/// Cloud-masked frame carrying the derived index band
#[derive(Debug, Clone)]
pub struct MaskedFrame {
    pub id: String,
    pub index: BandImage,
    pub valid_mask: ValidMask,
    pub geo_transform: GeoTransform,
    pub footprint: BoundingBox,
}

impl MaskedFrame {
    pub fn valid_pixels(&self) -> usize {
        self.valid_mask.iter().filter(|&&v| v).count()
    }
}

/// Point-level observation: (point, frame, value)
///
/// `value` is the sentinel when no valid pixel was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triplet {
    pub point_id: String,
    pub frame_id: String,
    pub value: f64,
}

impl Triplet {
    pub fn new(point_id: impl Into<String>, frame_id: impl Into<String>, value: f64) -> Self {
        Self {
            point_id: point_id.into(),
            frame_id: frame_id.into(),
            value,
        }
    }

    pub fn is_missing(&self, sentinel: f64) -> bool {
        self.value == sentinel
    }
}

/// Wide row keyed by frame id
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PivotedRow {
    pub id: String,
    pub columns: BTreeMap<String, f64>,
}

impl PivotedRow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            columns: BTreeMap::new(),
        }
    }
}

/// Wide row keyed by acquisition date
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedRow {
    pub id: String,
    pub columns: BTreeMap<String, f64>,
}

impl MergedRow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            columns: BTreeMap::new(),
        }
    }

    pub fn get(&self, date_key: &str) -> Option<f64> {
        self.columns.get(date_key).copied()
    }

    /// Chronological series; sentinel cells come back as `None`.
    ///
    /// Keys that do not parse as `YYYYMMDD` are skipped.
    pub fn time_series(&self, sentinel: f64) -> Vec<(NaiveDate, Option<f64>)> {
        let mut series: Vec<(NaiveDate, Option<f64>)> = self
            .columns
            .iter()
            .filter_map(|(key, &value)| {
                let date = NaiveDate::parse_from_str(key, "%Y%m%d").ok()?;
                let value = if value == sentinel { None } else { Some(value) };
                Some((date, value))
            })
            .collect();
        series.sort_by_key(|(date, _)| *date);
        series
    }
}

impl From<MergedRow> for PivotedRow {
    fn from(row: MergedRow) -> Self {
        Self {
            id: row.id,
            columns: row.columns,
        }
    }
}

/// Why a frame was excluded from the run
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRejection {
    pub frame_id: String,
    pub reason: String,
}

/// Error types for time-series extraction
#[derive(Debug, thiserror::Error)]
pub enum VegError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid frame id '{frame_id}': {reason}")]
    InvalidFrameId { frame_id: String, reason: String },

    #[error("Invalid frame '{frame_id}': {reason}")]
    InvalidFrame { frame_id: String, reason: String },

    #[error("Duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    #[error("Duplicate observation for point '{point_id}' in frame '{frame_id}'")]
    DuplicateObservation { point_id: String, frame_id: String },

    #[error("Source failure ({context}): {message}")]
    Source { context: String, message: String },

    #[error("Export failed on chunk {chunk} (points '{first_id}'..'{last_id}'): {message}")]
    Export {
        chunk: usize,
        first_id: String,
        last_id: String,
        message: String,
    },

    #[error("Run cancelled after {chunks_flushed} flushed chunk(s)")]
    Cancelled { chunks_flushed: usize },

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for extraction operations
pub type VegResult<T> = Result<T, VegError>;
