use ndarray::Zip;
use num_traits::Float;

use crate::config::PipelineConfig;
use crate::types::{BandImage, Frame, MaskedFrame, ValidMask, VegError, VegResult};

/// Cloud/shadow masking and index band parameters
#[derive(Debug, Clone)]
pub struct CloudMaskParams {
    /// Cloud and snow probabilities must be strictly below this
    pub threshold: f32,
    pub cloud_band: String,
    pub snow_band: String,
    pub scene_class_band: String,
    pub shadow_code: u8,
    pub cirrus_code: u8,
    /// Normalized difference operands (A, B)
    pub index_bands: (String, String),
}

impl Default for CloudMaskParams {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for CloudMaskParams {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            threshold: config.cloud_threshold,
            cloud_band: config.cloud_band.clone(),
            snow_band: config.snow_band.clone(),
            scene_class_band: config.scene_class_band.clone(),
            shadow_code: config.shadow_code,
            cirrus_code: config.cirrus_code,
            index_bands: config.index_bands.clone(),
        }
    }
}

/// Normalized difference `(a - b) / (a + b)`
///
/// `None` when either operand is non-finite or the denominator is zero.
pub fn normalized_difference<T: Float>(a: T, b: T) -> Option<T> {
    if !a.is_finite() || !b.is_finite() {
        return None;
    }
    let denominator = a + b;
    if denominator == T::zero() {
        return None;
    }
    let value = (a - b) / denominator;
    value.is_finite().then_some(value)
}

/// Per-frame cloud masking and derived index computation
pub struct RasterPreprocessor {
    params: CloudMaskParams,
}

impl RasterPreprocessor {
    pub fn new(params: CloudMaskParams) -> Self {
        Self { params }
    }

    /// Sentinel-2 L2A defaults
    pub fn standard() -> Self {
        Self::new(CloudMaskParams::default())
    }

    pub fn params(&self) -> &CloudMaskParams {
        &self.params
    }

    /// Pixel predicate over the auxiliary bands
    ///
    /// Valid iff cloud < T and snow < T and the scene class is neither
    /// shadow nor cirrus. NaN probabilities fail the comparison.
    pub fn is_clear(&self, cloud_probability: f32, snow_probability: f32, scene_class: f32) -> bool {
        let class = scene_class.round();
        cloud_probability < self.params.threshold
            && snow_probability < self.params.threshold
            && class != f32::from(self.params.shadow_code)
            && class != f32::from(self.params.cirrus_code)
    }

    /// Produce the masked frame with its index band
    ///
    /// The input frame is left untouched. Index cells outside the mask hold
    /// NaN and are never sampled downstream.
    pub fn process(&self, frame: &Frame) -> VegResult<MaskedFrame> {
        log::debug!("Masking frame {}", frame.id);

        if !frame.geo_transform.is_north_up() {
            return Err(VegError::InvalidFrame {
                frame_id: frame.id.clone(),
                reason: "rotated geotransforms are not supported".to_string(),
            });
        }

        let cloud = self.required_band(frame, &self.params.cloud_band)?;
        let snow = self.required_band(frame, &self.params.snow_band)?;
        let scl = self.required_band(frame, &self.params.scene_class_band)?;
        let band_a = self.required_band(frame, &self.params.index_bands.0)?;
        let band_b = self.required_band(frame, &self.params.index_bands.1)?;

        let shape = cloud.dim();
        for (name, band) in &frame.bands {
            if band.dim() != shape {
                return Err(VegError::InvalidFrame {
                    frame_id: frame.id.clone(),
                    reason: format!(
                        "band '{}' is {:?}, expected {:?}",
                        name,
                        band.dim(),
                        shape
                    ),
                });
            }
        }

        let clear: ValidMask = Zip::from(cloud)
            .and(snow)
            .and(scl)
            .map_collect(|&c, &s, &k| self.is_clear(c, s, k));

        let index: BandImage = Zip::from(&clear)
            .and(band_a)
            .and(band_b)
            .map_collect(|&ok, &a, &b| {
                if ok {
                    normalized_difference(a, b).unwrap_or(f32::NAN)
                } else {
                    f32::NAN
                }
            });

        let valid_mask: ValidMask = index.mapv(|v| v.is_finite());

        let masked = MaskedFrame {
            id: frame.id.clone(),
            index,
            valid_mask,
            geo_transform: frame.geo_transform,
            footprint: frame.footprint,
        };

        log::debug!(
            "Frame {}: {}/{} valid pixels",
            masked.id,
            masked.valid_pixels(),
            shape.0 * shape.1
        );

        Ok(masked)
    }

    fn required_band<'a>(&self, frame: &'a Frame, name: &str) -> VegResult<&'a BandImage> {
        frame.band(name).ok_or_else(|| VegError::InvalidFrame {
            frame_id: frame.id.clone(),
            reason: format!("missing band '{}'", name),
        })
    }
}
