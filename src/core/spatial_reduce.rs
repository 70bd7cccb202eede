use crate::types::{GeoPoint, MaskedFrame, Point, Triplet};

/// Point sampling parameters
#[derive(Debug, Clone)]
pub struct ReduceParams {
    /// Sampling resolution in raster coordinate units
    pub scale: f64,
    /// Value recorded when no valid pixel lies under a point
    pub sentinel: f64,
}

impl Default for ReduceParams {
    fn default() -> Self {
        Self {
            scale: 10.0,
            sentinel: -9999.0,
        }
    }
}

/// Counters for one reduction pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReductionStats {
    pub frames_examined: usize,
    /// Frames whose footprint holds none of the points
    pub frames_without_points: usize,
    pub triplets: usize,
    pub missing: usize,
}

/// Triplets plus the counters describing how they were produced
#[derive(Debug, Clone, Default)]
pub struct ReductionOutput {
    pub triplets: Vec<Triplet>,
    pub stats: ReductionStats,
}

/// Reduces masked frames to one observation per (point, frame) pair
pub struct SpatialReducer {
    params: ReduceParams,
}

impl SpatialReducer {
    pub fn new(params: ReduceParams) -> Self {
        Self { params }
    }

    pub fn reduce(&self, points: &[Point], frames: &[MaskedFrame]) -> Vec<Triplet> {
        self.reduce_with_stats(points, frames).triplets
    }

    /// Sample every frame at every point inside its footprint
    ///
    /// Output is grouped by frame in input order, then by point in input
    /// order. Frames covering no point contribute nothing.
    pub fn reduce_with_stats(&self, points: &[Point], frames: &[MaskedFrame]) -> ReductionOutput {
        #[cfg(feature = "parallel")]
        let per_frame: Vec<Vec<Triplet>> = {
            use rayon::prelude::*;
            frames
                .par_iter()
                .map(|frame| self.reduce_frame(points, frame))
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let per_frame: Vec<Vec<Triplet>> = frames
            .iter()
            .map(|frame| self.reduce_frame(points, frame))
            .collect();

        let mut stats = ReductionStats {
            frames_examined: frames.len(),
            ..Default::default()
        };
        let mut triplets = Vec::with_capacity(per_frame.iter().map(Vec::len).sum());
        for frame_triplets in per_frame {
            if frame_triplets.is_empty() {
                stats.frames_without_points += 1;
            }
            triplets.extend(frame_triplets);
        }
        stats.triplets = triplets.len();
        stats.missing = triplets
            .iter()
            .filter(|t| t.is_missing(self.params.sentinel))
            .count();

        log::debug!(
            "Reduced {} frames to {} triplets ({} missing, {} frames without points)",
            stats.frames_examined,
            stats.triplets,
            stats.missing,
            stats.frames_without_points
        );

        ReductionOutput { triplets, stats }
    }

    /// Observations of one frame for the points inside its footprint
    pub fn reduce_frame(&self, points: &[Point], frame: &MaskedFrame) -> Vec<Triplet> {
        points
            .iter()
            .filter(|point| frame.footprint.contains(&point.geometry))
            .map(|point| {
                let value = self
                    .sample(frame, &point.geometry)
                    .unwrap_or(self.params.sentinel);
                Triplet::new(point.id.clone(), frame.id.clone(), value)
            })
            .collect()
    }

    /// First valid index value under a point
    ///
    /// The pixel containing the point is tried first, then the rest of the
    /// `scale`-sized window centred on the point in row-major order.
    pub fn sample(&self, frame: &MaskedFrame, location: &GeoPoint) -> Option<f64> {
        let (rows, cols) = frame.index.dim();
        if rows == 0 || cols == 0 {
            return None;
        }

        let gt = &frame.geo_transform;
        let (col, row) = gt.to_pixel(location);
        let mut center = (row.floor() as i64, col.floor() as i64);
        // A point on the far edge of the grid belongs to the last pixel
        if row == rows as f64 {
            center.0 -= 1;
        }
        if col == cols as f64 {
            center.1 -= 1;
        }

        let in_grid = |r: i64, c: i64| r >= 0 && c >= 0 && (r as usize) < rows && (c as usize) < cols;
        let read = |r: i64, c: i64| -> Option<f64> {
            let (r, c) = (r as usize, c as usize);
            if frame.valid_mask[[r, c]] {
                Some(frame.index[[r, c]] as f64)
            } else {
                None
            }
        };

        if in_grid(center.0, center.1) {
            if let Some(value) = read(center.0, center.1) {
                return Some(value);
            }
        }

        let half = self.params.scale / 2.0;
        let (c_a, r_a) = gt.to_pixel(&GeoPoint { x: location.x - half, y: location.y - half });
        let (c_b, r_b) = gt.to_pixel(&GeoPoint { x: location.x + half, y: location.y + half });
        let (row_lo, row_hi) = Self::pixel_span(r_a, r_b);
        let (col_lo, col_hi) = Self::pixel_span(c_a, c_b);

        let row_lo = row_lo.max(0);
        let col_lo = col_lo.max(0);
        let row_hi = row_hi.min(rows as i64 - 1);
        let col_hi = col_hi.min(cols as i64 - 1);

        for r in row_lo..=row_hi {
            for c in col_lo..=col_hi {
                if (r, c) == center {
                    continue;
                }
                if let Some(value) = read(r, c) {
                    return Some(value);
                }
            }
        }
        None
    }

    /// Pixel indices overlapped by the fractional interval [a, b]
    fn pixel_span(a: f64, b: f64) -> (i64, i64) {
        let lo = a.min(b);
        let hi = a.max(b);
        let first = lo.floor() as i64;
        let last = (hi.ceil() as i64 - 1).max(first);
        (first, last)
    }
}
