use gdal::{Dataset, Metadata};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::types::{Frame, GeoTransform, VegError, VegResult};

/// GeoTIFF frame reader
///
/// Each file is one granule: the file stem is the frame id and band
/// descriptions name the bands (`B8`, `MSK_CLDPRB`, ...). Bands without a
/// description are named by their 1-based index.
pub struct FrameReader;

impl FrameReader {
    pub fn read_frame<P: AsRef<Path>>(path: P) -> VegResult<Frame> {
        let path = path.as_ref();
        let frame_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| VegError::Source {
                context: path.display().to_string(),
                message: "path has no file name".to_string(),
            })?;

        log::debug!("Reading frame {} from {}", frame_id, path.display());

        let dataset = Dataset::open(path)?;
        let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let (width, height) = dataset.raster_size();

        let mut bands = HashMap::new();
        for index in 1..=dataset.raster_count() {
            let rasterband = dataset.rasterband(index)?;
            let name = match rasterband.description() {
                Ok(desc) if !desc.trim().is_empty() => desc.trim().to_string(),
                _ => index.to_string(),
            };
            let buffer = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
            let band = Array2::from_shape_vec((height, width), buffer.data)
                .map_err(|e| VegError::Processing(format!("Failed to reshape band {}: {}", name, e)))?;
            bands.insert(name, band);
        }

        Ok(Frame::new(frame_id, bands, geo_transform))
    }

    /// Sorted `.tif`/`.tiff` files of a directory
    pub fn list_frames<P: AsRef<Path>>(dir: P) -> VegResult<Vec<PathBuf>> {
        let dir_error = |e: std::io::Error| VegError::Source {
            context: format!("frame directory {}", dir.as_ref().display()),
            message: e.to_string(),
        };
        let entries = std::fs::read_dir(dir.as_ref())
            .map_err(dir_error)?
            .map(|entry| entry.map(|e| e.path()).map_err(dir_error))
            .collect::<VegResult<Vec<PathBuf>>>()?;
        let mut files: Vec<PathBuf> = entries
            .into_iter()
            .filter(|path| {
                path.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        log::info!("Found {} frame files in {}", files.len(), dir.as_ref().display());
        Ok(files)
    }

    /// Lazily read every frame of a directory
    pub fn read_dir<P: AsRef<Path>>(dir: P) -> VegResult<impl Iterator<Item = VegResult<Frame>>> {
        let files = Self::list_frames(dir)?;
        Ok(files.into_iter().map(|path| {
            Self::read_frame(&path).map_err(|e| VegError::Source {
                context: format!("frame file {}", path.display()),
                message: e.to_string(),
            })
        }))
    }
}
