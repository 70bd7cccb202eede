use serde::Deserialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use crate::types::{Point, VegError, VegResult};

#[derive(Debug, Deserialize)]
struct PointRecord {
    id: String,
    x: f64,
    y: f64,
}

/// Reader for sample point tables (`id,x,y`)
pub struct PointReader;

impl PointReader {
    pub fn read_csv<P: AsRef<Path>>(path: P) -> VegResult<Vec<Point>> {
        log::info!("Reading points from: {}", path.as_ref().display());
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    /// Parse points; ids must be unique
    pub fn from_reader<R: Read>(reader: R) -> VegResult<Vec<Point>> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut seen = HashSet::new();
        let mut points = Vec::new();

        for record in csv_reader.deserialize::<PointRecord>() {
            let record = record?;
            if !seen.insert(record.id.clone()) {
                return Err(VegError::DuplicateId { kind: "point", id: record.id });
            }
            points.push(Point::new(record.id, record.x, record.y));
        }

        log::info!("Loaded {} points", points.len());
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_points() {
        let data = "id,x,y\n6, 80.1, 26.9\n7,81.0,27.2\n";
        let points = PointReader::from_reader(data.as_bytes()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], Point::new("6", 80.1, 26.9));
    }

    #[test]
    fn test_duplicate_point_id_rejected() {
        let data = "id,x,y\n6,80.1,26.9\n6,81.0,27.2\n";
        let err = PointReader::from_reader(data.as_bytes()).unwrap_err();
        assert!(matches!(err, VegError::DuplicateId { kind: "point", .. }));
    }

    #[test]
    fn test_malformed_coordinate_is_csv_error() {
        let data = "id,x,y\n6,east,26.9\n";
        assert!(matches!(PointReader::from_reader(data.as_bytes()), Err(VegError::Csv(_))));
    }
}
