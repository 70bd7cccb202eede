//! I/O modules for reading points and frames and writing series tables

pub mod export;
pub mod frame_id;
#[cfg(feature = "gdal")]
pub mod frame_reader;
pub mod points;

pub use export::{write_rows, CsvExporter, RowSink};
pub use frame_id::FrameIdParser;
#[cfg(feature = "gdal")]
pub use frame_reader::FrameReader;
pub use points::PointReader;
