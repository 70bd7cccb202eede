use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::config::FillMissing;
use crate::types::{MergedRow, VegError, VegResult};

/// Consumer of merged rows, fed one chunk at a time
pub trait RowSink {
    /// Persist a chunk; on return the chunk must be durable
    fn write_chunk(&mut self, rows: &[MergedRow]) -> VegResult<()>;
}

impl RowSink for Vec<MergedRow> {
    fn write_chunk(&mut self, rows: &[MergedRow]) -> VegResult<()> {
        self.extend_from_slice(rows);
        Ok(())
    }
}

/// Delimited table writer with a header fixed up front
///
/// The header is `id` followed by the sorted date keys. Every chunk is
/// flushed before `write_chunk` returns, so an interrupted run leaves a
/// valid file holding all completed chunks.
pub struct CsvExporter<W: Write> {
    writer: csv::Writer<W>,
    date_keys: Vec<String>,
    fill: FillMissing,
    sentinel: f64,
    chunks_flushed: usize,
    rows_written: usize,
}

impl CsvExporter<File> {
    pub fn create<P: AsRef<Path>>(
        path: P,
        date_keys: impl IntoIterator<Item = String>,
        fill: FillMissing,
        sentinel: f64,
    ) -> VegResult<Self> {
        log::info!("Writing time series to: {}", path.as_ref().display());
        let file = File::create(path.as_ref())?;
        Self::new(file, date_keys, fill, sentinel)
    }
}

impl<W: Write> CsvExporter<W> {
    pub fn new(
        writer: W,
        date_keys: impl IntoIterator<Item = String>,
        fill: FillMissing,
        sentinel: f64,
    ) -> VegResult<Self> {
        let date_keys: Vec<String> = date_keys
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut writer = csv::Writer::from_writer(writer);
        let header = std::iter::once("id").chain(date_keys.iter().map(String::as_str));
        writer.write_record(header)?;
        writer.flush()?;

        log::debug!("Export header: id + {} date columns", date_keys.len());

        Ok(Self {
            writer,
            date_keys,
            fill,
            sentinel,
            chunks_flushed: 0,
            rows_written: 0,
        })
    }

    pub fn date_keys(&self) -> &[String] {
        &self.date_keys
    }

    pub fn chunks_flushed(&self) -> usize {
        self.chunks_flushed
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(self) -> VegResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| VegError::Io(std::io::Error::new(e.error().kind(), e.error().to_string())))
    }

    fn record(&self, row: &MergedRow) -> Result<Vec<String>, String> {
        if let Some(extra) = row.columns.keys().find(|k| self.date_keys.binary_search(k).is_err()) {
            return Err(format!("row '{}' has date '{}' outside the header", row.id, extra));
        }
        let mut record = Vec::with_capacity(self.date_keys.len() + 1);
        record.push(row.id.clone());
        for key in &self.date_keys {
            let cell = match (row.columns.get(key), self.fill) {
                (Some(value), _) => value.to_string(),
                (None, FillMissing::Sentinel) => self.sentinel.to_string(),
                (None, FillMissing::Blank) => String::new(),
            };
            record.push(cell);
        }
        Ok(record)
    }
}

impl<W: Write> RowSink for CsvExporter<W> {
    fn write_chunk(&mut self, rows: &[MergedRow]) -> VegResult<()> {
        let chunk = self.chunks_flushed;
        let export_error = |message: String| VegError::Export {
            chunk,
            first_id: rows.first().map(|r| r.id.clone()).unwrap_or_default(),
            last_id: rows.last().map(|r| r.id.clone()).unwrap_or_default(),
            message,
        };

        // Validate the whole chunk before any record reaches the writer
        let records = rows
            .iter()
            .map(|row| self.record(row))
            .collect::<Result<Vec<_>, _>>()
            .map_err(&export_error)?;
        for record in &records {
            self.writer
                .write_record(record)
                .map_err(|e| export_error(e.to_string()))?;
        }
        self.writer.flush().map_err(|e| export_error(e.to_string()))?;

        self.chunks_flushed += 1;
        self.rows_written += rows.len();
        log::debug!("Flushed chunk {} ({} rows)", chunk, rows.len());
        Ok(())
    }
}

/// Write fully materialized rows, deriving the header from their union
pub fn write_rows<W: Write>(
    writer: W,
    rows: &[MergedRow],
    fill: FillMissing,
    sentinel: f64,
) -> VegResult<W> {
    let keys: BTreeSet<String> = rows
        .iter()
        .flat_map(|row| row.columns.keys().cloned())
        .collect();
    let mut exporter = CsvExporter::new(writer, keys, fill, sentinel)?;
    exporter.write_chunk(rows)?;
    exporter.into_inner()
}
