use std::collections::btree_map::Entry;

use crate::io::frame_id::FrameIdParser;
use crate::types::{MergedRow, PivotedRow, VegResult};

/// Collapses same-date granule columns into one column per date
///
/// Overlapping granules from one orbit pass are processed independently, so
/// the same pixel can carry slightly different values on the same day. The
/// representative value of a date group is the maximum of its raw values.
/// The sentinel sits far below the index range, so any valid observation
/// wins over a missing one and an all-missing group stays at the sentinel.
#[derive(Debug, Clone)]
pub struct GranuleMerger {
    parser: FrameIdParser,
}

impl GranuleMerger {
    pub fn new(date_prefix_length: usize) -> VegResult<Self> {
        Ok(Self {
            parser: FrameIdParser::new(date_prefix_length)?,
        })
    }

    pub fn with_parser(parser: FrameIdParser) -> Self {
        Self { parser }
    }

    /// Merge one row; a column key without a date prefix is an error
    pub fn merge_row(&self, row: &PivotedRow) -> VegResult<MergedRow> {
        let mut merged = MergedRow::new(row.id.clone());
        for (frame_id, &value) in &row.columns {
            let date_key = self.parser.date_key(frame_id)?;
            match merged.columns.entry(date_key.to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
                Entry::Occupied(mut slot) => {
                    let best = slot.get().max(value);
                    slot.insert(best);
                }
            }
        }
        Ok(merged)
    }

    pub fn merge_rows(&self, rows: &[PivotedRow]) -> VegResult<Vec<MergedRow>> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            rows.par_iter().map(|row| self.merge_row(row)).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            rows.iter().map(|row| self.merge_row(row)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VegError;

    const SENTINEL: f64 = -9999.0;

    fn row(id: &str, cells: &[(&str, f64)]) -> PivotedRow {
        let mut row = PivotedRow::new(id);
        for (key, value) in cells {
            row.columns.insert(key.to_string(), *value);
        }
        row
    }

    fn merger() -> GranuleMerger {
        GranuleMerger::new(8).unwrap()
    }

    #[test]
    fn test_valid_value_beats_sentinel() {
        let input = row(
            "p1",
            &[("20190101_A", 0.50), ("20190101_B", SENTINEL), ("20190105_A", 0.30)],
        );
        let merged = merger().merge_row(&input).unwrap();
        assert_eq!(merged.id, "p1");
        assert_eq!(merged.columns.len(), 2);
        assert_eq!(merged.get("20190101"), Some(0.50));
        assert_eq!(merged.get("20190105"), Some(0.30));
    }

    #[test]
    fn test_all_missing_stays_sentinel() {
        let input = row("p1", &[("20190101_A", SENTINEL), ("20190101_B", SENTINEL)]);
        let merged = merger().merge_row(&input).unwrap();
        assert_eq!(merged.get("20190101"), Some(SENTINEL));
    }

    #[test]
    fn test_overlap_seam_takes_max() {
        let input = row("p1", &[("20190101_A", 0.41), ("20190101_B", 0.43), ("20190101_C", -0.2)]);
        let merged = merger().merge_row(&input).unwrap();
        assert_eq!(merged.get("20190101"), Some(0.43));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let input = row(
            "p1",
            &[("20190101_A", 0.5), ("20190101_B", 0.2), ("20190203_A", SENTINEL)],
        );
        let once = merger().merge_row(&input).unwrap();
        let twice = merger().merge_row(&PivotedRow::from(once.clone())).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_order_independent() {
        let forward = row("p1", &[("20190101_A", 0.1), ("20190101_B", 0.7), ("20190101_C", SENTINEL)]);
        let reversed = row("p1", &[("20190101_C", SENTINEL), ("20190101_B", 0.7), ("20190101_A", 0.1)]);
        assert_eq!(merger().merge_row(&forward).unwrap(), merger().merge_row(&reversed).unwrap());
    }

    #[test]
    fn test_id_only_row_stays_empty() {
        let merged = merger().merge_row(&PivotedRow::new("p9")).unwrap();
        assert!(merged.columns.is_empty());
    }

    #[test]
    fn test_short_column_key_rejected() {
        let input = row("p1", &[("2019010", 0.5)]);
        let err = merger().merge_row(&input).unwrap_err();
        assert!(matches!(err, VegError::InvalidFrameId { .. }));
    }

    #[test]
    fn test_merge_rows_keeps_row_order() {
        let rows = vec![
            row("p1", &[("20190101_A", 0.1)]),
            row("p2", &[("20190101_A", 0.2)]),
            row("p3", &[("20190101_A", 0.3)]),
        ];
        let merged = merger().merge_rows(&rows).unwrap();
        let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }
}
