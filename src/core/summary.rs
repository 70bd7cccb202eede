//! Per-point summaries of merged series

use serde::Serialize;

use crate::types::MergedRow;

/// Maximum index value observed at one point across its series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointSummary {
    pub id: String,
    /// `None` when every date is missing
    pub max: Option<f64>,
    pub valid_dates: usize,
    pub total_dates: usize,
}

/// Peak value per point, ignoring sentinel cells
pub fn max_per_point(rows: &[MergedRow], sentinel: f64) -> Vec<PointSummary> {
    rows.iter()
        .map(|row| {
            let valid: Vec<f64> = row
                .columns
                .values()
                .copied()
                .filter(|&v| v != sentinel)
                .collect();
            PointSummary {
                id: row.id.clone(),
                max: valid.iter().copied().reduce(f64::max),
                valid_dates: valid.len(),
                total_dates: row.columns.len(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_per_point() {
        let mut a = MergedRow::new("p1");
        a.columns.insert("20190101".into(), 0.2);
        a.columns.insert("20190201".into(), 0.8);
        a.columns.insert("20190301".into(), -9999.0);
        let mut b = MergedRow::new("p2");
        b.columns.insert("20190101".into(), -9999.0);
        let c = MergedRow::new("p3");

        let summaries = max_per_point(&[a, b, c], -9999.0);
        assert_eq!(summaries[0].max, Some(0.8));
        assert_eq!(summaries[0].valid_dates, 2);
        assert_eq!(summaries[0].total_dates, 3);
        assert_eq!(summaries[1].max, None);
        assert_eq!(summaries[1].total_dates, 1);
        assert_eq!(summaries[2].max, None);
        assert_eq!(summaries[2].total_dates, 0);
    }
}
