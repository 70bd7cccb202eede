use verdine::types::{PivotedRow, Triplet};
use verdine::io::write_rows;
use verdine::{DuplicatePolicy, FillMissing, GranuleMerger, TemporalPivot};

const SENTINEL: f64 = -9999.0;

fn pivot_and_merge(triplets: &[Triplet]) -> Vec<verdine::MergedRow> {
    let rows = TemporalPivot::default().pivot(triplets).unwrap();
    GranuleMerger::new(8).unwrap().merge_rows(&rows).unwrap()
}

#[test]
fn test_valid_observation_wins_same_day() {
    let triplets = vec![
        Triplet::new("p1", "20190101_A", 0.50),
        Triplet::new("p1", "20190101_B", SENTINEL),
        Triplet::new("p1", "20190105_A", 0.30),
    ];
    let merged = pivot_and_merge(&triplets);

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].id, "p1");
    assert_eq!(merged[0].columns.len(), 2);
    assert_eq!(merged[0].get("20190101"), Some(0.50));
    assert_eq!(merged[0].get("20190105"), Some(0.30));
}

#[test]
fn test_all_missing_day_keeps_sentinel() {
    let triplets = vec![
        Triplet::new("p1", "20190101_A", SENTINEL),
        Triplet::new("p1", "20190101_B", SENTINEL),
    ];
    let merged = pivot_and_merge(&triplets);
    assert_eq!(merged[0].get("20190101"), Some(SENTINEL));
}

#[test]
fn test_sentinel_only_when_every_granule_missing() {
    let triplets = vec![
        Triplet::new("p1", "20190101_A", SENTINEL),
        Triplet::new("p1", "20190101_B", -0.2),
        Triplet::new("p2", "20190101_A", SENTINEL),
        Triplet::new("p2", "20190101_B", SENTINEL),
    ];
    let merged = pivot_and_merge(&triplets);
    for row in &merged {
        let all_missing = triplets
            .iter()
            .filter(|t| t.point_id == row.id)
            .all(|t| t.is_missing(SENTINEL));
        assert_eq!(row.get("20190101") == Some(SENTINEL), all_missing);
    }
}

#[test]
fn test_merge_result_independent_of_triplet_order() {
    let base = vec![
        Triplet::new("p1", "20190101_A", 0.10),
        Triplet::new("p1", "20190101_B", 0.35),
        Triplet::new("p1", "20190101_C", SENTINEL),
        Triplet::new("p2", "20190103_A", 0.20),
    ];
    let expected = pivot_and_merge(&base);

    // Every rotation of the input sequence
    for shift in 1..base.len() {
        let mut rotated = base.clone();
        rotated.rotate_left(shift);
        let mut merged = pivot_and_merge(&rotated);
        merged.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(merged, expected);
    }
}

#[test]
fn test_merge_idempotent() {
    let triplets = vec![
        Triplet::new("p1", "20190101_A", 0.4),
        Triplet::new("p1", "20190101_B", 0.6),
        Triplet::new("p1", "20190301_A", SENTINEL),
    ];
    let once = pivot_and_merge(&triplets);
    let again: Vec<PivotedRow> = once.iter().cloned().map(PivotedRow::from).collect();
    let twice = GranuleMerger::new(8).unwrap().merge_rows(&again).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_last_wins_policy_is_sequence_ordered() {
    let triplets = vec![
        Triplet::new("p1", "20190101_A", 0.1),
        Triplet::new("p1", "20190101_A", 0.2),
    ];
    let rows = TemporalPivot::new(DuplicatePolicy::LastWins).pivot(&triplets).unwrap();
    assert_eq!(rows[0].columns["20190101_A"], 0.2);
    assert!(TemporalPivot::new(DuplicatePolicy::Reject).pivot(&triplets).is_err());
}

#[test]
fn test_heterogeneous_rows_export() {
    let triplets = vec![
        Triplet::new("p1", "20190101_A", 0.5),
        Triplet::new("p2", "20190105_A", 0.25),
    ];
    let merged = pivot_and_merge(&triplets);
    let bytes = write_rows(Vec::new(), &merged, FillMissing::Sentinel, SENTINEL).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert_eq!(text, "id,20190101,20190105\np1,0.5,-9999\np2,-9999,0.25\n");
}
