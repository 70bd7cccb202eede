use std::collections::btree_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::config::DuplicatePolicy;
use crate::types::{PivotedRow, Point, Triplet, VegError, VegResult};

/// Long-to-wide reshape of triplets keyed by point id
///
/// Works in two phases: an index from point id to that point's triplets,
/// then a fold of each list into a row-scoped column map. Rows come out in
/// order of first appearance of their point id.
#[derive(Debug, Clone)]
pub struct TemporalPivot {
    policy: DuplicatePolicy,
}

impl Default for TemporalPivot {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default())
    }
}

impl TemporalPivot {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// One row per distinct point id in `triplets`
    pub fn pivot(&self, triplets: &[Triplet]) -> VegResult<Vec<PivotedRow>> {
        let (order, index) = Self::index_by_point(triplets);
        order
            .into_iter()
            .map(|point_id| self.fold_row(point_id, &index[point_id]))
            .collect()
    }

    /// One row per enumerated point, id-only when it has no triplets
    ///
    /// Rows follow the order of `points`. A triplet naming a point outside
    /// the set is an error.
    pub fn pivot_points(&self, points: &[Point], triplets: &[Triplet]) -> VegResult<Vec<PivotedRow>> {
        let (_, index) = Self::index_by_point(triplets);

        let known: HashSet<&str> = points.iter().map(|p| p.id.as_str()).collect();
        if let Some(orphan) = triplets.iter().find(|t| !known.contains(t.point_id.as_str())) {
            return Err(VegError::Processing(format!(
                "triplet for frame '{}' references unknown point '{}'",
                orphan.frame_id, orphan.point_id
            )));
        }

        points
            .iter()
            .map(|point| match index.get(point.id.as_str()) {
                Some(group) => self.fold_row(&point.id, group),
                None => Ok(PivotedRow::new(point.id.clone())),
            })
            .collect()
    }

    fn index_by_point(triplets: &[Triplet]) -> (Vec<&str>, HashMap<&str, Vec<&Triplet>>) {
        let mut order = Vec::new();
        let mut index: HashMap<&str, Vec<&Triplet>> = HashMap::new();
        for triplet in triplets {
            index
                .entry(triplet.point_id.as_str())
                .or_insert_with(|| {
                    order.push(triplet.point_id.as_str());
                    Vec::new()
                })
                .push(triplet);
        }
        (order, index)
    }

    fn fold_row(&self, point_id: &str, group: &[&Triplet]) -> VegResult<PivotedRow> {
        let mut row = PivotedRow::new(point_id);
        for triplet in group {
            match row.columns.entry(triplet.frame_id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(triplet.value);
                }
                Entry::Occupied(mut slot) => match self.policy {
                    DuplicatePolicy::Reject => {
                        return Err(VegError::DuplicateObservation {
                            point_id: point_id.to_string(),
                            frame_id: triplet.frame_id.clone(),
                        });
                    }
                    DuplicatePolicy::FirstWins => {}
                    DuplicatePolicy::LastWins => {
                        slot.insert(triplet.value);
                    }
                },
            }
        }
        Ok(row)
    }
}
