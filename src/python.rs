//! Python bindings

use numpy::{PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::collections::BTreeMap;

use crate::config::DuplicatePolicy;
use crate::core::{cloud_mask, GranuleMerger, TemporalPivot};
use crate::types::{Triplet, VegError};

type PyRow = (String, BTreeMap<String, f64>);

fn to_py_err(e: VegError) -> PyErr {
    PyErr::new::<PyValueError, _>(format!("{}", e))
}

fn parse_policy(policy: &str) -> PyResult<DuplicatePolicy> {
    match policy.to_lowercase().as_str() {
        "reject" => Ok(DuplicatePolicy::Reject),
        "first_wins" => Ok(DuplicatePolicy::FirstWins),
        "last_wins" => Ok(DuplicatePolicy::LastWins),
        _ => Err(PyValueError::new_err(format!("Invalid duplicate policy: {}", policy))),
    }
}

fn to_triplets(triplets: Vec<(String, String, f64)>) -> Vec<Triplet> {
    triplets
        .into_iter()
        .map(|(point_id, frame_id, value)| Triplet { point_id, frame_id, value })
        .collect()
}

/// Normalized difference of two bands; undefined pixels are NaN
#[pyfunction]
fn normalized_difference(
    py: Python,
    band_a: PyReadonlyArray2<f32>,
    band_b: PyReadonlyArray2<f32>,
) -> PyResult<PyObject> {
    let a = band_a.as_array();
    let b = band_b.as_array();
    if a.dim() != b.dim() {
        return Err(PyValueError::new_err(format!(
            "Band shapes differ: {:?} vs {:?}",
            a.dim(),
            b.dim()
        )));
    }
    let index = ndarray::Zip::from(a)
        .and(b)
        .map_collect(|&x, &y| cloud_mask::normalized_difference(x, y).unwrap_or(f32::NAN));
    Ok(index.to_pyarray(py).into())
}

/// Pivot (point_id, frame_id, value) triplets into rows keyed by frame id
#[pyfunction]
#[pyo3(signature = (triplets, duplicate_policy = "reject"))]
fn pivot_triplets(triplets: Vec<(String, String, f64)>, duplicate_policy: &str) -> PyResult<Vec<PyRow>> {
    let pivot = TemporalPivot::new(parse_policy(duplicate_policy)?);
    let rows = pivot.pivot(&to_triplets(triplets)).map_err(to_py_err)?;
    Ok(rows.into_iter().map(|row| (row.id, row.columns)).collect())
}

/// Pivot triplets and merge same-date granules into rows keyed by date
#[pyfunction]
#[pyo3(signature = (triplets, date_prefix_length = 8, duplicate_policy = "reject"))]
fn merge_triplets(
    triplets: Vec<(String, String, f64)>,
    date_prefix_length: usize,
    duplicate_policy: &str,
) -> PyResult<Vec<PyRow>> {
    let pivot = TemporalPivot::new(parse_policy(duplicate_policy)?);
    let merger = GranuleMerger::new(date_prefix_length).map_err(to_py_err)?;
    let pivoted = pivot.pivot(&to_triplets(triplets)).map_err(to_py_err)?;
    let merged = merger.merge_rows(&pivoted).map_err(to_py_err)?;
    Ok(merged.into_iter().map(|row| (row.id, row.columns)).collect())
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(normalized_difference, m)?)?;
    m.add_function(wrap_pyfunction!(pivot_triplets, m)?)?;
    m.add_function(wrap_pyfunction!(merge_triplets, m)?)?;
    Ok(())
}
