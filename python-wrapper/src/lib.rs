//! Python bindings for `laschooldata`.
//!
//! Records cross the boundary as JSON text (`json.loads` on the Python side), so the Python
//! package can hand them straight to pandas without a second schema.

use std::path::PathBuf;
use std::sync::Arc;

use laschooldata::cache::FileCache;
use laschooldata::execution::Fetcher;
use laschooldata::source::DirectorySource;
use laschooldata::types::{DatasetKind, Records, Shape};
use laschooldata::SchoolDataError;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

/// Directory holding `{prefix}_{year}.{xlsx,csv,...}` workbooks when `source_dir` is not given.
const SOURCE_DIR_VAR: &str = "LASCHOOLDATA_SOURCE_DIR";

fn to_py_err(e: SchoolDataError) -> PyErr {
    match e {
        SchoolDataError::InvalidArgument { message } => PyValueError::new_err(message),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

fn fetcher(source_dir: Option<String>) -> PyResult<Fetcher> {
    let root = source_dir
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(SOURCE_DIR_VAR).map(PathBuf::from))
        .ok_or_else(|| {
            PyValueError::new_err(format!(
                "no workbook directory: pass source_dir or set {SOURCE_DIR_VAR}"
            ))
        })?;
    Ok(Fetcher::new(
        Arc::new(DirectorySource::new(root)),
        Arc::new(FileCache::from_env()),
    ))
}

fn records_to_json(records: &Records) -> PyResult<String> {
    let rows = match records {
        Records::Wide(rows) => serde_json::to_string(rows),
        Records::Tidy(rows) => serde_json::to_string(rows),
    };
    rows.map_err(|e| PyRuntimeError::new_err(format!("failed to serialize records: {e}")))
}

/// Fetch enrollment records for one end year as a JSON array.
///
/// `tidy=True` returns one row per (entity, subgroup-or-grade); `tidy=False` one row per entity.
#[pyfunction]
#[pyo3(signature = (end_year, tidy = true, use_cache = true, source_dir = None))]
fn fetch_enr(end_year: u16, tidy: bool, use_cache: bool, source_dir: Option<String>) -> PyResult<String> {
    let shape = if tidy { Shape::Tidy } else { Shape::Wide };
    let records = fetcher(source_dir)?
        .fetch_enr(end_year, shape, use_cache)
        .map_err(to_py_err)?;
    records_to_json(&records)
}

/// Supported end years for a dataset (`"enrollment"`, `"assessment"` or `"directory"`).
#[pyfunction]
#[pyo3(signature = (dataset = "enrollment"))]
fn get_available_years(dataset: &str) -> PyResult<Vec<u16>> {
    let kind: DatasetKind = dataset.parse().map_err(to_py_err)?;
    Ok(laschooldata::get_available_years(kind))
}

#[pymodule]
fn pylaschooldata(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_function(wrap_pyfunction!(fetch_enr, m)?)?;
    m.add_function(wrap_pyfunction!(get_available_years, m)?)?;
    Ok(())
}
