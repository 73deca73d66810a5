//! CSV decoding: one sheet, no header interpretation.
//!
//! Header rows are located later by [`crate::ingestion::raw::read_extract`], so every record
//! (title and disclaimer lines included) is kept as a raw row.

use std::io::Read;
use std::path::Path;

use crate::error::SchoolDataResult;

use super::raw::{RawSheet, RawWorkbook};

/// Decode a CSV file on disk into a single-sheet workbook named after the file stem.
pub fn read_csv_from_path(path: impl AsRef<Path>) -> SchoolDataResult<RawWorkbook> {
    let path = path.as_ref();
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Sheet1".to_string());
    let file = std::fs::File::open(path)?;
    Ok(RawWorkbook::new(vec![read_csv_sheet(file, &name)?]))
}

/// Decode CSV data from any reader into one sheet.
///
/// Records may have differing lengths (title lines are usually one cell wide).
pub fn read_csv_sheet<R: Read>(reader: R, name: &str) -> SchoolDataResult<RawSheet> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_owned).collect());
    }
    Ok(RawSheet::new(name, rows))
}
