#![cfg(feature = "excel")]

use std::io::{Cursor, Read, Seek};
use std::path::Path;

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader, Sheets};

use crate::error::SchoolDataResult;

use super::raw::{RawSheet, RawWorkbook};

/// Decode every sheet of an Excel document (`.xlsx`, `.xls`, `.ods`, etc.) on disk.
pub fn read_workbook_from_path(path: impl AsRef<Path>) -> SchoolDataResult<RawWorkbook> {
    let mut workbook = open_workbook_auto(path)?;
    read_sheets(&mut workbook)
}

/// Decode an Excel document held in memory (a downloaded payload).
///
/// The container format is detected from the bytes themselves.
pub fn read_workbook_from_bytes(bytes: Vec<u8>) -> SchoolDataResult<RawWorkbook> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    read_sheets(&mut workbook)
}

fn read_sheets<RS: Read + Seek>(workbook: &mut Sheets<RS>) -> SchoolDataResult<RawWorkbook> {
    let names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook.worksheet_range(&name)?;
        let rows = range_to_rows(&range);
        sheets.push(RawSheet::new(name, rows));
    }
    Ok(RawWorkbook::new(sheets))
}

/// Grid of text cells anchored at A1.
///
/// calamine ranges start at the first used cell, so leading empty rows and columns are restored
/// to keep row indices aligned with the sheet.
fn range_to_rows(range: &Range<Data>) -> Vec<Vec<String>> {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };
    let lead = start_col as usize;

    let mut rows: Vec<Vec<String>> = vec![Vec::new(); start_row as usize];
    for row in range.rows() {
        let mut out = vec![String::new(); lead];
        out.extend(row.iter().map(cell_to_string));
        rows.push(out);
    }
    rows
}

fn cell_to_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(f) => f.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
        Data::Empty => String::new(),
    }
}
