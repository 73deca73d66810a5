//! Unified workbook decoding.
//!
//! Most callers go through [`read_workbook`] (downloaded bytes) or [`read_workbook_from_path`]
//! (local files). Both produce a [`RawWorkbook`] regardless of container format:
//!
//! - For bytes, the format is sniffed from magic bytes unless given explicitly.
//! - For paths, the format is inferred from the file extension.

use std::path::Path;

use crate::error::{SchoolDataError, SchoolDataResult};

use super::csv;
use super::raw::RawWorkbook;

/// Supported workbook containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookFormat {
    /// Comma-separated values (one sheet).
    Csv,
    /// Spreadsheet formats (feature-gated behind `excel`).
    Excel,
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

impl WorkbookFormat {
    /// Parse a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(Self::Excel),
            _ => None,
        }
    }

    /// Detect a format from the leading bytes of a payload.
    ///
    /// Zip containers (xlsx/ods) and compound documents (xls) are spreadsheets; UTF-8 text that
    /// does not open like markup is treated as CSV.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(CFB_MAGIC) {
            return Some(Self::Excel);
        }
        let head = &bytes[..bytes.len().min(512)];
        let text = match std::str::from_utf8(head) {
            Ok(t) => t,
            // a multi-byte char may be cut at the boundary
            Err(e) if e.valid_up_to() > 0 => std::str::from_utf8(&head[..e.valid_up_to()]).ok()?,
            Err(_) => return None,
        };
        let trimmed = text.trim_start_matches('\u{feff}').trim_start();
        if trimmed.is_empty() || trimmed.starts_with('<') {
            return None;
        }
        Some(Self::Csv)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "excel",
        }
    }
}

/// Decode a downloaded payload into a workbook.
///
/// `format = None` sniffs the container from the bytes.
pub fn read_workbook(bytes: Vec<u8>, format: Option<WorkbookFormat>, end_year: u16) -> SchoolDataResult<RawWorkbook> {
    let fmt = match format.or_else(|| WorkbookFormat::sniff(&bytes)) {
        Some(f) => f,
        None => {
            return Err(SchoolDataError::transport(
                end_year,
                "payload is neither a spreadsheet nor CSV text",
            ));
        }
    };

    match fmt {
        WorkbookFormat::Csv => Ok(RawWorkbook::new(vec![csv::read_csv_sheet(bytes.as_slice(), "Sheet1")?])),
        WorkbookFormat::Excel => read_excel_bytes(bytes),
    }
}

/// Decode a local workbook file, inferring its format from the extension.
pub fn read_workbook_from_path(path: impl AsRef<Path>) -> SchoolDataResult<RawWorkbook> {
    let path = path.as_ref();
    match infer_format_from_path(path)? {
        WorkbookFormat::Csv => csv::read_csv_from_path(path),
        WorkbookFormat::Excel => read_excel_path(path),
    }
}

pub(crate) fn infer_format_from_path(path: &Path) -> SchoolDataResult<WorkbookFormat> {
    let ext = path.extension().and_then(|s| s.to_str()).ok_or_else(|| {
        SchoolDataError::invalid(format!(
            "cannot infer format: path has no extension ({})",
            path.display()
        ))
    })?;

    WorkbookFormat::from_extension(ext).ok_or_else(|| {
        SchoolDataError::invalid(format!(
            "cannot infer format from extension '{ext}' for path ({})",
            path.display()
        ))
    })
}

fn read_excel_bytes(bytes: Vec<u8>) -> SchoolDataResult<RawWorkbook> {
    #[cfg(feature = "excel")]
    {
        super::excel::read_workbook_from_bytes(bytes)
    }

    #[cfg(not(feature = "excel"))]
    {
        let _ = bytes;
        Err(excel_disabled())
    }
}

fn read_excel_path(path: &Path) -> SchoolDataResult<RawWorkbook> {
    #[cfg(feature = "excel")]
    {
        super::excel::read_workbook_from_path(path)
    }

    #[cfg(not(feature = "excel"))]
    {
        let _ = path;
        Err(excel_disabled())
    }
}

#[cfg(not(feature = "excel"))]
fn excel_disabled() -> SchoolDataError {
    SchoolDataError::invalid("excel decoding not enabled (enable cargo feature 'excel')")
}
