//! Workbook decoding and raw extract reading.
//!
//! Most callers should use [`read_workbook`] (from [`unified`]) followed by
//! [`raw::read_extract`] on each selected sheet:
//!
//! - decodes xlsx/xls/ods (feature `excel`) or CSV into a [`RawWorkbook`] of text grids
//! - locates the header block and data rows of each sheet
//! - reports fetch outcomes and extract warnings to a [`FetchObserver`]
//!
//! Format-specific functions are also available under:
//! - [`csv`]
//! - `excel` (feature `excel`)

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod observability;
pub mod raw;
pub mod unified;

pub use observability::{
    severity_for_error, CompositeObserver, FetchContext, FetchObserver, FetchSeverity, FetchStats, FileObserver,
    StdErrObserver,
};
pub use raw::{read_extract, select_sheets, Extract, HeaderShape, RawSheet, RawWorkbook, ReaderOptions, SheetLevel};
pub use unified::{read_workbook, read_workbook_from_path, WorkbookFormat};
