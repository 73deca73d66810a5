//! Raw sheet grids → header names + data rows.
//!
//! Agency extracts start with a header block (title, disclaimer, category header, sub-header,
//! optional blank row) before the data. Category headers are merged cells spanning several
//! sub-columns, so each column's name comes from its sub-header, else its category header, else
//! a positional placeholder.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{SchoolDataError, SchoolDataResult};
use crate::schema::columns::{DISTRICT_SHEET, SCHOOL_SHEET};

/// One sheet as a grid of text cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl RawSheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }
}

/// A decoded workbook: its sheets in workbook order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawWorkbook {
    pub sheets: Vec<RawSheet>,
}

impl RawWorkbook {
    pub fn new(sheets: Vec<RawSheet>) -> Self {
        Self { sheets }
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Options for locating the data region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Number of leading rows scanned for the first data row.
    pub lookahead: usize,
    /// First data row assumed when no identifier is found within `lookahead`.
    pub default_data_offset: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            lookahead: 10,
            default_data_offset: 5,
        }
    }
}

/// Which header block layout was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderShape {
    /// Title, disclaimer, category header (row 3), sub-header (row 4).
    Standard,
    /// Anything else; headers were taken from the rows nearest the data.
    Unknown,
}

/// Entity level a sheet holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetLevel {
    District,
    School,
    /// Both levels in one sheet; rows with a school code are schools.
    Combined,
}

/// The data region of one sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extract {
    pub sheet: String,
    pub shape: HeaderShape,
    pub headers: Vec<String>,
    /// Data rows, each padded/truncated to `headers.len()`.
    pub rows: Vec<Vec<String>>,
    /// 0-based index of the first data row in the source sheet.
    pub first_data_row: usize,
}

impl Extract {
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// All data cells of one column, in row order.
    pub fn column(&self, idx: usize) -> Vec<&str> {
        self.rows
            .iter()
            .map(|r| r.get(idx).map(String::as_str).unwrap_or(""))
            .collect()
    }
}

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{3}|[A-Z](?:\d[0-9A-Z]|[A-Z]\d))$").expect("identifier pattern compiles")
});

/// Width of a numeric district code.
pub const DISTRICT_CODE_WIDTH: usize = 3;
/// Width of a numeric site code (district code followed by a three-digit school number).
pub const SITE_CODE_WIDTH: usize = 6;

fn pad_numeric(raw: &str, width: usize) -> String {
    let trimmed = raw.trim();
    let digits = match trimmed.strip_suffix(".0") {
        Some(head) if !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()) => head,
        _ => trimmed,
    };
    if !digits.is_empty() && digits.len() < width && digits.chars().all(|c| c.is_ascii_digit()) {
        format!("{digits:0>width$}")
    } else {
        digits.to_string()
    }
}

/// Normalize an entity identifier cell: trims, drops a float suffix (`1.0`) and zero-pads
/// short numeric codes to three digits.
pub fn normalize_identifier(raw: &str) -> String {
    pad_numeric(raw, DISTRICT_CODE_WIDTH)
}

/// Normalize a site code cell. Codes stored as numbers lose their leading zeros (`001001` reads
/// back as `1001`), so numeric codes are zero-padded to six digits.
pub fn normalize_site_code(raw: &str) -> String {
    pad_numeric(raw, SITE_CODE_WIDTH)
}

/// Whether a cell has the shape of an entity identifier (e.g. `001`, `R36`, `W1A`).
pub fn is_identifier(raw: &str) -> bool {
    IDENTIFIER.is_match(&normalize_identifier(raw))
}

fn is_blank_row(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

fn leading_is_identifier(row: &[String]) -> bool {
    row.first().is_some_and(|c| is_identifier(c))
}

fn clean_header(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches('*').trim().to_string()
}

/// Locate the data region of a sheet and resolve its header names.
pub fn read_extract(sheet: &RawSheet, end_year: u16, opts: &ReaderOptions) -> SchoolDataResult<Extract> {
    let rows = &sheet.rows;
    let window = rows.len().min(opts.lookahead);
    let scan_from = match (0..window).find(|&i| leading_is_identifier(&rows[i])) {
        Some(i) => i,
        None => {
            debug!(
                sheet = %sheet.name,
                lookahead = opts.lookahead,
                fallback = opts.default_data_offset,
                "no identifier row in lookahead window; using default offset"
            );
            opts.default_data_offset
        }
    };

    let kept: Vec<usize> = (scan_from..rows.len())
        .filter(|&i| !is_blank_row(&rows[i]) && leading_is_identifier(&rows[i]))
        .collect();
    let Some(&data_start) = kept.first() else {
        return Err(SchoolDataError::structure(
            end_year,
            &sheet.name,
            format!(
                "no recognizable data rows (scanned {} of {} rows for an entity identifier)",
                window,
                rows.len()
            ),
        ));
    };

    // The header block sits directly above the first data row, wherever the scan started.
    let sub = (0..data_start).rev().find(|&i| !is_blank_row(&rows[i]));
    let category = sub
        .and_then(|s| s.checked_sub(1))
        .filter(|&c| !is_blank_row(&rows[c]));
    let shape = if sub == Some(3) && category == Some(2) {
        HeaderShape::Standard
    } else {
        HeaderShape::Unknown
    };

    let mut data: Vec<Vec<String>> = kept.iter().map(|&i| rows[i].clone()).collect();
    for row in &mut data {
        row[0] = normalize_identifier(&row[0]);
    }

    let empty: Vec<String> = Vec::new();
    let sub_row = sub.map(|i| &rows[i]).unwrap_or(&empty);
    let cat_row = category.map(|i| &rows[i]).unwrap_or(&empty);
    let cell = |row: &Vec<String>, c: usize| row.get(c).map(|s| clean_header(s)).unwrap_or_default();

    let mut width = data
        .iter()
        .map(Vec::len)
        .chain([sub_row.len(), cat_row.len()])
        .max()
        .unwrap_or(0);
    while width > 0 {
        let c = width - 1;
        let blank_header = cell(sub_row, c).is_empty() && cell(cat_row, c).is_empty();
        let blank_data = data.iter().all(|r| r.get(c).is_none_or(|v| v.trim().is_empty()));
        if blank_header && blank_data {
            width -= 1;
        } else {
            break;
        }
    }

    let headers: Vec<String> = (0..width)
        .map(|c| {
            let sub_text = cell(sub_row, c);
            if !sub_text.is_empty() {
                return sub_text;
            }
            let cat_text = cell(cat_row, c);
            if !cat_text.is_empty() {
                return cat_text;
            }
            format!("column_{}", c + 1)
        })
        .collect();

    for row in &mut data {
        row.resize(width, String::new());
    }

    debug!(
        sheet = %sheet.name,
        data_start,
        rows = data.len(),
        columns = width,
        ?shape,
        "extract located"
    );

    Ok(Extract {
        sheet: sheet.name.clone(),
        shape,
        headers,
        rows: data,
        first_data_row: data_start,
    })
}

/// Pick the sheets to read and the entity level each one holds.
///
/// Level-specific sheets are found by name patterns; when none match, the first non-empty sheet
/// is read as a combined sheet.
pub fn select_sheets(workbook: &RawWorkbook) -> Vec<(SheetLevel, &RawSheet)> {
    let names = workbook.sheet_names();
    let district = DISTRICT_SHEET.first_match(&names);
    let school = SCHOOL_SHEET.first_match(&names).filter(|s| Some(*s) != district);

    let mut out = Vec::new();
    if let Some(i) = district {
        out.push((SheetLevel::District, &workbook.sheets[i]));
    }
    if let Some(i) = school {
        out.push((SheetLevel::School, &workbook.sheets[i]));
    }
    if out.is_empty() {
        if let Some(first) = workbook.sheets.iter().find(|s| !s.rows.iter().all(|r| is_blank_row(r))) {
            out.push((SheetLevel::Combined, first));
        }
    }
    out
}
