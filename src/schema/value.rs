//! Raw cell text → numbers.
//!
//! Cells are trimmed, matched against a fixed suppression vocabulary, stripped of thousands
//! separators and a trailing `%`, then parsed. Suppressed cells are *missing*, never zero.
//!
//! Percentage columns are normalized with a **column-level** decision (see
//! [`detect_percent_encoding`]); a single cell never decides its own scale.

/// Sentinel strings the agency uses for withheld values. Matched exactly (case-sensitive) after
/// trimming.
pub const SUPPRESSION_TOKENS: &[&str] = &[
    "*", ".", "-", "-1", "<5", "<10", "N/A", "NA", "", "NULL", "NR", "~", "#N/A",
];

/// Result of parsing one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedCell {
    Value(f64),
    /// A suppression token.
    Suppressed,
    /// Text that is neither a number nor a suppression token.
    Invalid,
}

impl ParsedCell {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(v),
            Self::Suppressed | Self::Invalid => None,
        }
    }

    /// The value rounded to the nearest whole count.
    pub fn as_count(self) -> Option<i64> {
        self.value().map(|v| v.round() as i64)
    }

    pub fn is_missing(self) -> bool {
        !matches!(self, Self::Value(_))
    }
}

/// How the values of one percentage column are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PercentEncoding {
    /// No non-missing values.
    Empty,
    /// At least one cell carries a literal `%`; values are already percentages.
    WithSign,
    /// Every value is ≤ 1; values are fractions and are scaled by 100.
    Fraction,
    /// Values are already on the 0–100 scale.
    Percent,
}

/// A normalized percentage column.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentColumn {
    pub encoding: PercentEncoding,
    /// One entry per input cell, on the 0–100 scale.
    pub values: Vec<ParsedCell>,
    /// The column was read as a fraction but its maximum is exactly 1, which is equally
    /// consistent with "1%".
    pub ambiguous: bool,
}

pub fn is_suppression_token(raw: &str) -> bool {
    SUPPRESSION_TOKENS.contains(&raw.trim())
}

/// Parse one raw cell.
pub fn parse_cell(raw: &str) -> ParsedCell {
    let trimmed = raw.trim();
    if is_suppression_token(trimmed) {
        return ParsedCell::Suppressed;
    }

    let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.strip_suffix('%').unwrap_or(&cleaned).trim_end();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => ParsedCell::Value(v),
        _ => ParsedCell::Invalid,
    }
}

/// Parse a count cell. Non-integral values round to the nearest whole count.
pub fn parse_count(raw: &str) -> Option<i64> {
    parse_cell(raw).as_count()
}

/// Decide how a whole column of percentage-like cells is encoded.
///
/// 1. any non-missing cell contains `%` → [`PercentEncoding::WithSign`]
/// 2. otherwise every parsed value ≤ 1 → [`PercentEncoding::Fraction`]
/// 3. otherwise → [`PercentEncoding::Percent`]
pub fn detect_percent_encoding<S: AsRef<str>>(cells: &[S]) -> PercentEncoding {
    let present: Vec<&str> = cells
        .iter()
        .map(|c| c.as_ref().trim())
        .filter(|c| !is_suppression_token(c))
        .collect();

    if present.iter().any(|c| c.contains('%')) {
        return PercentEncoding::WithSign;
    }

    let values: Vec<f64> = present.iter().filter_map(|c| parse_cell(c).value()).collect();
    if values.is_empty() {
        PercentEncoding::Empty
    } else if values.iter().all(|v| *v <= 1.0) {
        PercentEncoding::Fraction
    } else {
        PercentEncoding::Percent
    }
}

/// Normalize a percentage column onto the 0–100 scale.
///
/// Values outside `[0, 100]` are returned unchanged; flagging them is the caller's job.
pub fn normalize_percent_column<S: AsRef<str>>(cells: &[S]) -> PercentColumn {
    let encoding = detect_percent_encoding(cells);
    let mut max = f64::NEG_INFINITY;

    let values = cells
        .iter()
        .map(|c| match parse_cell(c.as_ref()) {
            ParsedCell::Value(v) => {
                max = max.max(v);
                match encoding {
                    PercentEncoding::Fraction => ParsedCell::Value(round6(v * 100.0)),
                    _ => ParsedCell::Value(v),
                }
            }
            other => other,
        })
        .collect();

    PercentColumn {
        encoding,
        values,
        ambiguous: encoding == PercentEncoding::Fraction && max == 1.0,
    }
}

/// `round(base × pct / 100)`.
pub fn derive_count(base: i64, pct: f64) -> i64 {
    (base as f64 * pct / 100.0).round() as i64
}

pub(crate) fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}
