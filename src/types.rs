//! Core data model: dataset kinds, output shapes, normalized records and tidy rows.
//!
//! A fetch produces [`Records`]: either one [`NormalizedRecord`] per entity (wide) or one
//! [`TidyRow`] per (entity, subgroup-or-grade) pair (tidy). Every numeric field is an `Option`:
//! a suppressed or absent value is `None`, never zero.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchoolDataError;
use crate::schema::era::{Era, PercentHint};
use crate::schema::fields::{FieldGroup, TOTAL};
use crate::schema::value::PercentEncoding;

/// The published datasets this crate knows how to normalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// October 1 enrollment counts ("Multi Stats").
    Enrollment,
    /// LEAP achievement-level summaries.
    Assessment,
    /// School and school-system directory.
    Directory,
}

impl DatasetKind {
    /// All dataset kinds, in a stable order.
    pub const ALL: [DatasetKind; 3] = [Self::Enrollment, Self::Assessment, Self::Directory];

    /// Short prefix used for cache entries and local workbook file names.
    pub fn file_prefix(self) -> &'static str {
        match self {
            Self::Enrollment => "enr",
            Self::Assessment => "assessment",
            Self::Directory => "directory",
        }
    }

    /// Whether the dataset has a long (tidy) representation.
    pub fn supports_tidy(self) -> bool {
        !matches!(self, Self::Directory)
    }

    /// Whether district records are rolled up into a single state record.
    pub fn has_state_aggregate(self) -> bool {
        !matches!(self, Self::Directory)
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Enrollment => "enrollment",
            Self::Assessment => "assessment",
            Self::Directory => "directory",
        };
        f.write_str(s)
    }
}

impl FromStr for DatasetKind {
    type Err = SchoolDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enr" | "enrollment" => Ok(Self::Enrollment),
            "assessment" | "leap" => Ok(Self::Assessment),
            "directory" | "dir" => Ok(Self::Directory),
            other => Err(SchoolDataError::invalid(format!(
                "unknown dataset '{other}'; expected one of: enrollment, assessment, directory"
            ))),
        }
    }
}

/// Output shape of a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// One row per entity.
    Wide,
    /// One row per (entity, subgroup-or-grade).
    Tidy,
}

impl Shape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wide => "wide",
            Self::Tidy => "tidy",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Shape {
    type Err = SchoolDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wide" => Ok(Self::Wide),
            "tidy" | "long" => Ok(Self::Tidy),
            other => Err(SchoolDataError::invalid(format!(
                "unknown shape '{other}'; expected one of: wide, tidy"
            ))),
        }
    }
}

/// Level of an entity in the state/district/school hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    State,
    District,
    School,
}

/// Identity of one record: `(end_year, entity_type, district_id, school_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub end_year: u16,
    pub entity_type: EntityType,
    pub district_id: Option<String>,
    pub school_id: Option<String>,
}

/// A percentage-encoded source field together with the count derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PercentCount {
    /// Normalized percentage on the 0–100 scale.
    pub pct: Option<f64>,
    /// `round(base × pct / 100)` when both are available.
    pub count: Option<i64>,
}

/// Record-level data-quality warning. The source data is sometimes internally inconsistent,
/// so these are attached to records instead of being raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityWarning {
    /// A normalized percentage fell outside `[0, 100]`. The value is kept as parsed.
    PercentOutOfRange { field: String, value: f64 },
    /// A cell was neither a number nor a suppression token; the field is missing.
    UnparseableValue { field: String, raw: String },
    /// A group of complementary percentages (e.g. female + male) does not sum to ~100.
    PercentSumDrift { fields: Vec<String>, sum: f64 },
    /// The embedded state row and the sum of districts disagree beyond rounding tolerance.
    StateAggregateDiscrepancy {
        field: String,
        embedded: f64,
        summed: f64,
    },
    /// Summing a count across entities exceeded the integer range; the sum was clamped.
    CountOverflow { field: String },
}

/// Extract-level (column or sheet) warning produced during normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractWarning {
    /// Column classified as fraction whose maximum is exactly 1: "100%" and "1%" are
    /// indistinguishable.
    AmbiguousPercentEncoding { sheet: String, field: String },
    /// The detected encoding of a column differs from the era's hint.
    EncodingHintMismatch {
        sheet: String,
        field: String,
        hint: PercentHint,
        detected: PercentEncoding,
    },
    /// The extract's column count does not match any era for its year.
    ColumnCountMismatch {
        sheet: String,
        era: Era,
        expected: usize,
        observed: usize,
    },
    /// More than one state sentinel row was found; only the first was kept.
    DuplicateStateRows { count: usize },
}

impl fmt::Display for ExtractWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmbiguousPercentEncoding { sheet, field } => write!(
                f,
                "sheet '{sheet}': column '{field}' has maximum 1 and was read as a fraction"
            ),
            Self::EncodingHintMismatch {
                sheet,
                field,
                hint,
                detected,
            } => write!(
                f,
                "sheet '{sheet}': column '{field}' detected as {detected:?}, era hint is {hint:?}"
            ),
            Self::ColumnCountMismatch {
                sheet,
                era,
                expected,
                observed,
            } => write!(
                f,
                "sheet '{sheet}': {observed} columns, era {era:?} expects {expected}"
            ),
            Self::DuplicateStateRows { count } => {
                write!(f, "{count} state sentinel rows found; kept the first")
            }
        }
    }
}

/// One normalized row of output (wide form).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub end_year: u16,
    pub entity_type: EntityType,
    pub district_id: Option<String>,
    pub district_name: Option<String>,
    pub school_id: Option<String>,
    pub school_name: Option<String>,
    /// Entity total (enrollment); `None` for datasets without a single total.
    pub total: Option<i64>,
    /// Directly counted fields (demographics, grades/bands, tested counts).
    pub counts: BTreeMap<String, Option<i64>>,
    /// Percentage-encoded fields with their derived counts.
    pub percents: BTreeMap<String, PercentCount>,
    /// Text fields (directory).
    pub attributes: BTreeMap<String, Option<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<QualityWarning>,
}

impl NormalizedRecord {
    /// Create an empty record for an entity.
    pub fn new(end_year: u16, entity_type: EntityType) -> Self {
        Self {
            end_year,
            entity_type,
            district_id: None,
            district_name: None,
            school_id: None,
            school_name: None,
            total: None,
            counts: BTreeMap::new(),
            percents: BTreeMap::new(),
            attributes: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey {
            end_year: self.end_year,
            entity_type: self.entity_type,
            district_id: self.district_id.clone(),
            school_id: self.school_id.clone(),
        }
    }

    /// A direct count, or the total when `field` is [`TOTAL`].
    pub fn count(&self, field: &str) -> Option<i64> {
        if field == TOTAL {
            return self.total;
        }
        self.counts.get(field).copied().flatten()
    }

    /// The retained (normalized) percentage of a percentage-encoded field.
    pub fn pct(&self, field: &str) -> Option<f64> {
        self.percents.get(field).and_then(|p| p.pct)
    }

    /// The count derived from a percentage-encoded field.
    pub fn derived(&self, field: &str) -> Option<i64> {
        self.percents.get(field).and_then(|p| p.count)
    }

    pub fn attribute(&self, field: &str) -> Option<&str> {
        self.attributes.get(field).and_then(|v| v.as_deref())
    }

    /// Human-readable entity name.
    pub fn display_name(&self) -> Option<&str> {
        match self.entity_type {
            EntityType::School => self.school_name.as_deref(),
            EntityType::State | EntityType::District => self.district_name.as_deref(),
        }
    }
}

/// One row of the long (tidy) form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TidyRow {
    pub end_year: u16,
    pub entity_type: EntityType,
    pub district_id: Option<String>,
    pub district_name: Option<String>,
    pub school_id: Option<String>,
    pub school_name: Option<String>,
    pub group: FieldGroup,
    /// External subgroup or grade label (e.g. `"black"`, `"01"`, `"total_enrollment"`).
    pub label: String,
    pub count: i64,
    /// Share of the row's base as a fraction in `[0, 1]`, when meaningful.
    pub pct: Option<f64>,
}

/// A fetched record collection in either shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "rows", rename_all = "snake_case")]
pub enum Records {
    Wide(Vec<NormalizedRecord>),
    Tidy(Vec<TidyRow>),
}

impl Records {
    /// An empty collection of the given shape.
    pub fn empty(shape: Shape) -> Self {
        match shape {
            Shape::Wide => Self::Wide(Vec::new()),
            Shape::Tidy => Self::Tidy(Vec::new()),
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Self::Wide(_) => Shape::Wide,
            Self::Tidy(_) => Shape::Tidy,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Wide(rows) => rows.len(),
            Self::Tidy(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_wide(&self) -> Option<&[NormalizedRecord]> {
        match self {
            Self::Wide(rows) => Some(rows),
            Self::Tidy(_) => None,
        }
    }

    pub fn as_tidy(&self) -> Option<&[TidyRow]> {
        match self {
            Self::Tidy(rows) => Some(rows),
            Self::Wide(_) => None,
        }
    }

    /// Append `other` to `self`. Parts of a different shape are ignored.
    pub fn append(&mut self, other: Records) {
        match (self, other) {
            (Self::Wide(dst), Self::Wide(mut src)) => dst.append(&mut src),
            (Self::Tidy(dst), Self::Tidy(mut src)) => dst.append(&mut src),
            _ => {}
        }
    }
}
