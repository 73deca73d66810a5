//! Schema eras: which layout a given (dataset, year) extract uses.
//!
//! Eras are tagged variants backed by immutable descriptors. The year is the primary key; the
//! observed column count is a consistency check and breaks ties when an extract for a known year
//! arrives in another era's shape.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SchoolDataError, SchoolDataResult};
use crate::types::{DatasetKind, ExtractWarning};

use super::value::PercentEncoding;

/// A named schema variant of the source spreadsheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Era {
    /// 2007–2019 enrollment: fractions, grade bands, 22 columns.
    EnrollmentBanded,
    /// 2020–2023 enrollment: fractions, one column per grade, 32 columns.
    EnrollmentPerGrade,
    /// 2024+ enrollment: percentages with a `%` sign, 42 columns.
    EnrollmentSigned,
    /// 2018–2019 LEAP summaries without social studies, 20 columns.
    AssessmentLeap,
    /// 2021+ LEAP summaries with social studies and signed percentages, 26 columns.
    AssessmentLeapSocialStudies,
    /// School directory, 10 columns.
    Directory,
}

/// How percentages are expected to be written in an era.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PercentHint {
    /// Decimal fractions (`0.488`).
    Fraction,
    /// Percent values without a sign (`48.8`).
    Percent,
    /// Percent values with a sign (`48.8%`).
    WithSign,
    /// The era has no percentage fields.
    NotApplicable,
}

impl PercentHint {
    /// Whether a detected column encoding is consistent with this hint.
    pub fn agrees_with(self, detected: PercentEncoding) -> bool {
        match (self, detected) {
            (_, PercentEncoding::Empty) | (Self::NotApplicable, _) => true,
            (Self::Fraction, PercentEncoding::Fraction) => true,
            (Self::Percent, PercentEncoding::Percent) => true,
            (Self::WithSign, PercentEncoding::WithSign) => true,
            _ => false,
        }
    }
}

/// Immutable description of one era.
#[derive(Debug)]
pub struct EraDescriptor {
    pub era: Era,
    pub kind: DatasetKind,
    pub first_year: u16,
    pub last_year: u16,
    /// Column count of the extract, not counting site code/name columns.
    pub expected_columns: usize,
    pub percent_hint: PercentHint,
    /// Active semantic fields, as slices of field names.
    pub fields: &'static [&'static [&'static str]],
}

impl EraDescriptor {
    pub fn covers(&self, year: u16) -> bool {
        (self.first_year..=self.last_year).contains(&year)
    }

    /// Iterate the active field names.
    pub fn active_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().flat_map(|set| set.iter().copied())
    }

    pub fn is_active(&self, field: &str) -> bool {
        self.active_fields().any(|f| f == field)
    }
}

const ENR_CORE: &[&str] = &[
    "total",
    "american_indian",
    "asian",
    "black",
    "hispanic",
    "pacific_islander",
    "white",
    "multiracial",
    "female",
    "male",
    "lep",
    "econ_disadv",
];

const ENR_BANDS: &[&str] = &[
    "infants",
    "pre_k",
    "kindergarten",
    "grades_01_05",
    "grades_06_08",
    "grades_09_12",
    "grade_t9",
    "extension_academy",
];

const ENR_GRADES: &[&str] = &[
    "infants",
    "pre_k",
    "kindergarten",
    "grade_01",
    "grade_02",
    "grade_03",
    "grade_04",
    "grade_05",
    "grade_06",
    "grade_07",
    "grade_08",
    "grade_09",
    "grade_10",
    "grade_11",
    "grade_12",
    "grade_t9",
    "extension_academy",
];

const LEAP_ELA: &[&str] = &[
    "ela_tested",
    "ela_advanced",
    "ela_mastery",
    "ela_basic",
    "ela_approaching_basic",
    "ela_unsatisfactory",
];

const LEAP_MATH: &[&str] = &[
    "math_tested",
    "math_advanced",
    "math_mastery",
    "math_basic",
    "math_approaching_basic",
    "math_unsatisfactory",
];

const LEAP_SCIENCE: &[&str] = &[
    "science_tested",
    "science_advanced",
    "science_mastery",
    "science_basic",
    "science_approaching_basic",
    "science_unsatisfactory",
];

const LEAP_SOCIAL_STUDIES: &[&str] = &[
    "social_studies_tested",
    "social_studies_advanced",
    "social_studies_mastery",
    "social_studies_basic",
    "social_studies_approaching_basic",
    "social_studies_unsatisfactory",
];

const DIRECTORY: &[&str] = &[
    "address",
    "city",
    "state",
    "zip",
    "phone",
    "grades_served",
    "school_type",
    "principal",
];

/// The era table. Ranges within one dataset never overlap.
pub static ERAS: &[EraDescriptor] = &[
    EraDescriptor {
        era: Era::EnrollmentBanded,
        kind: DatasetKind::Enrollment,
        first_year: 2007,
        last_year: 2019,
        expected_columns: 22,
        percent_hint: PercentHint::Fraction,
        fields: &[ENR_CORE, ENR_BANDS],
    },
    EraDescriptor {
        era: Era::EnrollmentPerGrade,
        kind: DatasetKind::Enrollment,
        first_year: 2020,
        last_year: 2023,
        expected_columns: 32,
        percent_hint: PercentHint::Fraction,
        fields: &[ENR_CORE, &["minority"], ENR_GRADES],
    },
    EraDescriptor {
        era: Era::EnrollmentSigned,
        kind: DatasetKind::Enrollment,
        first_year: 2024,
        last_year: 2025,
        expected_columns: 42,
        percent_hint: PercentHint::WithSign,
        fields: &[ENR_CORE, &["minority", "swd"], ENR_GRADES],
    },
    EraDescriptor {
        era: Era::AssessmentLeap,
        kind: DatasetKind::Assessment,
        first_year: 2018,
        last_year: 2019,
        expected_columns: 20,
        percent_hint: PercentHint::Percent,
        fields: &[LEAP_ELA, LEAP_MATH, LEAP_SCIENCE],
    },
    EraDescriptor {
        era: Era::AssessmentLeapSocialStudies,
        kind: DatasetKind::Assessment,
        first_year: 2021,
        last_year: 2025,
        expected_columns: 26,
        percent_hint: PercentHint::WithSign,
        fields: &[LEAP_ELA, LEAP_MATH, LEAP_SCIENCE, LEAP_SOCIAL_STUDIES],
    },
    EraDescriptor {
        era: Era::Directory,
        kind: DatasetKind::Directory,
        first_year: 2019,
        last_year: 2025,
        expected_columns: 10,
        percent_hint: PercentHint::NotApplicable,
        fields: &[DIRECTORY],
    },
];

/// Every supported end year for a dataset, ascending.
pub fn available_years(kind: DatasetKind) -> Vec<u16> {
    let mut years: Vec<u16> = ERAS
        .iter()
        .filter(|e| e.kind == kind)
        .flat_map(|e| e.first_year..=e.last_year)
        .collect();
    years.sort_unstable();
    years.dedup();
    years
}

/// Reject years outside the supported set, naming the valid range.
pub fn validate_year(kind: DatasetKind, end_year: u16) -> SchoolDataResult<()> {
    let years = available_years(kind);
    if years.contains(&end_year) {
        return Ok(());
    }

    let (min, max) = match (years.first(), years.last()) {
        (Some(min), Some(max)) => (*min, *max),
        _ => return Err(SchoolDataError::invalid(format!("no supported years for {kind}"))),
    };
    let gaps: Vec<String> = (min..=max)
        .filter(|y| !years.contains(y))
        .map(|y| y.to_string())
        .collect();
    let gap_note = if gaps.is_empty() {
        String::new()
    } else {
        format!(" (no {kind} data for {})", gaps.join(", "))
    };
    Err(SchoolDataError::invalid(format!(
        "end_year must be between {min} and {max}{gap_note}; got {end_year}"
    )))
}

/// Outcome of era detection for one extract.
#[derive(Debug, Clone)]
pub struct EraSelection {
    pub descriptor: &'static EraDescriptor,
    pub warning: Option<ExtractWarning>,
}

/// The era registered for `end_year`, without any shape check.
pub fn era_for_year(kind: DatasetKind, end_year: u16) -> SchoolDataResult<&'static EraDescriptor> {
    validate_year(kind, end_year)?;
    ERAS.iter()
        .find(|e| e.kind == kind && e.covers(end_year))
        .ok_or_else(|| SchoolDataError::invalid(format!("no era registered for {kind} {end_year}")))
}

/// Select the era for an extract.
///
/// When `observed_columns` disagrees with the year's era and exactly one other era of the same
/// dataset expects that column count, that era is used instead. Otherwise the year's era stands
/// and a [`ExtractWarning::ColumnCountMismatch`] is returned alongside it.
pub fn detect_era(
    kind: DatasetKind,
    end_year: u16,
    observed_columns: Option<usize>,
    sheet: &str,
) -> SchoolDataResult<EraSelection> {
    let by_year = era_for_year(kind, end_year)?;
    let Some(observed) = observed_columns else {
        return Ok(EraSelection {
            descriptor: by_year,
            warning: None,
        });
    };
    if observed == by_year.expected_columns {
        return Ok(EraSelection {
            descriptor: by_year,
            warning: None,
        });
    }

    let mut by_shape = ERAS
        .iter()
        .filter(|e| e.kind == kind && e.expected_columns == observed);
    match (by_shape.next(), by_shape.next()) {
        (Some(era), None) => {
            debug!(
                %kind,
                end_year,
                observed,
                year_era = ?by_year.era,
                shape_era = ?era.era,
                "column count matches another era; using it"
            );
            Ok(EraSelection {
                descriptor: era,
                warning: None,
            })
        }
        _ => Ok(EraSelection {
            descriptor: by_year,
            warning: Some(ExtractWarning::ColumnCountMismatch {
                sheet: sheet.to_string(),
                era: by_year.era,
                expected: by_year.expected_columns,
                observed,
            }),
        }),
    }
}
