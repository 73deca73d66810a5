//! Normalization core: decoded workbook → normalized records.
//!
//! Everything here is pure and performs no I/O; the same workbook always normalizes to the same
//! records.
//!
//! - [`build`]: extract rows → [`NormalizedRecord`]s
//! - [`aggregate`]: state record (embedded or summed), districts synthesized from schools
//! - [`tidy`]: wide records → long rows
//!
//! ## Example
//!
//! ```rust
//! use laschooldata::ingestion::{RawSheet, RawWorkbook};
//! use laschooldata::processing::{normalize_workbook, NormalizeOptions};
//! use laschooldata::types::{DatasetKind, EntityType};
//!
//! let row = |cells: &[&str]| cells.iter().map(|s| s.to_string()).collect::<Vec<_>>();
//! let sheet = RawSheet::new(
//!     "Total by School System",
//!     vec![
//!         row(&["School System", "School System Name", "Total Students", "Female %", "Male %"]),
//!         row(&["000", "State Total", "676,751", "48.8%", "51.2%"]),
//!         row(&["001", "Acadia Parish", "9,000", "49.0%", "51.0%"]),
//!     ],
//! );
//! let wb = RawWorkbook::new(vec![sheet]);
//!
//! let out = normalize_workbook(DatasetKind::Enrollment, 2024, &wb, &NormalizeOptions::default()).unwrap();
//! let state = &out.records[0];
//! assert_eq!(state.entity_type, EntityType::State);
//! assert_eq!(state.derived("female"), Some(330254));
//! ```

pub mod aggregate;
pub mod build;
pub mod tidy;

use tracing::{debug, warn};

use crate::error::{SchoolDataError, SchoolDataResult};
use crate::ingestion::raw::{read_extract, select_sheets, RawWorkbook, ReaderOptions};
use crate::schema::columns::ColumnResolver;
use crate::schema::era::{detect_era, era_for_year, validate_year, Era};
use crate::schema::fields::{dataset_schema, SCHOOL_ID, SCHOOL_NAME};
use crate::types::{DatasetKind, EntityType, ExtractWarning, NormalizedRecord, Records, Shape};

pub use aggregate::{aggregate_state, compare_aggregates, sum_records, synthesize_districts, Aggregated, StateSource};
pub use build::{build_records, BuiltExtract};
pub use tidy::pivot_longer;

/// Options controlling normalization.
///
/// Use [`Default`] for the published Louisiana extracts.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOptions {
    /// Where the data region starts.
    pub reader: ReaderOptions,
    /// `district_name` given to the state record.
    pub state_name: String,
    /// District id of an embedded state row.
    pub state_sentinel: String,
    /// Compare an embedded state row with the district sums and warn on disagreement.
    pub check_state_discrepancy: bool,
    /// Allowed distance from 100 for complementary percentage groups.
    pub percent_sum_tolerance: f64,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            reader: ReaderOptions::default(),
            state_name: "Louisiana".to_string(),
            state_sentinel: "000".to_string(),
            check_state_discrepancy: true,
            percent_sum_tolerance: 1.0,
        }
    }
}

/// One normalized (dataset, year) extract.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub kind: DatasetKind,
    pub end_year: u16,
    /// Era of the first extract read.
    pub era: Era,
    /// State record first (when the dataset has one), then districts, then schools.
    pub records: Vec<NormalizedRecord>,
    pub warnings: Vec<ExtractWarning>,
    /// `None` for datasets without a state aggregate.
    pub state_source: Option<StateSource>,
}

impl Normalized {
    /// The records in the requested shape.
    pub fn into_records(self, shape: Shape) -> SchoolDataResult<Records> {
        match shape {
            Shape::Wide => Ok(Records::Wide(self.records)),
            Shape::Tidy => pivot_longer(&self.records, self.kind).map(Records::Tidy),
        }
    }
}

/// Normalize a decoded workbook for one (dataset, year).
///
/// Reads the district-level and school-level sheets (or a single combined sheet), selects the
/// era of each extract, builds records and, for datasets with a state aggregate, produces
/// exactly one state record.
pub fn normalize_workbook(
    kind: DatasetKind,
    end_year: u16,
    workbook: &RawWorkbook,
    opts: &NormalizeOptions,
) -> SchoolDataResult<Normalized> {
    validate_year(kind, end_year)?;
    let sheets = select_sheets(workbook);
    if sheets.is_empty() {
        return Err(SchoolDataError::structure(
            end_year,
            "<workbook>",
            "workbook has no non-empty sheets",
        ));
    }

    let schema = dataset_schema(kind);
    let resolver = ColumnResolver::for_dataset(kind);
    let mut warnings: Vec<ExtractWarning> = Vec::new();
    let mut era: Option<Era> = None;
    let mut districts = Vec::new();
    let mut schools = Vec::new();

    for (level, sheet) in sheets {
        let extract = read_extract(sheet, end_year, &opts.reader)?;
        let site_columns = [SCHOOL_ID, SCHOOL_NAME]
            .iter()
            .filter(|f| resolver.resolve(&extract.headers, f).is_some())
            .count();
        let observed = extract.column_count().saturating_sub(site_columns);

        let selection = detect_era(kind, end_year, Some(observed), &extract.sheet)?;
        debug!(
            %kind,
            end_year,
            sheet = %extract.sheet,
            ?level,
            era = ?selection.descriptor.era,
            observed,
            "sheet selected"
        );
        era.get_or_insert(selection.descriptor.era);
        warnings.extend(selection.warning);

        let built = build_records(&extract, selection.descriptor, level, end_year, opts)?;
        warnings.extend(built.warnings);
        for rec in built.records {
            match rec.entity_type {
                EntityType::School => schools.push(rec),
                EntityType::State | EntityType::District => districts.push(rec),
            }
        }
    }

    let mut records = Vec::with_capacity(districts.len() + schools.len() + 1);
    let mut state_source = None;
    if kind.has_state_aggregate() {
        if districts.is_empty() && !schools.is_empty() {
            districts = synthesize_districts(schema, end_year, &schools);
            debug!(%kind, end_year, districts = districts.len(), "districts synthesized from schools");
        }
        let agg = aggregate_state(schema, end_year, districts, opts)?;
        warnings.extend(agg.warnings);
        state_source = Some(agg.source);
        records.push(agg.state);
        records.extend(agg.districts);
    } else {
        records.extend(districts);
    }
    records.extend(schools);

    for w in &warnings {
        warn!(%kind, end_year, "{w}");
    }

    let era = match era {
        Some(era) => era,
        None => era_for_year(kind, end_year)?.era,
    };

    Ok(Normalized {
        kind,
        end_year,
        era,
        records,
        warnings,
        state_source,
    })
}
