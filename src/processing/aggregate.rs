//! State (and, when missing, district) aggregates.
//!
//! Two sources for the state record:
//!
//! - **Embedded**: a district-level row whose id is the state sentinel (`000`). It is relabelled
//!   as the state record and removed from the district set; its values are kept verbatim.
//! - **Summed**: every count is summed across districts and each percentage is recomputed as
//!   `100 × Σderived / Σbase`. Percentages are never averaged.
//!
//! When the embedded row is used, the summed record is still computed and compared against it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{SchoolDataError, SchoolDataResult};
use crate::schema::fields::{DatasetSchema, FieldKind, TOTAL};
use crate::schema::value::round6;
use crate::types::{EntityType, ExtractWarning, NormalizedRecord, PercentCount, QualityWarning};

use super::NormalizeOptions;

/// Largest count difference between embedded and summed state values treated as rounding.
pub const COUNT_TOLERANCE: i64 = 1;
/// Largest percentage-point difference treated as rounding.
pub const PCT_TOLERANCE: f64 = 0.1;

/// Where the state record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSource {
    Embedded,
    Summed,
}

/// The state record plus the districts it was taken out of (or computed from).
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregated {
    pub state: NormalizedRecord,
    pub districts: Vec<NormalizedRecord>,
    pub source: StateSource,
    pub warnings: Vec<ExtractWarning>,
}

/// Produce exactly one state record for a (year, dataset) from its district records.
pub fn aggregate_state(
    schema: &DatasetSchema,
    end_year: u16,
    districts: Vec<NormalizedRecord>,
    opts: &NormalizeOptions,
) -> SchoolDataResult<Aggregated> {
    let sentinel = opts.state_sentinel.as_str();
    let (sentinels, districts): (Vec<_>, Vec<_>) = districts
        .into_iter()
        .partition(|r| r.district_id.as_deref() == Some(sentinel));

    let mut warnings = Vec::new();
    let sentinel_rows = sentinels.len();
    if let Some(embedded) = sentinels.into_iter().next() {
        if sentinel_rows > 1 {
            warn!(end_year, count = sentinel_rows, "duplicate state sentinel rows; keeping the first");
            warnings.push(ExtractWarning::DuplicateStateRows { count: sentinel_rows });
        }
        let mut state = as_state(embedded, &opts.state_name);

        if opts.check_state_discrepancy && !districts.is_empty() {
            let refs: Vec<&NormalizedRecord> = districts.iter().collect();
            let summed = sum_records(schema, end_year, EntityType::State, &refs);
            let discrepancies = compare_aggregates(&state, &summed);
            if !discrepancies.is_empty() {
                warn!(
                    end_year,
                    kind = %schema.kind,
                    fields = discrepancies.len(),
                    "embedded state row disagrees with district sums"
                );
            }
            state.warnings.extend(discrepancies);
        }

        debug!(end_year, kind = %schema.kind, districts = districts.len(), "state record taken from sentinel row");
        return Ok(Aggregated {
            state,
            districts,
            source: StateSource::Embedded,
            warnings,
        });
    }

    if districts.is_empty() {
        return Err(SchoolDataError::structure(
            end_year,
            "district level",
            "no district records to aggregate into a state record",
        ));
    }

    let refs: Vec<&NormalizedRecord> = districts.iter().collect();
    let mut state = sum_records(schema, end_year, EntityType::State, &refs);
    state.district_name = Some(opts.state_name.clone());
    debug!(end_year, kind = %schema.kind, districts = districts.len(), "state record summed from districts");

    Ok(Aggregated {
        state,
        districts,
        source: StateSource::Summed,
        warnings,
    })
}

fn as_state(mut rec: NormalizedRecord, state_name: &str) -> NormalizedRecord {
    rec.entity_type = EntityType::State;
    rec.district_id = None;
    rec.district_name = Some(state_name.to_string());
    rec.school_id = None;
    rec.school_name = None;
    rec
}

/// Sum `children` into one record of `entity_type`.
///
/// A count missing in a child contributes nothing; a count missing in every child stays
/// missing. Percentages are recomputed over the children that contribute a derived count.
pub fn sum_records(
    schema: &DatasetSchema,
    end_year: u16,
    entity_type: EntityType,
    children: &[&NormalizedRecord],
) -> NormalizedRecord {
    let mut out = NormalizedRecord::new(end_year, entity_type);
    out.total = sum_present(&mut out.warnings, TOTAL, children.iter().map(|c| c.total));

    let count_fields: BTreeSet<&str> = children
        .iter()
        .flat_map(|c| c.counts.keys().map(String::as_str))
        .collect();
    for field in count_fields {
        let value = sum_present(&mut out.warnings, field, children.iter().map(|c| c.count(field)));
        out.counts.insert(field.to_string(), value);
    }

    let percent_fields: BTreeSet<&str> = children
        .iter()
        .flat_map(|c| c.percents.keys().map(String::as_str))
        .collect();
    for field in percent_fields {
        let base = match schema.field(field).map(|s| s.kind) {
            Some(FieldKind::Percent { base }) => base,
            _ => TOTAL,
        };
        let pairs: Vec<(i64, i64)> = children
            .iter()
            .filter_map(|child| child.derived(field).zip(child.count(base)))
            .collect();
        let derived = sum_present(&mut out.warnings, field, pairs.iter().map(|(d, _)| Some(*d)));
        let base_sum = sum_present(&mut out.warnings, base, pairs.iter().map(|(_, b)| Some(*b))).unwrap_or(0);
        let pct = derived
            .filter(|_| base_sum > 0)
            .map(|d| round6(100.0 * d as f64 / base_sum as f64));
        out.percents
            .insert(field.to_string(), PercentCount { pct, count: derived });
    }

    out
}

/// Sum the present values; `None` when every value is missing. A sum past the `i64` range is
/// clamped and reported once per field.
fn sum_present(
    warnings: &mut Vec<QualityWarning>,
    field: &str,
    values: impl Iterator<Item = Option<i64>>,
) -> Option<i64> {
    let mut sum: Option<i64> = None;
    let mut overflowed = false;
    for v in values.flatten() {
        let acc = sum.unwrap_or(0);
        sum = Some(acc.checked_add(v).unwrap_or_else(|| {
            overflowed = true;
            acc.saturating_add(v)
        }));
    }
    let reported = warnings
        .iter()
        .any(|w| matches!(w, QualityWarning::CountOverflow { field: f } if f == field));
    if overflowed && !reported {
        warn!(field, "count sum exceeds the integer range; clamped");
        warnings.push(QualityWarning::CountOverflow {
            field: field.to_string(),
        });
    }
    sum
}

/// Build district records from school records, grouped by district id (ascending).
pub fn synthesize_districts(
    schema: &DatasetSchema,
    end_year: u16,
    schools: &[NormalizedRecord],
) -> Vec<NormalizedRecord> {
    let mut by_district: BTreeMap<&str, Vec<&NormalizedRecord>> = BTreeMap::new();
    for school in schools {
        if let Some(id) = school.district_id.as_deref() {
            by_district.entry(id).or_default().push(school);
        }
    }

    by_district
        .into_iter()
        .map(|(id, children)| {
            let mut district = sum_records(schema, end_year, EntityType::District, &children);
            district.district_id = Some(id.to_string());
            district.district_name = children.iter().find_map(|c| c.district_name.clone());
            district
        })
        .collect()
}

/// Differences between an embedded aggregate and the corresponding sum beyond rounding.
///
/// Direct counts are compared with [`COUNT_TOLERANCE`], percentages with [`PCT_TOLERANCE`].
/// Fields missing on either side are not compared.
pub fn compare_aggregates(embedded: &NormalizedRecord, summed: &NormalizedRecord) -> Vec<QualityWarning> {
    let mut out = Vec::new();

    let count_fields = std::iter::once(TOTAL).chain(embedded.counts.keys().map(String::as_str));
    for field in count_fields {
        if let (Some(a), Some(b)) = (embedded.count(field), summed.count(field)) {
            if a.abs_diff(b) > COUNT_TOLERANCE.unsigned_abs() {
                out.push(QualityWarning::StateAggregateDiscrepancy {
                    field: field.to_string(),
                    embedded: a as f64,
                    summed: b as f64,
                });
            }
        }
    }

    for field in embedded.percents.keys() {
        if let (Some(a), Some(b)) = (embedded.pct(field), summed.pct(field)) {
            if round6((a - b).abs()) > PCT_TOLERANCE {
                out.push(QualityWarning::StateAggregateDiscrepancy {
                    field: field.clone(),
                    embedded: a,
                    summed: b,
                });
            }
        }
    }

    out
}
