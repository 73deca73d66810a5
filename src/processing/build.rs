//! Extract rows → [`NormalizedRecord`]s.
//!
//! Direct counts go through the plain numeric path. Percentage fields are normalized per
//! column first, then each row derives `round(base × pct / 100)` from its own base count.
//! Entity type comes from the sheet a row was read from; combined sheets are split by whether
//! the site code is populated.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{SchoolDataError, SchoolDataResult};
use crate::ingestion::raw::{normalize_identifier, normalize_site_code, Extract, SheetLevel};
use crate::schema::columns::ColumnResolver;
use crate::schema::era::EraDescriptor;
use crate::schema::fields::{
    dataset_schema, DatasetSchema, FieldKind, FieldSpec, DISTRICT_ID, DISTRICT_NAME, SCHOOL_ID, SCHOOL_NAME, TOTAL,
};
use crate::schema::value::{
    derive_count, is_suppression_token, normalize_percent_column, parse_cell, round6, ParsedCell, PercentColumn,
};
use crate::types::{EntityType, ExtractWarning, NormalizedRecord, PercentCount, QualityWarning};

use super::NormalizeOptions;

/// Records built from one extract, plus the column-level warnings raised while building them.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltExtract {
    pub records: Vec<NormalizedRecord>,
    pub warnings: Vec<ExtractWarning>,
}

/// Build one record per data row of `extract`.
///
/// Only fields active in `era` are read. An active field whose column cannot be found is kept
/// as missing. Rows without a district identifier, and school-sheet rows without a site code,
/// are dropped.
pub fn build_records(
    extract: &Extract,
    era: &EraDescriptor,
    level: SheetLevel,
    end_year: u16,
    opts: &NormalizeOptions,
) -> SchoolDataResult<BuiltExtract> {
    let schema = dataset_schema(era.kind);
    let resolver = ColumnResolver::for_dataset(era.kind);
    let headers = &extract.headers;

    let district_col = resolver.resolve(headers, DISTRICT_ID).unwrap_or(0);
    let district_name_col = resolver.resolve(headers, DISTRICT_NAME);
    let school_col = resolver.resolve(headers, SCHOOL_ID);
    let school_name_col = resolver.resolve(headers, SCHOOL_NAME);

    if level == SheetLevel::School && school_col.is_none() {
        return Err(SchoolDataError::structure(
            end_year,
            &extract.sheet,
            "school-level sheet has no site code column",
        ));
    }

    let columns: Vec<(&'static FieldSpec, Option<usize>)> = era
        .active_fields()
        .filter_map(|name| schema.field(name))
        .map(|spec| (spec, resolver.resolve(headers, spec.name)))
        .collect();

    let mut warnings = Vec::new();
    let mut percent_columns: BTreeMap<&str, PercentColumn> = BTreeMap::new();
    for (spec, idx) in &columns {
        let (FieldKind::Percent { .. }, Some(idx)) = (spec.kind, idx) else {
            continue;
        };
        let pc = normalize_percent_column(&extract.column(*idx));
        if pc.ambiguous {
            warnings.push(ExtractWarning::AmbiguousPercentEncoding {
                sheet: extract.sheet.clone(),
                field: spec.name.to_string(),
            });
        }
        if !era.percent_hint.agrees_with(pc.encoding) {
            warnings.push(ExtractWarning::EncodingHintMismatch {
                sheet: extract.sheet.clone(),
                field: spec.name.to_string(),
                hint: era.percent_hint,
                detected: pc.encoding,
            });
        }
        percent_columns.insert(spec.name, pc);
    }

    let mut records = Vec::with_capacity(extract.rows.len());
    for (i, row) in extract.rows.iter().enumerate() {
        let cell = |idx: usize| row.get(idx).map(|s| s.trim()).unwrap_or("");

        let Some(district_id) = text_value(&normalize_identifier(cell(district_col))) else {
            continue;
        };
        let school_id = school_col.and_then(|c| text_value(&normalize_site_code(cell(c))));

        let entity_type = match (level, school_id.is_some()) {
            (SheetLevel::District, _) => EntityType::District,
            (SheetLevel::School, true) | (SheetLevel::Combined, true) => EntityType::School,
            (SheetLevel::School, false) => continue,
            (SheetLevel::Combined, false) => EntityType::District,
        };

        let mut rec = NormalizedRecord::new(end_year, entity_type);
        rec.district_id = Some(district_id);
        rec.district_name = district_name_col.and_then(|c| text_value(cell(c)));
        if entity_type == EntityType::School {
            rec.school_id = school_id;
            rec.school_name = school_name_col.and_then(|c| text_value(cell(c)));
        }

        // Bases must be in place before any percentage derives from them.
        for (spec, idx) in &columns {
            match spec.kind {
                FieldKind::Count => {
                    let value = idx.and_then(|c| count_value(spec.name, cell(c), &mut rec.warnings));
                    if spec.name == TOTAL {
                        rec.total = value;
                    } else {
                        rec.counts.insert(spec.name.to_string(), value);
                    }
                }
                FieldKind::Text => {
                    rec.attributes
                        .insert(spec.name.to_string(), idx.and_then(|c| text_value(cell(c))));
                }
                FieldKind::Percent { .. } => {}
            }
        }

        for (spec, idx) in &columns {
            let FieldKind::Percent { base } = spec.kind else {
                continue;
            };
            let parsed = percent_columns
                .get(spec.name)
                .and_then(|pc| pc.values.get(i).copied());
            let pct = match (parsed, idx) {
                (Some(ParsedCell::Value(v)), _) => Some(v),
                (Some(ParsedCell::Invalid), Some(c)) => {
                    rec.warnings.push(QualityWarning::UnparseableValue {
                        field: spec.name.to_string(),
                        raw: cell(*c).to_string(),
                    });
                    None
                }
                _ => None,
            };
            if let Some(v) = pct {
                if !(0.0..=100.0).contains(&v) {
                    rec.warnings.push(QualityWarning::PercentOutOfRange {
                        field: spec.name.to_string(),
                        value: v,
                    });
                }
            }
            let count = rec.count(base).zip(pct).map(|(b, p)| derive_count(b, p));
            rec.percents
                .insert(spec.name.to_string(), PercentCount { pct, count });
        }

        check_complements(&mut rec, schema, opts.percent_sum_tolerance);
        records.push(rec);
    }

    debug!(
        sheet = %extract.sheet,
        era = ?era.era,
        ?level,
        records = records.len(),
        resolved = columns.iter().filter(|(_, idx)| idx.is_some()).count(),
        active = columns.len(),
        "records built"
    );

    Ok(BuiltExtract { records, warnings })
}

fn text_value(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if is_suppression_token(trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn count_value(field: &str, raw: &str, warnings: &mut Vec<QualityWarning>) -> Option<i64> {
    match parse_cell(raw) {
        ParsedCell::Value(v) => Some(v.round() as i64),
        ParsedCell::Suppressed => None,
        ParsedCell::Invalid => {
            warnings.push(QualityWarning::UnparseableValue {
                field: field.to_string(),
                raw: raw.trim().to_string(),
            });
            None
        }
    }
}

/// Flag complementary percentage groups whose members are all present but do not sum to 100.
fn check_complements(rec: &mut NormalizedRecord, schema: &DatasetSchema, tolerance: f64) {
    for group in schema.complements {
        let pcts: Option<Vec<f64>> = group.iter().map(|f| rec.pct(f)).collect();
        let Some(pcts) = pcts else {
            continue;
        };
        let sum = round6(pcts.iter().sum());
        if (sum - 100.0).abs() > tolerance {
            rec.warnings.push(QualityWarning::PercentSumDrift {
                fields: group.iter().map(|f| f.to_string()).collect(),
                sum,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::build_records;
    use crate::error::SchoolDataError;
    use crate::ingestion::raw::{Extract, HeaderShape, SheetLevel};
    use crate::processing::NormalizeOptions;
    use crate::schema::era::{era_for_year, PercentHint};
    use crate::schema::value::PercentEncoding;
    use crate::types::{DatasetKind, EntityType, ExtractWarning, QualityWarning};

    fn extract(headers: &[&str], rows: &[&[&str]]) -> Extract {
        Extract {
            sheet: "Total by School System".to_string(),
            shape: HeaderShape::Standard,
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
            first_data_row: 5,
        }
    }

    const ENR_HEADERS: &[&str] = &[
        "School System",
        "School System Name",
        "Total Students",
        "Black",
        "Female %",
        "Male %",
    ];

    #[test]
    fn signed_percent_derives_count_from_total() {
        let era = era_for_year(DatasetKind::Enrollment, 2024).unwrap();
        let ex = extract(
            ENR_HEADERS,
            &[&["000", "Louisiana", "676,751", "290,000", "48.8%", "51.2%"]],
        );
        let built = build_records(&ex, era, SheetLevel::District, 2024, &NormalizeOptions::default()).unwrap();
        let rec = &built.records[0];
        assert_eq!(rec.total, Some(676751));
        assert_eq!(rec.pct("female"), Some(48.8));
        assert_eq!(rec.derived("female"), Some(330254));
        assert!(built.warnings.is_empty(), "{:?}", built.warnings);
    }

    #[test]
    fn fraction_column_is_scaled_before_deriving() {
        let era = era_for_year(DatasetKind::Enrollment, 2023).unwrap();
        let ex = extract(
            ENR_HEADERS,
            &[
                &["000", "Louisiana", "643986", "280000", "0.488", "0.512"],
                &["001", "Acadia Parish", "9000", "2000", "0.49", "0.51"],
            ],
        );
        let built = build_records(&ex, era, SheetLevel::District, 2023, &NormalizeOptions::default()).unwrap();
        let state_row = &built.records[0];
        assert_eq!(state_row.pct("female"), Some(48.8));
        assert_eq!(state_row.derived("female"), Some(314265));
        let acadia = &built.records[1];
        let sum = acadia.derived("female").unwrap() + acadia.derived("male").unwrap();
        assert!((sum - 9000).abs() <= 1);
    }

    #[test]
    fn suppressed_cells_are_missing_never_zero() {
        let era = era_for_year(DatasetKind::Enrollment, 2023).unwrap();
        let ex = extract(
            ENR_HEADERS,
            &[&["001", "Acadia Parish", "*", "<10", "0.49", "0.51"]],
        );
        let built = build_records(&ex, era, SheetLevel::District, 2023, &NormalizeOptions::default()).unwrap();
        let rec = &built.records[0];
        assert_eq!(rec.total, None);
        assert_eq!(rec.count("black"), None);
        assert_eq!(rec.pct("female"), Some(49.0));
        assert_eq!(rec.derived("female"), None);
        assert!(rec.warnings.is_empty());
    }

    #[test]
    fn all_suppressed_column_is_an_all_missing_field() {
        let era = era_for_year(DatasetKind::Enrollment, 2023).unwrap();
        let ex = extract(
            ENR_HEADERS,
            &[
                &["001", "A", "100", "10", "*", "0.5"],
                &["002", "B", "200", "20", "N/A", "0.5"],
            ],
        );
        let built = build_records(&ex, era, SheetLevel::District, 2023, &NormalizeOptions::default()).unwrap();
        for rec in &built.records {
            assert_eq!(rec.pct("female"), None);
            assert_eq!(rec.derived("female"), None);
        }
        assert!(built.warnings.is_empty());
    }

    #[test]
    fn absent_active_fields_are_kept_as_missing() {
        let era = era_for_year(DatasetKind::Enrollment, 2023).unwrap();
        let ex = extract(ENR_HEADERS, &[&["001", "A", "100", "10", "0.5", "0.5"]]);
        let built = build_records(&ex, era, SheetLevel::District, 2023, &NormalizeOptions::default()).unwrap();
        let rec = &built.records[0];
        assert!(rec.counts.contains_key("grade_01"));
        assert_eq!(rec.count("grade_01"), None);
        assert!(!rec.counts.contains_key("grades_01_05"));
    }

    #[test]
    fn garbage_cells_warn_and_out_of_range_is_kept() {
        let era = era_for_year(DatasetKind::Enrollment, 2024).unwrap();
        let ex = extract(
            ENR_HEADERS,
            &[&["001", "A", "100", "lots", "120%", "-20%"]],
        );
        let built = build_records(&ex, era, SheetLevel::District, 2024, &NormalizeOptions::default()).unwrap();
        let rec = &built.records[0];
        assert_eq!(rec.count("black"), None);
        assert_eq!(rec.pct("female"), Some(120.0));
        assert!(rec.warnings.contains(&QualityWarning::UnparseableValue {
            field: "black".into(),
            raw: "lots".into()
        }));
        assert!(rec.warnings.contains(&QualityWarning::PercentOutOfRange {
            field: "female".into(),
            value: 120.0
        }));
    }

    #[test]
    fn complementary_percentages_that_drift_are_flagged() {
        let era = era_for_year(DatasetKind::Enrollment, 2024).unwrap();
        let ex = extract(ENR_HEADERS, &[&["001", "A", "100", "10", "40%", "50%"]]);
        let built = build_records(&ex, era, SheetLevel::District, 2024, &NormalizeOptions::default()).unwrap();
        assert!(built.records[0]
            .warnings
            .iter()
            .any(|w| matches!(w, QualityWarning::PercentSumDrift { sum, .. } if (*sum - 90.0).abs() < 1e-9)));
    }

    #[test]
    fn hint_mismatch_and_ambiguity_are_extract_warnings() {
        let era = era_for_year(DatasetKind::Enrollment, 2024).unwrap();
        let ex = extract(ENR_HEADERS, &[&["001", "A", "100", "10", "1", "0"]]);
        let built = build_records(&ex, era, SheetLevel::District, 2024, &NormalizeOptions::default()).unwrap();
        assert!(built.warnings.contains(&ExtractWarning::AmbiguousPercentEncoding {
            sheet: "Total by School System".into(),
            field: "female".into()
        }));
        assert!(built.warnings.contains(&ExtractWarning::EncodingHintMismatch {
            sheet: "Total by School System".into(),
            field: "female".into(),
            hint: PercentHint::WithSign,
            detected: PercentEncoding::Fraction,
        }));
        assert_eq!(built.records[0].pct("female"), Some(100.0));
    }

    #[test]
    fn combined_sheet_splits_on_site_code() {
        let era = era_for_year(DatasetKind::Enrollment, 2024).unwrap();
        let ex = extract(
            &["School System", "School System Name", "Site Code", "Site Name", "Total Students"],
            &[
                &["001", "Acadia Parish", "", "", "9000"],
                &["001", "Acadia Parish", "001001", "Branch Elementary", "300"],
            ],
        );
        let built = build_records(&ex, era, SheetLevel::Combined, 2024, &NormalizeOptions::default()).unwrap();
        assert_eq!(built.records[0].entity_type, EntityType::District);
        assert_eq!(built.records[0].school_id, None);
        assert_eq!(built.records[1].entity_type, EntityType::School);
        assert_eq!(built.records[1].school_id.as_deref(), Some("001001"));
        assert_eq!(built.records[1].display_name(), Some("Branch Elementary"));
    }

    #[test]
    fn numeric_site_codes_regain_leading_zeros() {
        let era = era_for_year(DatasetKind::Enrollment, 2024).unwrap();
        let ex = extract(
            &["School System", "Site Code", "Site Name", "Total Students"],
            &[
                &["1", "1001", "Branch Elementary", "300"],
                &["036", "036001.0", "Lusher", "500"],
            ],
        );
        let built = build_records(&ex, era, SheetLevel::School, 2024, &NormalizeOptions::default()).unwrap();
        assert_eq!(built.records[0].district_id.as_deref(), Some("001"));
        assert_eq!(built.records[0].school_id.as_deref(), Some("001001"));
        assert_eq!(built.records[1].school_id.as_deref(), Some("036001"));
    }

    #[test]
    fn school_sheet_without_site_code_is_a_structure_error() {
        let era = era_for_year(DatasetKind::Enrollment, 2024).unwrap();
        let ex = extract(ENR_HEADERS, &[&["001", "A", "100", "10", "50%", "50%"]]);
        let err = build_records(&ex, era, SheetLevel::School, 2024, &NormalizeOptions::default()).unwrap_err();
        assert!(matches!(err, SchoolDataError::Structure { year: 2024, .. }));
    }

    #[test]
    fn assessment_percentages_use_the_subject_tested_count() {
        let era = era_for_year(DatasetKind::Assessment, 2024).unwrap();
        let ex = extract(
            &[
                "School System",
                "School System Name",
                "ELA Tested",
                "ELA Advanced",
                "ELA Mastery",
                "ELA Basic",
                "ELA Approaching Basic",
                "ELA Unsatisfactory",
            ],
            &[&["001", "A", "200", "10%", "25%", "30%", "20%", "15%"]],
        );
        let built = build_records(&ex, era, SheetLevel::District, 2024, &NormalizeOptions::default()).unwrap();
        let rec = &built.records[0];
        assert_eq!(rec.count("ela_tested"), Some(200));
        assert_eq!(rec.derived("ela_mastery"), Some(50));
        assert_eq!(rec.total, None);
        assert!(rec.warnings.is_empty(), "{:?}", rec.warnings);
    }

    #[test]
    fn directory_attributes_are_trimmed_text() {
        let era = era_for_year(DatasetKind::Directory, 2024).unwrap();
        let ex = extract(
            &["School System", "School System Name", "Site Code", "Site Name", "City", "Principal"],
            &[&["036", "Orleans Parish", "036001", "Audubon", " New Orleans ", "N/A"]],
        );
        let built = build_records(&ex, era, SheetLevel::Combined, 2024, &NormalizeOptions::default()).unwrap();
        let rec = &built.records[0];
        assert_eq!(rec.attribute("city"), Some("New Orleans"));
        assert_eq!(rec.attribute("principal"), None);
        assert!(rec.attributes.contains_key("zip"));
    }
}
