//! Wide records → long (tidy) rows.

use crate::error::{SchoolDataError, SchoolDataResult};
use crate::schema::fields::{dataset_schema, FieldGroup, FieldKind, FieldSpec, TOTAL};
use crate::types::{DatasetKind, NormalizedRecord, TidyRow};

/// Pivot wide records into one row per (entity, subgroup-or-grade).
///
/// Groups are pivoted independently and concatenated in [`FieldGroup::PIVOT_ORDER`]; within a
/// group rows follow record order, then field-table order. Missing counts produce no row.
pub fn pivot_longer(records: &[NormalizedRecord], kind: DatasetKind) -> SchoolDataResult<Vec<TidyRow>> {
    if !kind.supports_tidy() {
        return Err(SchoolDataError::invalid(format!("{kind} data has no tidy form; use shape 'wide'")));
    }
    let schema = dataset_schema(kind);

    let mut out = Vec::new();
    for group in FieldGroup::PIVOT_ORDER {
        let specs: Vec<&FieldSpec> = schema.fields.iter().filter(|f| f.group == group).collect();
        for rec in records {
            for spec in &specs {
                let count = match spec.kind {
                    FieldKind::Count => rec.count(spec.name),
                    FieldKind::Percent { .. } => rec.derived(spec.name),
                    FieldKind::Text => None,
                };
                let Some(count) = count else {
                    continue;
                };
                out.push(TidyRow {
                    end_year: rec.end_year,
                    entity_type: rec.entity_type,
                    district_id: rec.district_id.clone(),
                    district_name: rec.district_name.clone(),
                    school_id: rec.school_id.clone(),
                    school_name: rec.school_name.clone(),
                    group,
                    label: spec.label.to_string(),
                    count,
                    pct: share(rec, spec, count),
                });
            }
        }
    }
    Ok(out)
}

fn share(rec: &NormalizedRecord, spec: &FieldSpec, count: i64) -> Option<f64> {
    match spec.group {
        FieldGroup::Total if spec.name == TOTAL => Some(1.0),
        FieldGroup::Total | FieldGroup::Attribute => None,
        FieldGroup::Derived => rec.pct(spec.name).map(|p| p / 100.0),
        FieldGroup::Demographic | FieldGroup::Grade => rec
            .total
            .filter(|t| *t > 0)
            .map(|t| count as f64 / t as f64),
    }
}
