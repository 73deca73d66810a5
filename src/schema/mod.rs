//! Schema knowledge about the source extracts.
//!
//! - [`value`]: cell text → numbers, suppression tokens, percentage encodings
//! - [`fields`]: semantic field tables (pattern lists, groups, tidy labels)
//! - [`columns`]: semantic field → column index resolution
//! - [`era`]: which layout a (dataset, year) extract uses

pub mod columns;
pub mod era;
pub mod fields;
pub mod value;

pub use columns::{ColumnResolver, FieldPattern};
pub use era::{available_years, detect_era, validate_year, Era, EraDescriptor, EraSelection, PercentHint};
pub use fields::{dataset_schema, DatasetSchema, FieldGroup, FieldKind, FieldSpec};
pub use value::{normalize_percent_column, parse_cell, parse_count, ParsedCell, PercentColumn, PercentEncoding};
