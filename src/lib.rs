//! `laschooldata` fetches yearly Louisiana public-education spreadsheet extracts (enrollment,
//! LEAP assessment, school directory) and normalizes them into stable record sets.
//!
//! The published workbooks change layout from year to year: column names drift, percentages
//! switch between fractions and signed percents, suppression markers replace small counts and the
//! grade breakdown moves from bands to single grades. This crate hides all of that behind one
//! schema per dataset.
//!
//! The primary entrypoint is [`execution::Fetcher`]:
//!
//! - [`execution::Fetcher::fetch`] downloads (or reads from cache) one (dataset, year) and returns
//!   [`types::Records`] in wide or tidy shape
//! - [`execution::Fetcher::fetch_multi`] does the same for several years, optionally in parallel
//!
//! ## Quick example: fetch from a local directory
//!
//! ```no_run
//! use laschooldata::execution::Fetcher;
//! use laschooldata::types::Shape;
//!
//! # fn main() -> Result<(), laschooldata::SchoolDataError> {
//! // Looks for `./extracts/enr_2024.xlsx` (or `.csv`, `.xls`, ...).
//! let fetcher = Fetcher::from_directory("./extracts");
//! let records = fetcher.fetch_enr(2024, Shape::Tidy, true)?;
//! println!("rows={}", records.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! WorkbookSource ──bytes──▶ ingestion::read_workbook ──RawWorkbook──▶ processing::normalize_workbook
//!                                                                          │
//!                         Cache ◀──Records (wide | tidy)──────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`schema`]: value parsing, field tables, column resolution, era table
//! - [`ingestion`]: workbook decoding, header/data-row location, fetch observers
//! - [`processing`]: record building, state/district aggregation, tidy pivot
//! - [`cache`]: file and in-memory caches keyed by (dataset, shape, year)
//! - [`source`]: where workbook bytes come from (local directory, HTTP with feature `http`)
//! - [`execution`]: the [`execution::Fetcher`] and its metrics
//! - [`types`], [`error`]: the data model and the crate error type
//!
//! ## Missing values
//!
//! Suppressed cells (`<10`, `~`, `*`, `N/A`, ...) and absent columns are `None` everywhere.
//! They are never turned into zero, and sums over fields that are missing in every input stay
//! `None`.

pub mod cache;
pub mod error;
pub mod execution;
pub mod ingestion;
pub mod processing;
pub mod schema;
pub mod source;
pub mod types;

pub use error::{SchoolDataError, SchoolDataResult};
pub use execution::{FetchOptions, Fetcher, MultiYearFetch, YearFailure};
pub use schema::era::available_years as get_available_years;
pub use types::{DatasetKind, EntityType, NormalizedRecord, Records, Shape, TidyRow};
