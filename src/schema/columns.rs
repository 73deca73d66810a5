//! Semantic field → physical column resolution.
//!
//! A field's patterns are tried in order; for each pattern every header is scanned in order, and
//! the first header that matches wins. Resolution stops at the first pattern that matches
//! anything. No match is a normal outcome: the field is simply absent from this extract.

use std::fmt;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::types::DatasetKind;

use super::fields::{
    dataset_schema, FieldSpec, DISTRICT_SHEET_PATTERNS, IDENTITY_FIELDS, SCHOOL_SHEET_PATTERNS,
};

/// Compiled, case-insensitive pattern list for one semantic field.
#[derive(Clone)]
pub struct FieldPattern {
    pub field: &'static str,
    patterns: Vec<Regex>,
}

impl FieldPattern {
    pub fn compile(field: &'static str, patterns: &[&str]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { field, patterns })
    }

    /// Index of the first candidate matched by the earliest pattern that matches anything.
    pub fn first_match<S: AsRef<str>>(&self, candidates: &[S]) -> Option<usize> {
        self.patterns.iter().find_map(|re| {
            candidates
                .iter()
                .position(|c| re.is_match(c.as_ref().trim()))
        })
    }
}

impl fmt::Debug for FieldPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldPattern")
            .field("field", &self.field)
            .field(
                "patterns",
                &self.patterns.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Resolver for every field of a dataset (identity fields included).
#[derive(Debug, Clone)]
pub struct ColumnResolver {
    fields: Vec<FieldPattern>,
}

impl ColumnResolver {
    pub fn new<'a>(specs: impl IntoIterator<Item = &'a FieldSpec>) -> Result<Self, regex::Error> {
        let fields = specs
            .into_iter()
            .map(|s| FieldPattern::compile(s.name, s.patterns))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { fields })
    }

    /// The shared, lazily compiled resolver for a built-in dataset.
    pub fn for_dataset(kind: DatasetKind) -> &'static ColumnResolver {
        match kind {
            DatasetKind::Enrollment => &ENROLLMENT_RESOLVER,
            DatasetKind::Assessment => &ASSESSMENT_RESOLVER,
            DatasetKind::Directory => &DIRECTORY_RESOLVER,
        }
    }

    /// Column index for `field`, or `None` when absent (or when `field` is unknown).
    pub fn resolve<S: AsRef<str>>(&self, headers: &[S], field: &str) -> Option<usize> {
        self.fields
            .iter()
            .find(|f| f.field == field)
            .and_then(|f| f.first_match(headers))
    }
}

fn builtin(kind: DatasetKind) -> ColumnResolver {
    ColumnResolver::new(IDENTITY_FIELDS.iter().chain(dataset_schema(kind).fields))
        .expect("built-in field patterns compile")
}

static ENROLLMENT_RESOLVER: Lazy<ColumnResolver> = Lazy::new(|| builtin(DatasetKind::Enrollment));
static ASSESSMENT_RESOLVER: Lazy<ColumnResolver> = Lazy::new(|| builtin(DatasetKind::Assessment));
static DIRECTORY_RESOLVER: Lazy<ColumnResolver> = Lazy::new(|| builtin(DatasetKind::Directory));

pub(crate) static DISTRICT_SHEET: Lazy<FieldPattern> = Lazy::new(|| {
    FieldPattern::compile("district_sheet", DISTRICT_SHEET_PATTERNS)
        .expect("built-in sheet patterns compile")
});

pub(crate) static SCHOOL_SHEET: Lazy<FieldPattern> = Lazy::new(|| {
    FieldPattern::compile("school_sheet", SCHOOL_SHEET_PATTERNS)
        .expect("built-in sheet patterns compile")
});
