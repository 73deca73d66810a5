//! Fetch orchestration: cache → download → decode → normalize → cache.
//!
//! This module sits "above" [`crate::processing`] and provides:
//!
//! - the [`Fetcher`], which owns an injected [`WorkbookSource`] and [`Cache`]
//! - multi-year fetches with optional parallelism (one `rayon` task per year)
//! - observer hooks and real-time metrics for monitoring

mod metrics;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{info, warn};

use crate::cache::{Cache, CacheKey, FileCache};
use crate::error::{SchoolDataError, SchoolDataResult};
use crate::ingestion::observability::{severity_for_error, FetchContext, FetchObserver, FetchSeverity, FetchStats};
use crate::ingestion::unified::read_workbook;
use crate::processing::{normalize_workbook, NormalizeOptions};
use crate::schema::era::validate_year;
use crate::source::{validate_download, DirectorySource, WorkbookSource};
use crate::types::{DatasetKind, Records, Shape};

pub use metrics::{FetchMetrics, FetchMetricsSnapshot};

/// Options controlling fetch behavior.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct FetchOptions {
    /// Normalization settings applied to every downloaded workbook.
    pub normalize: NormalizeOptions,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn FetchObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: FetchSeverity,
    /// Worker threads for multi-year fetches. `None` or `Some(1)` runs years sequentially.
    pub num_threads: Option<usize>,
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("normalize", &self.normalize)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .field("num_threads", &self.num_threads)
            .finish()
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            normalize: NormalizeOptions::default(),
            observer: None,
            alert_at_or_above: FetchSeverity::Critical,
            num_threads: None,
        }
    }
}

/// A year that could not be fetched as part of a multi-year request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearFailure {
    pub end_year: u16,
    pub severity: FetchSeverity,
    pub message: String,
}

/// Result of a multi-year fetch: every successful year concatenated in request order, plus the
/// years that failed.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiYearFetch {
    pub records: Records,
    pub failures: Vec<YearFailure>,
}

/// Fetches normalized records for (dataset, year, shape), going through a cache.
pub struct Fetcher {
    source: Arc<dyn WorkbookSource>,
    cache: Arc<dyn Cache>,
    opts: FetchOptions,
    metrics: Arc<FetchMetrics>,
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("opts", &self.opts)
            .field("metrics", &self.metrics.snapshot())
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    pub fn new(source: Arc<dyn WorkbookSource>, cache: Arc<dyn Cache>) -> Self {
        Self {
            source,
            cache,
            opts: FetchOptions::default(),
            metrics: Arc::new(FetchMetrics::new()),
        }
    }

    /// Workbooks from a local directory, cached in the default [`FileCache`] location.
    pub fn from_directory(root: impl AsRef<Path>) -> Self {
        Self::new(
            Arc::new(DirectorySource::new(root)),
            Arc::new(FileCache::from_env()),
        )
    }

    pub fn with_options(mut self, opts: FetchOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn options(&self) -> &FetchOptions {
        &self.opts
    }

    pub fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    /// Get a handle to real-time fetch metrics.
    pub fn metrics(&self) -> Arc<FetchMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Fetch one (dataset, year) in the requested shape.
    ///
    /// - Invalid years and unsupported shapes fail with `InvalidArgument` before any I/O.
    /// - `use_cache = true` returns a cached collection when one exists.
    /// - Every successful computation is written to the cache, so `use_cache = false` is a
    ///   forced refetch that overwrites the entry. Failures never write.
    pub fn fetch(&self, kind: DatasetKind, end_year: u16, shape: Shape, use_cache: bool) -> SchoolDataResult<Records> {
        validate_request(kind, end_year, shape)?;
        let ctx = FetchContext { kind, end_year, shape };

        let start = Instant::now();
        self.metrics.on_fetch_start();
        let result = self.fetch_unchecked(&ctx, use_cache);
        self.metrics.on_fetch_end(result.is_ok(), start.elapsed());

        if let Some(obs) = self.opts.observer.as_ref() {
            match &result {
                Ok((records, from_cache)) => obs.on_success(
                    &ctx,
                    FetchStats {
                        records: records.len(),
                        from_cache: *from_cache,
                    },
                ),
                Err(e) => {
                    let sev = severity_for_error(e);
                    obs.on_failure(&ctx, sev, e);
                    if sev >= self.opts.alert_at_or_above {
                        obs.on_alert(&ctx, sev, e);
                    }
                }
            }
        }

        result.map(|(records, _)| records)
    }

    fn fetch_unchecked(&self, ctx: &FetchContext, use_cache: bool) -> SchoolDataResult<(Records, bool)> {
        let FetchContext { kind, end_year, shape } = *ctx;
        let key = CacheKey::new(kind, shape, end_year);

        if use_cache {
            match self.cache.get(&key) {
                Ok(Some(records)) => {
                    self.metrics.on_cache_hit();
                    info!(%key, rows = records.len(), "cache hit");
                    return Ok((records, true));
                }
                Ok(None) => {}
                Err(e) => warn!(%key, error = %e, "cache read failed; refetching"),
            }
        }

        let download = self.source.download(kind, end_year)?;
        self.metrics.on_download();
        validate_download(&download, end_year)?;

        let workbook = read_workbook(download.bytes, None, end_year)?;
        let normalized = normalize_workbook(kind, end_year, &workbook, &self.opts.normalize)?;
        if let Some(obs) = self.opts.observer.as_ref() {
            for w in &normalized.warnings {
                obs.on_warning(ctx, w);
            }
        }
        let era = normalized.era;
        let records = normalized.into_records(shape)?;

        match self.cache.put(&key, &records) {
            Ok(()) => self.metrics.on_cache_write(),
            Err(e) => warn!(%key, error = %e, "cache write failed; returning uncached result"),
        }
        info!(%key, ?era, rows = records.len(), "fetched");
        Ok((records, false))
    }

    /// Fetch several years of one dataset and concatenate them in request order.
    ///
    /// Every year is validated before any work starts; one invalid year fails the whole call.
    /// A year that fails to download or parse is reported in [`MultiYearFetch::failures`]
    /// and the remaining years are still returned.
    pub fn fetch_multi(
        &self,
        kind: DatasetKind,
        end_years: &[u16],
        shape: Shape,
        use_cache: bool,
    ) -> SchoolDataResult<MultiYearFetch> {
        for &year in end_years {
            validate_request(kind, year, shape)?;
        }

        let run = |year: u16| (year, self.fetch(kind, year, shape, use_cache));
        let outcomes: Vec<(u16, SchoolDataResult<Records>)> = match self.opts.num_threads {
            Some(n) if n > 1 && end_years.len() > 1 => {
                let pool = ThreadPoolBuilder::new().num_threads(n).build()?;
                pool.install(|| end_years.par_iter().map(|&y| run(y)).collect())
            }
            _ => end_years.iter().map(|&y| run(y)).collect(),
        };

        let mut records = Records::empty(shape);
        let mut failures = Vec::new();
        for (year, outcome) in outcomes {
            match outcome {
                Ok(part) => records.append(part),
                Err(e) if is_year_local(&e) => {
                    warn!(%kind, end_year = year, error = %e, "year skipped");
                    failures.push(YearFailure {
                        end_year: year,
                        severity: severity_for_error(&e),
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(MultiYearFetch { records, failures })
    }

    pub fn fetch_enr(&self, end_year: u16, shape: Shape, use_cache: bool) -> SchoolDataResult<Records> {
        self.fetch(DatasetKind::Enrollment, end_year, shape, use_cache)
    }

    pub fn fetch_enr_multi(&self, end_years: &[u16], shape: Shape, use_cache: bool) -> SchoolDataResult<MultiYearFetch> {
        self.fetch_multi(DatasetKind::Enrollment, end_years, shape, use_cache)
    }

    pub fn fetch_assessment(&self, end_year: u16, shape: Shape, use_cache: bool) -> SchoolDataResult<Records> {
        self.fetch(DatasetKind::Assessment, end_year, shape, use_cache)
    }

    pub fn fetch_assessment_multi(
        &self,
        end_years: &[u16],
        shape: Shape,
        use_cache: bool,
    ) -> SchoolDataResult<MultiYearFetch> {
        self.fetch_multi(DatasetKind::Assessment, end_years, shape, use_cache)
    }

    /// Directory data only exists in wide form.
    pub fn fetch_directory(&self, end_year: u16, use_cache: bool) -> SchoolDataResult<Records> {
        self.fetch(DatasetKind::Directory, end_year, Shape::Wide, use_cache)
    }
}

fn validate_request(kind: DatasetKind, end_year: u16, shape: Shape) -> SchoolDataResult<()> {
    validate_year(kind, end_year)?;
    if shape == Shape::Tidy && !kind.supports_tidy() {
        return Err(SchoolDataError::invalid(format!(
            "{kind} data has no tidy form; use shape 'wide'"
        )));
    }
    Ok(())
}

/// Errors that only affect the year they occurred in.
fn is_year_local(e: &SchoolDataError) -> bool {
    !matches!(
        e,
        SchoolDataError::InvalidArgument { .. } | SchoolDataError::ThreadPool(_)
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::{FetchOptions, Fetcher};
    use crate::cache::{Cache, CacheKey, MemoryCache};
    use crate::error::{SchoolDataError, SchoolDataResult};
    use crate::ingestion::observability::{FetchContext, FetchObserver, FetchSeverity, FetchStats};
    use crate::source::{Download, WorkbookSource};
    use crate::types::{DatasetKind, EntityType, ExtractWarning, Records, Shape};

    const ENR_CSV: &str = "\
October Multi Stats
School System,School System Name,Total Students,Female %,Male %
000,State Total,\"400\",42.5%,57.5%
001,Acadia Parish,100,50.0%,50.0%
002,Allen Parish,300,40.0%,60.0%
";

    #[derive(Default)]
    struct FixtureSource {
        files: HashMap<u16, Vec<u8>>,
        calls: AtomicUsize,
    }

    impl FixtureSource {
        fn with(years: &[u16]) -> Self {
            Self {
                files: years.iter().map(|y| (*y, ENR_CSV.as_bytes().to_vec())).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl WorkbookSource for FixtureSource {
        fn download(&self, _kind: DatasetKind, end_year: u16) -> SchoolDataResult<Download> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.files.get(&end_year) {
                Some(bytes) => Ok(Download {
                    bytes: bytes.clone(),
                    content_type: Some("text/csv".into()),
                    origin: format!("fixture:{end_year}"),
                }),
                None => Err(SchoolDataError::transport(end_year, "404 on every candidate")),
            }
        }
    }

    fn fetcher(years: &[u16]) -> (Fetcher, Arc<FixtureSource>, Arc<MemoryCache>) {
        let source = Arc::new(FixtureSource::with(years));
        let cache = Arc::new(MemoryCache::new());
        let f = Fetcher::new(source.clone(), cache.clone());
        (f, source, cache)
    }

    #[test]
    fn fetch_normalizes_and_caches() {
        let (f, source, cache) = fetcher(&[2024]);
        let wide = f.fetch_enr(2024, Shape::Wide, true).unwrap();
        let rows = wide.as_wide().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].entity_type, EntityType::State);
        assert!(cache.exists(&CacheKey::new(DatasetKind::Enrollment, Shape::Wide, 2024)));

        let again = f.fetch_enr(2024, Shape::Wide, true).unwrap();
        assert_eq!(again, wide);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.metrics().snapshot().cache_hits, 1);
    }

    #[test]
    fn use_cache_false_refetches_and_overwrites() {
        let (f, source, cache) = fetcher(&[2024]);
        let key = CacheKey::new(DatasetKind::Enrollment, Shape::Tidy, 2024);
        cache.put(&key, &Records::Tidy(Vec::new())).unwrap();

        let fresh = f.fetch_enr(2024, Shape::Tidy, false).unwrap();
        assert!(!fresh.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&key).unwrap(), Some(fresh));
    }

    #[test]
    fn failures_never_write_the_cache() {
        let (f, _source, cache) = fetcher(&[]);
        let err = f.fetch_enr(2024, Shape::Wide, true).unwrap_err();
        assert!(matches!(err, SchoolDataError::Transport { year: 2024, .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn invalid_requests_fail_before_io() {
        let (f, source, _cache) = fetcher(&[2024]);
        assert!(matches!(
            f.fetch_enr(1990, Shape::Wide, true),
            Err(SchoolDataError::InvalidArgument { .. })
        ));
        assert!(matches!(
            f.fetch(DatasetKind::Directory, 2024, Shape::Tidy, true),
            Err(SchoolDataError::InvalidArgument { .. })
        ));
        assert!(matches!(
            f.fetch_enr_multi(&[2024, 1990], Shape::Wide, true),
            Err(SchoolDataError::InvalidArgument { .. })
        ));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn multi_year_keeps_order_and_reports_failed_years() {
        let (f, _source, _cache) = fetcher(&[2022, 2024]);
        let out = f.fetch_enr_multi(&[2024, 2023, 2022], Shape::Wide, true).unwrap();
        let years: Vec<u16> = out.records.as_wide().unwrap().iter().map(|r| r.end_year).collect();
        assert_eq!(years, vec![2024, 2024, 2024, 2022, 2022, 2022]);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].end_year, 2023);
        assert_eq!(out.failures[0].severity, FetchSeverity::Critical);
    }

    #[test]
    fn parallel_multi_year_matches_sequential() {
        let years = [2020, 2021, 2022, 2023, 2024, 2025];
        let (seq, _, _) = fetcher(&years);
        let (par, _, _) = fetcher(&years);
        let par = par.with_options(FetchOptions {
            num_threads: Some(4),
            ..Default::default()
        });
        let a = seq.fetch_enr_multi(&years, Shape::Tidy, true).unwrap();
        let b = par.fetch_enr_multi(&years, Shape::Tidy, true).unwrap();
        assert_eq!(a, b);
        assert!(b.failures.is_empty());
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl FetchObserver for RecordingObserver {
        fn on_success(&self, ctx: &FetchContext, stats: FetchStats) {
            self.events
                .lock()
                .unwrap()
                .push(format!("ok:{}:{}", ctx.end_year, stats.from_cache));
        }

        fn on_failure(&self, ctx: &FetchContext, severity: FetchSeverity, _error: &SchoolDataError) {
            self.events
                .lock()
                .unwrap()
                .push(format!("fail:{}:{severity:?}", ctx.end_year));
        }

        fn on_alert(&self, ctx: &FetchContext, _severity: FetchSeverity, _error: &SchoolDataError) {
            self.events.lock().unwrap().push(format!("alert:{}", ctx.end_year));
        }

        fn on_warning(&self, _ctx: &FetchContext, warning: &ExtractWarning) {
            if matches!(warning, ExtractWarning::ColumnCountMismatch { .. }) {
                self.events.lock().unwrap().push("columns".to_string());
            }
        }
    }

    #[test]
    fn observer_sees_success_failure_alert_and_warnings() {
        let (f, _, _) = fetcher(&[2024]);
        let obs = Arc::new(RecordingObserver::default());
        let f = f.with_options(FetchOptions {
            observer: Some(obs.clone()),
            ..Default::default()
        });
        f.fetch_enr(2024, Shape::Wide, true).unwrap();
        f.fetch_enr(2024, Shape::Wide, true).unwrap();
        let _ = f.fetch_enr(2023, Shape::Wide, true);

        let events = obs.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["columns", "ok:2024:false", "ok:2024:true", "fail:2023:Critical", "alert:2023"]
        );
    }
}
