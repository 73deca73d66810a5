use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::SchoolDataError;
use crate::types::{DatasetKind, ExtractWarning, Shape};

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FetchSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (operation failed).
    Error,
    /// Critical error (typically I/O or other infrastructure failures).
    Critical,
}

/// Which (dataset, year, shape) a fetch was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchContext {
    pub kind: DatasetKind,
    pub end_year: u16,
    pub shape: Shape,
}

/// Minimal stats reported on a successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchStats {
    /// Number of records (wide) or rows (tidy) returned.
    pub records: usize,
    /// Whether the result came from the cache.
    pub from_cache: bool,
}

/// Observer interface for fetch outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait FetchObserver: Send + Sync {
    /// Called when a fetch succeeds.
    fn on_success(&self, _ctx: &FetchContext, _stats: FetchStats) {}

    /// Called when a fetch fails.
    fn on_failure(&self, _ctx: &FetchContext, _severity: FetchSeverity, _error: &SchoolDataError) {}

    /// Called when a fetch failure meets an alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &FetchContext, severity: FetchSeverity, error: &SchoolDataError) {
        self.on_failure(ctx, severity, error)
    }

    /// Called for every column-level anomaly found while normalizing an extract.
    fn on_warning(&self, _ctx: &FetchContext, _warning: &ExtractWarning) {}
}

/// Map an error to its alerting severity. I/O and transport failures are critical.
pub fn severity_for_error(e: &SchoolDataError) -> FetchSeverity {
    match e {
        SchoolDataError::Io(_) | SchoolDataError::Transport { .. } => FetchSeverity::Critical,
        SchoolDataError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => FetchSeverity::Critical,
            _ => FetchSeverity::Error,
        },
        #[cfg(feature = "excel")]
        SchoolDataError::Excel(_) => FetchSeverity::Error,
        SchoolDataError::Json(_)
        | SchoolDataError::ThreadPool(_)
        | SchoolDataError::InvalidArgument { .. }
        | SchoolDataError::Structure { .. } => FetchSeverity::Error,
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn FetchObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn FetchObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl FetchObserver for CompositeObserver {
    fn on_success(&self, ctx: &FetchContext, stats: FetchStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &FetchContext, severity: FetchSeverity, error: &SchoolDataError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &FetchContext, severity: FetchSeverity, error: &SchoolDataError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }

    fn on_warning(&self, ctx: &FetchContext, warning: &ExtractWarning) {
        for o in &self.observers {
            o.on_warning(ctx, warning);
        }
    }
}

/// Logs fetch events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl FetchObserver for StdErrObserver {
    fn on_success(&self, ctx: &FetchContext, stats: FetchStats) {
        eprintln!(
            "[fetch][ok] dataset={} year={} shape={} records={} cached={}",
            ctx.kind, ctx.end_year, ctx.shape, stats.records, stats.from_cache
        );
    }

    fn on_failure(&self, ctx: &FetchContext, severity: FetchSeverity, error: &SchoolDataError) {
        eprintln!(
            "[fetch][{:?}] dataset={} year={} shape={} err={}",
            severity, ctx.kind, ctx.end_year, ctx.shape, error
        );
    }

    fn on_alert(&self, ctx: &FetchContext, severity: FetchSeverity, error: &SchoolDataError) {
        eprintln!(
            "[ALERT][fetch][{:?}] dataset={} year={} shape={} err={}",
            severity, ctx.kind, ctx.end_year, ctx.shape, error
        );
    }

    fn on_warning(&self, ctx: &FetchContext, warning: &ExtractWarning) {
        eprintln!(
            "[fetch][warn] dataset={} year={} {}",
            ctx.kind, ctx.end_year, warning
        );
    }
}

/// Appends fetch events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl FetchObserver for FileObserver {
    fn on_success(&self, ctx: &FetchContext, stats: FetchStats) {
        self.append_line(&format!(
            "{} ok dataset={} year={} shape={} records={} cached={}",
            unix_ts(),
            ctx.kind,
            ctx.end_year,
            ctx.shape,
            stats.records,
            stats.from_cache
        ));
    }

    fn on_failure(&self, ctx: &FetchContext, severity: FetchSeverity, error: &SchoolDataError) {
        self.append_line(&format!(
            "{} fail severity={:?} dataset={} year={} shape={} err={}",
            unix_ts(),
            severity,
            ctx.kind,
            ctx.end_year,
            ctx.shape,
            error
        ));
    }

    fn on_alert(&self, ctx: &FetchContext, severity: FetchSeverity, error: &SchoolDataError) {
        self.append_line(&format!(
            "{} ALERT severity={:?} dataset={} year={} shape={} err={}",
            unix_ts(),
            severity,
            ctx.kind,
            ctx.end_year,
            ctx.shape,
            error
        ));
    }

    fn on_warning(&self, ctx: &FetchContext, warning: &ExtractWarning) {
        self.append_line(&format!(
            "{} warn dataset={} year={} {}",
            unix_ts(),
            ctx.kind,
            ctx.end_year,
            warning
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
