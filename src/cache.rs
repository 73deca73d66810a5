//! Local cache of fetched record collections.
//!
//! The fetcher talks to a [`Cache`] trait object, so callers can inject [`FileCache`] (the
//! default), [`MemoryCache`], or their own store. A cache never decides freshness: an existing
//! entry is returned as-is until it is overwritten or invalidated.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{SchoolDataError, SchoolDataResult};
use crate::types::{DatasetKind, Records, Shape};

/// Identity of a cached collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub kind: DatasetKind,
    pub shape: Shape,
    pub end_year: u16,
}

impl CacheKey {
    pub fn new(kind: DatasetKind, shape: Shape, end_year: u16) -> Self {
        Self { kind, shape, end_year }
    }

    /// `{prefix}_{shape}_{year}.json`, e.g. `enr_tidy_2024.json`.
    pub fn file_name(&self) -> String {
        format!("{}_{}_{}.json", self.kind.file_prefix(), self.shape, self.end_year)
    }

    /// Inverse of [`Self::file_name`]. Returns `None` for files the cache did not write.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".json")?;
        let mut parts = stem.split('_');
        let (prefix, shape, year) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        let kind = DatasetKind::ALL.into_iter().find(|k| k.file_prefix() == prefix)?;
        let shape = shape.parse().ok()?;
        let end_year = year.parse().ok()?;
        Some(Self { kind, shape, end_year })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.shape, self.end_year)
    }
}

/// Storage for fetched collections, keyed by (dataset, shape, year).
pub trait Cache: Send + Sync {
    fn exists(&self, key: &CacheKey) -> bool;

    /// The cached collection, or `None` on a miss.
    fn get(&self, key: &CacheKey) -> SchoolDataResult<Option<Records>>;

    /// Store `records`, replacing any existing entry.
    fn put(&self, key: &CacheKey, records: &Records) -> SchoolDataResult<()>;

    /// Remove an entry. Returns whether one existed.
    fn invalidate(&self, key: &CacheKey) -> SchoolDataResult<bool>;
}

/// One file in a [`FileCache`] directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<SystemTime>,
}

/// One JSON artifact per key in a local directory.
///
/// Writes go to a temporary file in the same directory and are renamed into place, so a reader
/// never sees a partial artifact.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Environment variable overriding the cache directory.
    pub const ENV_VAR: &'static str = "LASCHOOLDATA_CACHE_DIR";

    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Cache in `$LASCHOOLDATA_CACHE_DIR`, else `$XDG_CACHE_HOME/laschooldata`, else
    /// `$HOME/.cache/laschooldata`, else the system temp directory.
    pub fn from_env() -> Self {
        Self::new(default_cache_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Every entry currently in the cache directory, sorted by key.
    pub fn status(&self) -> SchoolDataResult<Vec<CacheEntry>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = entry.file_name().to_str().and_then(CacheKey::from_file_name) else {
                continue;
            };
            let meta = entry.metadata().map_err(std::io::Error::from)?;
            entries.push(CacheEntry {
                key,
                path: entry.path().to_path_buf(),
                size_bytes: meta.len(),
                modified: meta.modified().ok(),
            });
        }
        entries.sort_by_key(|e| e.key);
        Ok(entries)
    }

    /// Remove entries matching `kind` and `end_year` (`None` matches any). Returns the number
    /// of files removed.
    pub fn clear(&self, kind: Option<DatasetKind>, end_year: Option<u16>) -> SchoolDataResult<usize> {
        let dir = glob::Pattern::escape(&self.dir.to_string_lossy());
        let prefix = kind.map(|k| k.file_prefix()).unwrap_or("*");
        let year = end_year.map(|y| y.to_string()).unwrap_or_else(|| "*".to_string());
        let pattern = format!("{dir}/{prefix}_*_{year}.json");

        let paths = glob::glob(&pattern)
            .map_err(|e| SchoolDataError::invalid(format!("invalid cache pattern '{pattern}': {e}")))?;
        let mut removed = 0;
        for entry in paths {
            let path = entry.map_err(glob::GlobError::into_error)?;
            let is_ours = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(CacheKey::from_file_name)
                .is_some();
            if is_ours {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        debug!(dir = %self.dir.display(), removed, "cache cleared");
        Ok(removed)
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::from_env()
    }
}

fn default_cache_dir() -> PathBuf {
    let non_empty = |var: &str| std::env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from);
    if let Some(dir) = non_empty(FileCache::ENV_VAR) {
        return dir;
    }
    if let Some(xdg) = non_empty("XDG_CACHE_HOME") {
        return xdg.join("laschooldata");
    }
    if let Some(home) = non_empty("HOME") {
        return home.join(".cache").join("laschooldata");
    }
    std::env::temp_dir().join("laschooldata")
}

impl Cache for FileCache {
    fn exists(&self, key: &CacheKey) -> bool {
        self.path_for(key).is_file()
    }

    fn get(&self, key: &CacheKey) -> SchoolDataResult<Option<Records>> {
        let path = self.path_for(key);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_reader::<_, Records>(BufReader::new(file)) {
            Ok(records) if records.shape() == key.shape => Ok(Some(records)),
            Ok(records) => {
                warn!(%key, found = %records.shape(), "cache entry has the wrong shape; ignoring it");
                Ok(None)
            }
            Err(e) => {
                warn!(%key, path = %path.display(), error = %e, "unreadable cache entry; ignoring it");
                Ok(None)
            }
        }
    }

    fn put(&self, key: &CacheKey, records: &Records) -> SchoolDataResult<()> {
        fs::create_dir_all(&self.dir)?;
        let final_path = self.path_for(key);
        let tmp_path = self.dir.join(format!(
            ".{}.{}-{}.tmp",
            key.file_name(),
            std::process::id(),
            unix_nanos()
        ));

        let written = (|| -> SchoolDataResult<()> {
            let mut w = BufWriter::new(File::create(&tmp_path)?);
            serde_json::to_writer(&mut w, records)?;
            w.flush()?;
            Ok(())
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        fs::rename(&tmp_path, &final_path)?;
        debug!(%key, path = %final_path.display(), rows = records.len(), "cache entry written");
        Ok(())
    }

    fn invalidate(&self, key: &CacheKey) -> SchoolDataResult<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// In-process cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, Records>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn exists(&self, key: &CacheKey) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn get(&self, key: &CacheKey) -> SchoolDataResult<Option<Records>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn put(&self, key: &CacheKey, records: &Records) -> SchoolDataResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*key, records.clone());
        Ok(())
    }

    fn invalidate(&self, key: &CacheKey) -> SchoolDataResult<bool> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some())
    }
}
