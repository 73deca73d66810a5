//! Where workbook bytes come from.
//!
//! The fetcher only needs "give me the bytes for (dataset, year)"; URL patterns and local
//! layouts live behind [`WorkbookSource`]. Every payload goes through [`validate_download`]
//! before it is decoded.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{SchoolDataError, SchoolDataResult};
use crate::ingestion::unified::WorkbookFormat;
use crate::types::DatasetKind;

/// Spreadsheet payloads smaller than this are treated as error pages or truncated downloads.
pub const MIN_WORKBOOK_BYTES: usize = 1024;

/// A downloaded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub bytes: Vec<u8>,
    /// `Content-Type` as reported by the server, when there is one.
    pub content_type: Option<String>,
    /// URL or path the bytes came from.
    pub origin: String,
}

/// Supplies the raw workbook for a (dataset, year).
pub trait WorkbookSource: Send + Sync {
    fn download(&self, kind: DatasetKind, end_year: u16) -> SchoolDataResult<Download>;
}

/// Reject payloads that are clearly not a workbook: HTML block/error pages, empty bodies and
/// spreadsheets too small to hold an extract.
pub fn validate_download(download: &Download, end_year: u16) -> SchoolDataResult<()> {
    let bytes = &download.bytes;
    if bytes.is_empty() {
        return Err(SchoolDataError::transport(
            end_year,
            format!("empty payload from {}", download.origin),
        ));
    }

    let html_type = download
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("text/html"));
    if html_type || looks_like_markup(bytes) {
        return Err(SchoolDataError::transport(
            end_year,
            format!("received an HTML page instead of a workbook from {}", download.origin),
        ));
    }

    if WorkbookFormat::sniff(bytes) == Some(WorkbookFormat::Excel) && bytes.len() < MIN_WORKBOOK_BYTES {
        return Err(SchoolDataError::transport(
            end_year,
            format!(
                "workbook from {} is only {} bytes (minimum {MIN_WORKBOOK_BYTES})",
                download.origin,
                bytes.len()
            ),
        ));
    }
    Ok(())
}

fn looks_like_markup(bytes: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]).to_ascii_lowercase();
    let head = head.trim_start_matches('\u{feff}').trim_start();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.starts_with("<head")
}

/// Workbooks stored locally as `{root}/{prefix}_{year}.{ext}` (e.g. `enr_2024.xlsx`).
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The workbook file for (dataset, year), if one with a known extension exists.
    pub fn locate(&self, kind: DatasetKind, end_year: u16) -> SchoolDataResult<Option<PathBuf>> {
        let pattern = format!(
            "{}/{}_{end_year}.*",
            glob::Pattern::escape(&self.root.to_string_lossy()),
            kind.file_prefix()
        );
        let paths = glob::glob(&pattern)
            .map_err(|e| SchoolDataError::invalid(format!("invalid source pattern '{pattern}': {e}")))?;

        let mut found: Vec<PathBuf> = Vec::new();
        for entry in paths {
            let path = entry.map_err(glob::GlobError::into_error)?;
            let known = path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(WorkbookFormat::from_extension)
                .is_some();
            if known && path.is_file() {
                found.push(path);
            }
        }
        found.sort();
        Ok(found.into_iter().next())
    }
}

impl WorkbookSource for DirectorySource {
    fn download(&self, kind: DatasetKind, end_year: u16) -> SchoolDataResult<Download> {
        let path = self.locate(kind, end_year)?.ok_or_else(|| {
            SchoolDataError::transport(
                end_year,
                format!(
                    "no {kind} workbook named {}_{end_year}.* in {}",
                    kind.file_prefix(),
                    self.root.display()
                ),
            )
        })?;
        let bytes = std::fs::read(&path)
            .map_err(|e| SchoolDataError::transport(end_year, format!("{}: {e}", path.display())))?;
        debug!(%kind, end_year, path = %path.display(), bytes = bytes.len(), "local workbook read");
        Ok(Download {
            bytes,
            content_type: None,
            origin: path.display().to_string(),
        })
    }
}

#[cfg(feature = "http")]
pub use http::HttpSource;

#[cfg(feature = "http")]
mod http {
    use std::fmt;
    use std::time::Duration;

    use reqwest::blocking::Client;
    use reqwest::header::CONTENT_TYPE;
    use tracing::debug;

    use super::{validate_download, Download, WorkbookSource};
    use crate::error::{SchoolDataError, SchoolDataResult};
    use crate::types::DatasetKind;

    type CandidateFn = dyn Fn(DatasetKind, u16) -> Vec<String> + Send + Sync;

    /// Downloads over HTTP, trying caller-supplied candidate URLs in order.
    ///
    /// The first response that is successful *and* passes [`validate_download`] wins.
    pub struct HttpSource {
        client: Client,
        candidates: Box<CandidateFn>,
    }

    impl HttpSource {
        pub fn new(
            candidates: impl Fn(DatasetKind, u16) -> Vec<String> + Send + Sync + 'static,
        ) -> SchoolDataResult<Self> {
            let client = Client::builder()
                .timeout(Duration::from_secs(120))
                .user_agent(concat!("laschooldata/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| SchoolDataError::invalid(format!("cannot build http client: {e}")))?;
            Ok(Self {
                client,
                candidates: Box::new(candidates),
            })
        }
    }

    impl fmt::Debug for HttpSource {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("HttpSource").finish_non_exhaustive()
        }
    }

    impl WorkbookSource for HttpSource {
        fn download(&self, kind: DatasetKind, end_year: u16) -> SchoolDataResult<Download> {
            let urls = (self.candidates)(kind, end_year);
            if urls.is_empty() {
                return Err(SchoolDataError::transport(
                    end_year,
                    format!("no candidate URLs for {kind}"),
                ));
            }

            let mut failures: Vec<String> = Vec::with_capacity(urls.len());
            for url in &urls {
                let attempt = self
                    .client
                    .get(url)
                    .send()
                    .and_then(|r| r.error_for_status());
                let resp = match attempt {
                    Ok(resp) => resp,
                    Err(e) => {
                        debug!(%kind, end_year, %url, error = %e, "candidate failed");
                        failures.push(format!("{url}: {e}"));
                        continue;
                    }
                };
                let content_type = resp
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let bytes = match resp.bytes() {
                    Ok(b) => b.to_vec(),
                    Err(e) => {
                        failures.push(format!("{url}: {e}"));
                        continue;
                    }
                };
                let download = Download {
                    bytes,
                    content_type,
                    origin: url.clone(),
                };
                match validate_download(&download, end_year) {
                    Ok(()) => {
                        debug!(%kind, end_year, %url, bytes = download.bytes.len(), "downloaded");
                        return Ok(download);
                    }
                    Err(e) => {
                        debug!(%kind, end_year, %url, error = %e, "candidate rejected");
                        failures.push(e.to_string());
                    }
                }
            }

            Err(SchoolDataError::transport(
                end_year,
                format!(
                    "all {} candidate URLs failed: {}",
                    urls.len(),
                    failures.join("; ")
                ),
            ))
        }
    }
}

impl fmt::Display for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.origin, self.bytes.len())
    }
}
