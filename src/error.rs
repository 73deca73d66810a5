use thiserror::Error;

/// Convenience result type used across the crate.
pub type SchoolDataResult<T> = Result<T, SchoolDataError>;

/// Error type returned by fetch, normalization and cache functions.
///
/// This is a single error enum shared by every dataset. Data-quality anomalies are *not* errors:
/// they are reported as [`crate::types::QualityWarning`] / [`crate::types::ExtractWarning`].
#[derive(Debug, Error)]
pub enum SchoolDataError {
    /// Underlying I/O error (cache directory, local workbook files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "excel")]
    /// Workbook decoding error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// CSV decoding error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Cache artifact (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The worker pool for multi-year fetches could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Invalid year, dataset or shape argument. Raised before any I/O.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Download failed after exhausting every candidate, or the payload is not a workbook.
    #[error("transport error for {year}: {message}")]
    Transport { year: u16, message: String },

    /// The extract could not be interpreted (no data rows, missing structural columns, ...).
    #[error("structure error in sheet '{sheet}' ({year}): {message}")]
    Structure {
        year: u16,
        sheet: String,
        message: String,
    },
}

impl SchoolDataError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn structure(year: u16, sheet: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Structure {
            year,
            sheet: sheet.into(),
            message: message.into(),
        }
    }

    pub(crate) fn transport(year: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            year,
            message: message.into(),
        }
    }
}
