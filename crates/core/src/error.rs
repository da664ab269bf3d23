//! Error types for the liquidation sync pipeline.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the liquidation sync pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote listing could not be obtained or parsed. Fatal for a sync run.
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// Remote object could not be retrieved.
    #[error("Download error: {0}")]
    Download(String),

    /// Archive payload could not be unpacked into the local store.
    #[error("Extract error: {0}")]
    Extract(String),

    /// A raw record is missing a required field or holds an invalid value.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV reading/writing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a catalog error.
    pub fn catalog(msg: impl Into<String>) -> Self {
        Error::CatalogUnavailable(msg.into())
    }

    /// Create a download error.
    pub fn download(msg: impl Into<String>) -> Self {
        Error::Download(msg.into())
    }

    /// Create an extract error.
    pub fn extract(msg: impl Into<String>) -> Self {
        Error::Extract(msg.into())
    }

    /// Create a malformed record error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedRecord(msg.into())
    }

    /// Whether this error should halt a whole sync run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::CatalogUnavailable(_) | Error::Config(_))
    }
}
