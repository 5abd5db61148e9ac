//! Result and error types for the core library

use thiserror::Error;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential error ({provider}): {message}")]
    Credential { provider: String, message: String },

    /// A drive API call failed. `status` is the HTTP status when the
    /// provider answered at all.
    #[error("{provider} request failed{}: {message}", status_suffix(.status))]
    Drive {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn credential(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Credential {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    pub fn drive(provider: impl Into<String>, status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::Drive {
            provider: provider.into(),
            status,
            message: msg.into(),
        }
    }

    /// True when a drive answered 404 ("already gone")
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Drive { status: Some(404), .. } | Self::NotFound(_))
    }
}

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;
