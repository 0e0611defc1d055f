//! Error types for Clash Reporter.

use std::path::PathBuf;
use thiserror::Error;

/// Errors caused by invalid request input: query parameters, filters, bodies.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A value is not one of the accepted tokens.
    #[error("invalid value '{value}' for '{field}'")]
    Invalid { field: &'static str, value: String },

    /// A numeric value is outside its allowed range.
    #[error("invalid '{field}': {message}")]
    OutOfRange {
        field: &'static str,
        message: String,
    },

    /// A required value is absent or blank.
    #[error("'{field}' is required")]
    Missing { field: &'static str },
}

impl QueryError {
    pub(crate) fn invalid(field: &'static str, value: &str) -> Self {
        Self::Invalid {
            field,
            value: value.to_string(),
        }
    }
}

/// Errors raised by a clash record source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source is missing required settings.
    #[error("source is not configured: {message}")]
    NotConfigured { message: String },

    /// The HTTP request could not be completed.
    #[error("request to '{url}' failed: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    /// The upstream API answered with an error status.
    #[error("'{url}' returned status {status}")]
    Status { url: String, status: u16 },

    /// The payload could not be decoded.
    #[error("invalid payload from '{url}': {message}")]
    Decode { url: String, message: String },

    /// The upstream data is not ready to be read.
    #[error("upstream not ready: {message}")]
    NotReady { message: String },
}

/// Errors raised while reading or writing the file store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to create or access a directory.
    #[error("failed to prepare directory '{path}': {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write a file.
    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read a file.
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Image payload is not valid base64.
    #[error("invalid image data: {source}")]
    InvalidImage {
        #[from]
        source: base64::DecodeError,
    },

    /// Image payload decoded to zero bytes.
    #[error("image data is empty")]
    EmptyImage,

    /// Identifier would escape the storage directory.
    #[error("invalid identifier '{id}'")]
    InvalidId { id: String },
}

/// Errors that can occur when rendering a chart.
#[derive(Debug, Error)]
pub enum ChartError {
    /// The drawing backend rejected an operation.
    #[error("chart drawing failed: {message}")]
    Draw { message: String },
}

/// Errors that can occur when composing a PDF report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Chart(#[from] ChartError),

    /// The PDF document could not be serialized.
    #[error("PDF serialization failed: {source}")]
    Pdf {
        #[from]
        source: lopdf::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Writing the serialized document failed.
    #[error("failed to write PDF: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Errors raised by the CSV and JSON exporters.
#[derive(Debug, Error)]
pub enum ExportError {
    /// No scratch file could be opened beside the target.
    #[error("cannot create output for '{path}': {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Writing the scratch file or moving it onto the target failed.
    #[error("cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
}
