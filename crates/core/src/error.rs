//! Error types for HeatRisk

use thiserror::Error;

/// Main error type for HeatRisk operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster format in {source_name}: {reason}")]
    Format { source_name: String, reason: String },

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("No valid transform between {0} and {1}")]
    CrsMismatch(String, String),

    #[error("Empty intersection: {0}")]
    EmptyIntersection(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Layer '{layer}' is not co-registered with the stack: {reason}")]
    NotCoRegistered { layer: String, reason: String },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("GDAL error: {0}")]
    #[cfg(feature = "gdal")]
    Gdal(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::Format`] tied to a named source (file or buffer)
    pub fn format(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Format {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for Error {
    fn from(e: gdal::errors::GdalError) -> Self {
        Error::Gdal(e.to_string())
    }
}

/// Result type alias for HeatRisk operations
pub type Result<T> = std::result::Result<T, Error>;
