//! Error types for ErosGIS

use thiserror::Error;

/// Main error type for ErosGIS operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The data provider has no coverage for the requested dataset, band,
    /// extent or time range. Fatal for the affected handle, never retried.
    #[error("data unavailable for '{dataset}': {reason}")]
    DataUnavailable { dataset: String, reason: String },

    /// Operands of a graph operation cannot be combined (CRS, scale or
    /// extent mismatch). Raised when the graph is built, not when evaluated.
    #[error("incompatible operands: {0}")]
    IncompatibleOperands(String),

    /// A pixel or time budget was exceeded. Recoverable: the executor
    /// retries at a coarser scale.
    #[error("execution budget exceeded: {reason}")]
    BudgetExceeded { reason: String },

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

    #[error("CRS mismatch: {0} vs {1}")]
    CrsMismatch(String, String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn data_unavailable(dataset: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::DataUnavailable {
            dataset: dataset.into(),
            reason: reason.into(),
        }
    }

    pub fn incompatible(reason: impl Into<String>) -> Self {
        Error::IncompatibleOperands(reason.into())
    }

    pub fn budget(reason: impl Into<String>) -> Self {
        Error::BudgetExceeded {
            reason: reason.into(),
        }
    }

    /// Whether the executor may recover from this error by degrading scale
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::BudgetExceeded { .. })
    }
}

/// Result type alias for ErosGIS operations
pub type Result<T> = std::result::Result<T, Error>;
