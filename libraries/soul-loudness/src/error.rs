//! Error types for loudness measurement and tagging

use thiserror::Error;

/// Result type for loudness operations
pub type Result<T> = std::result::Result<T, LoudnessError>;

/// Errors that can occur while interpreting measurements or writing tags
#[derive(Error, Debug)]
pub enum LoudnessError {
    /// Expected markers or values were absent from the engine output
    #[error("Could not parse measurement: {0}")]
    MeasurementParse(String),

    /// An adjustment was requested before the stream was measured
    #[error("First pass not run: {0}")]
    MissingMeasurement(String),

    /// Unknown normalization type name
    #[error("Unknown normalization type: {0} (expected ebu, rms or peak)")]
    UnknownNormalizationType(String),

    /// Tag reading error
    #[error("Failed to read audio tags: {0}")]
    TagReadError(String),

    /// Tag writing error
    #[error("Failed to write audio tags: {0}")]
    TagWriteError(String),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Unsupported file format for tagging
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<lofty::error::LoftyError> for LoudnessError {
    fn from(err: lofty::error::LoftyError) -> Self {
        Self::TagReadError(err.to_string())
    }
}

impl From<serde_json::Error> for LoudnessError {
    fn from(err: serde_json::Error) -> Self {
        Self::MeasurementParse(format!("wrong JSON format: {}", err))
    }
}
