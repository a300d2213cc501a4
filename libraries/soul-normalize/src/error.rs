//! Error types for the normalization session

use soul_ffmpeg::FfmpegError;
use soul_loudness::LoudnessError;
use std::path::Path;
use thiserror::Error;

/// Result type for normalization operations
pub type Result<T> = std::result::Result<T, NormalizeError>;

/// Errors that can occur while normalizing
///
/// `Configuration` is raised before any file is touched. Every other
/// variant is fatal for the file it occurred in only.
#[derive(Error, Debug)]
pub enum NormalizeError {
    /// Invalid option value or option combination
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No audio stream left after discovery and stream selection
    #[error("Input file {0} does not contain any audio streams")]
    NoAudioStream(String),

    /// Probe output could not be interpreted
    #[error("Probe error: {0}")]
    Probe(String),

    /// Expected measurement markers were absent from engine output
    #[error("Measurement error: {0}")]
    MeasurementParse(String),

    /// The engine exited with a non-zero status or could not be started
    #[error("FFmpeg error: {0}")]
    EngineExecution(String),

    /// ReplayGain tag writing failed
    #[error("Tag error: {0}")]
    Tag(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NormalizeError {
    pub(crate) fn no_audio(path: &Path) -> Self {
        Self::NoAudioStream(path.display().to_string())
    }
}

impl From<FfmpegError> for NormalizeError {
    fn from(err: FfmpegError) -> Self {
        match err {
            FfmpegError::NotFound(msg) => Self::Configuration(msg),
            FfmpegError::Io(e) => Self::Io(e),
            other => Self::EngineExecution(other.to_string()),
        }
    }
}

impl From<LoudnessError> for NormalizeError {
    fn from(err: LoudnessError) -> Self {
        match err {
            LoudnessError::MeasurementParse(_) | LoudnessError::MissingMeasurement(_) => {
                Self::MeasurementParse(err.to_string())
            }
            LoudnessError::UnknownNormalizationType(_) => Self::Configuration(err.to_string()),
            LoudnessError::IoError(e) => Self::Io(e),
            other => Self::Tag(other.to_string()),
        }
    }
}
