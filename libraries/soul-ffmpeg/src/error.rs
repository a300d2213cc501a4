//! Error types for engine invocation

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, FfmpegError>;

/// Errors that can occur while locating or running the engine
#[derive(Error, Debug)]
pub enum FfmpegError {
    /// The engine executable could not be found
    #[error("FFmpeg not found: {0}")]
    NotFound(String),

    /// The engine exited with a non-zero status
    #[error("Error running command {command}: {stderr}")]
    Execution {
        /// Shell-quoted command line
        command: String,
        /// Captured standard error
        stderr: String,
    },

    /// The engine process could not be spawned or its pipes were lost
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
