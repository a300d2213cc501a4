//! Engine discovery and feature detection

use crate::command::EngineCommand;
use crate::error::{FfmpegError, Result};
use crate::runner::CommandRunner;
use std::path::{PathBuf, MAIN_SEPARATOR};
use tracing::{debug, error};

/// Environment variable that overrides the engine location
pub const FFMPEG_PATH_ENV: &str = "FFMPEG_PATH";

/// Locate the ffmpeg executable
///
/// `FFMPEG_PATH` wins when set: a value containing a path separator must name
/// an existing file, anything else is looked up on `PATH`. Without it,
/// `ffmpeg` is looked up on `PATH`.
pub fn locate_ffmpeg() -> Result<PathBuf> {
    resolve(std::env::var(FFMPEG_PATH_ENV).ok())
}

fn resolve(override_path: Option<String>) -> Result<PathBuf> {
    if let Some(path) = override_path.filter(|p| !p.is_empty()) {
        if path.contains(MAIN_SEPARATOR) || path.contains('/') {
            let candidate = PathBuf::from(&path);
            if !candidate.is_file() {
                return Err(FfmpegError::NotFound(format!("No file exists at {}", path)));
            }
            return Ok(candidate);
        }

        return which::which(&path).map_err(|_| {
            FfmpegError::NotFound(format!("Could not find '{}' in your $PATH.", path))
        });
    }

    which::which("ffmpeg").map_err(|_| {
        FfmpegError::NotFound(
            "Could not find ffmpeg in your $PATH or $FFMPEG_PATH. \
             Please install ffmpeg from http://ffmpeg.org"
                .to_string(),
        )
    })
}

/// Check whether the engine ships the `loudnorm` filter
pub async fn has_loudnorm(runner: &dyn CommandRunner, ffmpeg: &std::path::Path) -> Result<bool> {
    let mut cmd = EngineCommand::new(ffmpeg);
    cmd.arg("-filters");

    let output = runner.run(&cmd).await?;
    let supported = output.contains("loudnorm");
    if supported {
        debug!("ffmpeg supports the loudnorm filter");
    } else {
        error!(
            "Your ffmpeg does not support the 'loudnorm' filter. \
             Please make sure you are running ffmpeg v4.2 or above."
        );
    }
    Ok(supported)
}
