//! Soul FFmpeg - engine process plumbing
//!
//! Builds engine command lines, runs them (with optional progress tracking)
//! and understands the engine's probe output.
//!
//! # Example
//!
//! ```no_run
//! use soul_ffmpeg::{locate_ffmpeg, probe_command, parse_probe_output, CommandRunner, FfmpegRunner};
//! use std::path::Path;
//!
//! # async fn example() -> soul_ffmpeg::Result<()> {
//! let ffmpeg = locate_ffmpeg()?;
//! let output = FfmpegRunner::new()
//!     .run(&probe_command(&ffmpeg, Path::new("song.flac")))
//!     .await?;
//! let report = parse_probe_output(&output);
//! println!("{} audio streams", report.audio().count());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod command;
mod error;
mod locate;
mod probe;
mod progress;
mod runner;

pub use command::{is_null_device, null_device, EngineCommand};
pub use error::{FfmpegError, Result};
pub use locate::{has_loudnorm, locate_ffmpeg, FFMPEG_PATH_ENV};
pub use probe::{
    parse_duration, parse_probe_output, probe_command, ProbeReport, ProbedStream, StreamKind,
};
pub use progress::{parse_progress_line, prune_progress_lines, ProgressLine, ProgressTracker};
pub use runner::{CommandRunner, FfmpegRunner, ProgressFn};
