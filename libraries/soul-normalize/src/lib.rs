//! Soul Normalize - two-pass loudness normalization of media files
//!
//! Drives ffmpeg through a measure-then-adjust protocol:
//!
//! 1. Probe each input for its streams
//! 2. Measure the selected audio streams (loudnorm, or astats for rms/peak)
//! 3. Optionally average the measurements across all files (batch mode)
//! 4. Write the output with one filter graph adjusting every stream
//!
//! # Example
//!
//! ```no_run
//! use soul_normalize::{Normalizer, NormalizerConfig};
//!
//! # async fn example() -> soul_normalize::Result<()> {
//! let mut normalizer = Normalizer::new(NormalizerConfig::default()).await?;
//! normalizer
//!     .add_media_file("input.wav", "normalized/input.mkv")
//!     .await?;
//! normalizer.run_normalization().await?;
//!
//! for stats in normalizer.stats() {
//!     println!("{:?}", stats.ebu_pass2);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

mod config;
mod context;
mod error;
mod media_file;
mod normalizer;
mod progress;
mod stream;

pub use config::{
    NormalizerConfig, AUDIO_ONLY_FORMATS, ONE_STREAM_FORMATS, PCM_INCOMPATIBLE_EXTS,
    PCM_INCOMPATIBLE_FORMATS,
};
pub use context::SessionContext;
pub use error::{NormalizeError, Result};
pub use media_file::{output_extension, select_audio_streams, FileState, MediaFile};
pub use normalizer::{batch_reference, Normalizer};
pub use progress::{ProgressReporter, SilentProgress};
pub use stream::{pcm_codec_for_bit_depth, AudioStream, StreamStatistics, SubtitleStream, VideoStream};

// Re-exported so applications need no direct dependency on the lower crates
pub use soul_ffmpeg::{CommandRunner, EngineCommand, FfmpegRunner};
pub use soul_loudness::{NormalizationType, NormalizationWarning};
