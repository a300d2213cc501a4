//! Loudness normalization policy for Soul Player tools
//!
//! This crate provides:
//! - The loudness statistics data model (EBU R128 loudnorm reports, RMS/peak levels)
//! - Normalization strategies deciding how to measure and how to adjust
//! - Parsers for the loudnorm JSON report and the astats/volumedetect summaries
//! - ReplayGain calculation and tag writing
//!
//! No signal processing happens here: the filters named by a strategy run
//! inside ffmpeg, this crate only decides what to ask for and reads back the
//! answers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  measurement_filter()  ┌──────────────┐
//! │ Normalization    │ ─────────────────────► │   ffmpeg     │
//! │ Strategy         │ ◄───────────────────── │  (pass 1)    │
//! │ (ebu/rms/peak)   │  parse_measurement()   └──────────────┘
//! │                  │
//! │                  │  adjustment_filter()   ┌──────────────┐
//! │                  │ ─────────────────────► │   ffmpeg     │
//! └──────────────────┘                        │  (pass 2)    │
//!                                             └──────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use soul_loudness::{LoudnessStatistics, NormalizationType, TargetParameters};
//!
//! let strategy = NormalizationType::Peak.strategy(TargetParameters {
//!     target_level: 0.0,
//!     ..Default::default()
//! });
//!
//! let stats = strategy
//!     .parse_measurement("Peak level dB: -6.0\nRMS level dB: -20.0")
//!     .unwrap();
//! let adjustment = strategy.adjustment_filter(&stats, None).unwrap();
//! assert_eq!(adjustment.filter, "volume=6dB");
//! ```

#![deny(unsafe_code)]

mod error;
mod filter;
mod loudnorm;
mod replaygain;
mod statistics;
mod strategy;
mod tags;
mod volume;
mod warning;

pub use error::{LoudnessError, Result};
pub use filter::{filter_chain, FilterSpec};
pub use loudnorm::parse_loudnorm_output;
pub use replaygain::TrackGain;
pub use statistics::{
    saturate, EbuLoudnessStatistics, LoudnessStatistics, NormalizationMode,
    NEG_INFINITY_SATURATION, POS_INFINITY_SATURATION,
};
pub use strategy::{
    Adjustment, AdjustmentKind, EbuStrategy, NormalizationStrategy, NormalizationType,
    PeakStrategy, RmsStrategy, TargetParameters, EBU_TARGET_RANGE, LEVEL_TARGET_RANGE,
    LOUDNESS_RANGE_TARGET_RANGE, OFFSET_RANGE, PASSTHROUGH_FILTER, TRUE_PEAK_RANGE,
};
pub use tags::{write_replaygain_tags, ReplayGainFormat};
pub use volume::{parse_volume_output, VolumeLevels};
pub use warning::{constrain, NormalizationWarning};

/// EBU R128 broadcast reference level (-23 LUFS)
pub const EBU_R128_BROADCAST_LUFS: f64 = -23.0;

/// Default loudness range target (LU)
pub const DEFAULT_LOUDNESS_RANGE_TARGET: f64 = 7.0;

/// Default true peak ceiling (dBTP)
pub const DEFAULT_TRUE_PEAK: f64 = -2.0;
