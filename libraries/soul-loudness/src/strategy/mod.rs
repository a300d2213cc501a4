//! Normalization strategies
//!
//! One strategy per normalization type. A strategy knows which filter
//! measures a stream, how to read the measurement back, and which filter
//! brings the stream to its target on the second pass.

mod ebu;
mod level;

pub use ebu::EbuStrategy;
pub use level::{PeakStrategy, RmsStrategy};

use crate::error::{LoudnessError, Result};
use crate::statistics::{EbuLoudnessStatistics, LoudnessStatistics};
use crate::warning::NormalizationWarning;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Accepted EBU target levels (LUFS)
pub const EBU_TARGET_RANGE: RangeInclusive<f64> = -70.0..=-5.0;

/// Accepted RMS and peak target levels (dBFS)
pub const LEVEL_TARGET_RANGE: RangeInclusive<f64> = -99.0..=0.0;

/// Accepted loudness range targets (LU)
pub const LOUDNESS_RANGE_TARGET_RANGE: RangeInclusive<f64> = 1.0..=50.0;

/// Accepted true peak ceilings (dBTP)
pub const TRUE_PEAK_RANGE: RangeInclusive<f64> = -9.0..=0.0;

/// Accepted loudnorm offsets (LU)
pub const OFFSET_RANGE: RangeInclusive<f64> = -99.0..=99.0;

/// Filter that passes audio through untouched
pub const PASSTHROUGH_FILTER: &str = "acopy";

/// Which measurement drives normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationType {
    /// EBU R128 two-pass loudnorm
    #[default]
    Ebu,
    /// Static gain towards a target RMS level
    Rms,
    /// Static gain towards a target peak level
    Peak,
}

impl NormalizationType {
    /// Valid target levels for this type
    pub fn target_range(&self) -> RangeInclusive<f64> {
        match self {
            Self::Ebu => EBU_TARGET_RANGE,
            Self::Rms | Self::Peak => LEVEL_TARGET_RANGE,
        }
    }

    /// Build the strategy for this type
    pub fn strategy(self, params: TargetParameters) -> Box<dyn NormalizationStrategy> {
        match self {
            Self::Ebu => Box::new(EbuStrategy::new(params)),
            Self::Rms => Box::new(RmsStrategy::new(params)),
            Self::Peak => Box::new(PeakStrategy::new(params)),
        }
    }

    /// The value batch mode averages: `input_i`, `mean` or `max`
    ///
    /// `input_i` is capped at 0 LUFS, the same value the adjustment anchors on.
    pub fn measured_level(&self, stats: &LoudnessStatistics) -> Option<f64> {
        match self {
            Self::Ebu => stats.ebu_pass1.as_ref().map(|s| s.input_i.min(0.0)),
            Self::Rms => stats.mean,
            Self::Peak => stats.max,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ebu => "ebu",
            Self::Rms => "rms",
            Self::Peak => "peak",
        }
    }
}

impl fmt::Display for NormalizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NormalizationType {
    type Err = LoudnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ebu" => Ok(Self::Ebu),
            "rms" => Ok(Self::Rms),
            "peak" => Ok(Self::Peak),
            other => Err(LoudnessError::UnknownNormalizationType(other.to_string())),
        }
    }
}

/// Session-wide targets, fixed for the whole run
#[derive(Debug, Clone, PartialEq)]
pub struct TargetParameters {
    /// LUFS for ebu, dBFS for rms and peak
    pub target_level: f64,
    pub loudness_range_target: f64,
    /// Use the measured input LRA as the LRA target
    pub keep_loudness_range_target: bool,
    /// Use the measured input LRA when it exceeds the LRA target
    pub keep_lra_above_loudness_range_target: bool,
    pub true_peak: f64,
    pub offset: f64,
    pub dual_mono: bool,
    /// One-pass dynamic loudnorm
    pub dynamic: bool,
    /// Never raise the level of a stream
    pub lower_only: bool,
    pub auto_lower_loudness_target: bool,
    /// Whether the output sample rate is set explicitly
    pub sample_rate_set: bool,
}

impl Default for TargetParameters {
    fn default() -> Self {
        Self {
            target_level: -23.0,
            loudness_range_target: 7.0,
            keep_loudness_range_target: false,
            keep_lra_above_loudness_range_target: false,
            true_peak: -2.0,
            offset: 0.0,
            dual_mono: false,
            dynamic: false,
            lower_only: false,
            auto_lower_loudness_target: false,
            sample_rate_set: false,
        }
    }
}

/// How a second-pass filter changes the stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdjustmentKind {
    /// loudnorm; the engine reports a second-pass measurement block
    Loudnorm,
    /// Static gain in dB
    Volume { gain_db: f64 },
    /// Stream copied through `acopy`
    Passthrough,
}

/// Second-pass filter for one stream, plus what went wrong on the way
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    pub filter: String,
    pub kind: AdjustmentKind,
    pub warnings: Vec<NormalizationWarning>,
}

impl Adjustment {
    pub(crate) fn passthrough(warnings: Vec<NormalizationWarning>) -> Self {
        Self {
            filter: PASSTHROUGH_FILTER.to_string(),
            kind: AdjustmentKind::Passthrough,
            warnings,
        }
    }

    /// Whether the engine will print a loudnorm report for this stream
    pub fn uses_loudnorm(&self) -> bool {
        matches!(self.kind, AdjustmentKind::Loudnorm)
    }
}

/// Measure-then-adjust policy for one normalization type
pub trait NormalizationStrategy: fmt::Debug + Send + Sync {
    fn normalization_type(&self) -> NormalizationType;

    fn params(&self) -> &TargetParameters;

    /// Whether a measurement pass must run before adjusting
    fn requires_first_pass(&self) -> bool {
        true
    }

    /// Filter that measures a stream on the first pass
    fn measurement_filter(&self) -> String;

    /// Read first-pass statistics from the engine output
    fn parse_measurement(&self, output: &str) -> Result<LoudnessStatistics>;

    /// Build the second-pass filter
    ///
    /// With a `batch_reference` the adjustment is anchored to the shared
    /// batch loudness instead of the stream's own measurement.
    fn adjustment_filter(
        &self,
        stats: &LoudnessStatistics,
        batch_reference: Option<f64>,
    ) -> Result<Adjustment>;

    /// Check a loudnorm report from the adjustment pass
    fn review_second_pass(&self, _pass2: &EbuLoudnessStatistics) -> Option<NormalizationWarning> {
        None
    }

    /// The level batch mode averages for this strategy
    fn measured_level(&self, stats: &LoudnessStatistics) -> Option<f64> {
        self.normalization_type().measured_level(stats)
    }
}

/// `lower_only` check shared by every strategy
pub(crate) fn lower_only_passthrough(params: &TargetParameters, measured: f64) -> Option<Adjustment> {
    if params.lower_only && measured < params.target_level {
        let warning = NormalizationWarning::AlreadyBelowTarget {
            measured,
            target: params.target_level,
        }
        .log();
        Some(Adjustment::passthrough(vec![warning]))
    } else {
        None
    }
}
