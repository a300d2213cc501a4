//! Non-fatal normalization outcomes
//!
//! A warning means the result is still valid but not exactly what was asked
//! for. Warnings are logged where they are raised and also returned, so that
//! callers can inspect them.

use std::fmt;
use tracing::warn;

/// A degraded-but-valid normalization outcome
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizationWarning {
    /// Measured integrated loudness above 0 LUFS, capped at 0
    InputLoudnessAboveZero { measured: f64 },
    /// Measured LRA outside `[1, 50]` while keeping the input LRA
    LoudnessRangeOutOfBounds { measured: f64 },
    /// Effective LRA target below the measured LRA; loudnorm goes dynamic
    DynamicFallback { input_lra: f64, target_lra: f64 },
    /// Linear mode was requested, but loudnorm reported dynamic
    DynamicModeUsed,
    /// Dynamic loudnorm without an explicit output sample rate
    DynamicSampleRate,
    /// Target lowered so that true-peak limiting is not needed
    AutoLoweredTarget { target: f64 },
    /// A value passed to loudnorm was clamped into its accepted range
    Constrained {
        name: &'static str,
        min: f64,
        max: f64,
        from: f64,
        to: f64,
    },
    /// Batch-anchored loudnorm target clamped into `[-70, -5]`
    BatchTargetClamped { from: f64, to: f64 },
    /// Static gain would push the peak above 0 dBFS
    Clipping { amount: f64 },
    /// `lower_only` and the stream is already below the target
    AlreadyBelowTarget { measured: f64, target: f64 },
}

impl NormalizationWarning {
    /// Log the warning and hand it back
    pub fn log(self) -> Self {
        warn!("{}", self);
        self
    }
}

impl fmt::Display for NormalizationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputLoudnessAboveZero { measured } => write!(
                f,
                "Input file had measured input loudness greater than zero ({}), capping at 0",
                measured
            ),
            Self::LoudnessRangeOutOfBounds { measured } => write!(
                f,
                "Input file had measured loudness range outside of [1,50] ({}), capping to allowed range",
                measured
            ),
            Self::DynamicFallback {
                input_lra,
                target_lra,
            } => write!(
                f,
                "Input file had loudness range of {}. This is larger than the loudness range target ({}). \
                 Normalization will revert to dynamic mode. Choose a higher target loudness range if you \
                 want linear normalization, or keep the loudness range of the input",
                input_lra, target_lra
            ),
            Self::DynamicModeUsed => f.write_str(
                "Linear normalization was requested, but the loudnorm filter reverted to dynamic \
                 normalization. Consider a lower target level or a higher target loudness range",
            ),
            Self::DynamicSampleRate => f.write_str(
                "In dynamic mode, the sample rate will automatically be set to 192 kHz by the loudnorm \
                 filter. Set an output sample rate to override it",
            ),
            Self::AutoLoweredTarget { target } => write!(
                f,
                "Using loudness target {:.2} to avoid true peak limiting",
                target
            ),
            Self::Constrained {
                name,
                min,
                max,
                from,
                to,
            } => write!(
                f,
                "Constraining {} to range of [{}, {}]: {} -> {}",
                name, min, max, from, to
            ),
            Self::BatchTargetClamped { from, to } => write!(
                f,
                "Batch-relative loudness target {:.2} is out of range, using {:.2}",
                from, to
            ),
            Self::Clipping { amount } => {
                write!(f, "Adjusting will lead to clipping of {:.2} dB", amount)
            }
            Self::AlreadyBelowTarget { measured, target } => write!(
                f,
                "Measured level {:.2} is already lower than target {:.2}, skipping normalization",
                measured, target
            ),
        }
    }
}

/// Clamp `value` into `[min, max]`, recording a warning when it changes
pub fn constrain(
    value: f64,
    min: f64,
    max: f64,
    name: &'static str,
    warnings: &mut Vec<NormalizationWarning>,
) -> f64 {
    let result = value.clamp(min, max);
    if (result - value).abs() > f64::EPSILON {
        warnings.push(
            NormalizationWarning::Constrained {
                name,
                min,
                max,
                from: value,
                to: result,
            }
            .log(),
        );
    }
    result
}
