//! Loudness statistics data model
//!
//! Field names and JSON shape match what the loudnorm filter prints, so the
//! aggregated statistics can be dumped without a translation layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Replacement for a measured negative infinity
pub const NEG_INFINITY_SATURATION: f64 = -99.0;

/// Replacement for a measured positive infinity
pub const POS_INFINITY_SATURATION: f64 = 0.0;

/// Saturate infinite measurements to the finite range used downstream
///
/// Silence measures as `-inf`; such values become `-99`, `+inf` becomes `0`.
/// Finite values pass through unchanged.
pub fn saturate(value: f64) -> f64 {
    if value.is_infinite() {
        if value.is_sign_negative() {
            NEG_INFINITY_SATURATION
        } else {
            POS_INFINITY_SATURATION
        }
    } else {
        value
    }
}

/// Gain mode the loudnorm filter ended up using
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationMode {
    /// One constant gain for the whole stream
    #[default]
    Linear,
    /// Time-varying gain
    Dynamic,
}

impl fmt::Display for NormalizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => f.write_str("linear"),
            Self::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// One loudnorm measurement block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EbuLoudnessStatistics {
    /// Integrated loudness of the input (LUFS)
    pub input_i: f64,
    /// True peak of the input (dBTP)
    pub input_tp: f64,
    /// Loudness range of the input (LU)
    pub input_lra: f64,
    /// Gating threshold of the input (LUFS)
    pub input_thresh: f64,
    pub output_i: f64,
    pub output_tp: f64,
    pub output_lra: f64,
    pub output_thresh: f64,
    /// Offset gain loudnorm would apply after limiting (LU)
    pub target_offset: f64,
    #[serde(default)]
    pub normalization_type: NormalizationMode,
}

/// Everything measured for one audio stream
///
/// After the first pass exactly one of `ebu_pass1` or `mean`/`max` is set,
/// depending on the normalization type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoudnessStatistics {
    /// loudnorm measurement before adjustment
    pub ebu_pass1: Option<EbuLoudnessStatistics>,
    /// loudnorm report of the adjustment pass itself
    pub ebu_pass2: Option<EbuLoudnessStatistics>,
    /// RMS level in dB
    pub mean: Option<f64>,
    /// Peak level in dB
    pub max: Option<f64>,
}

impl LoudnessStatistics {
    /// Whether any first-pass measurement is present
    pub fn is_measured(&self) -> bool {
        self.ebu_pass1.is_some() || self.mean.is_some() || self.max.is_some()
    }
}
