//! ReplayGain track values from loudnorm statistics
//!
//! # Gain Calculation
//!
//! - Track Gain = Target Level - Integrated Loudness
//! - Track Peak = 10^(True Peak / 20), linear
//!
//! For Opus the gain is also expressed as an RFC 7845 Q7.8 fixed-point
//! number (`R128_TRACK_GAIN`).

use crate::statistics::EbuLoudnessStatistics;

/// Track-level ReplayGain information
#[derive(Debug, Clone, PartialEq)]
pub struct TrackGain {
    /// Gain to apply in dB (negative for loud tracks)
    pub gain_db: f64,
    /// True peak in dBFS
    pub peak_dbfs: f64,
    /// Measured integrated loudness in LUFS
    pub integrated_lufs: f64,
    /// Target level the gain was computed against
    pub reference_lufs: f64,
}

impl TrackGain {
    /// Gain that brings the measured stream to `target_level`
    pub fn from_ebu(stats: &EbuLoudnessStatistics, target_level: f64) -> Self {
        Self {
            gain_db: -(stats.input_i - target_level),
            peak_dbfs: stats.input_tp,
            integrated_lufs: stats.input_i,
            reference_lufs: target_level,
        }
    }

    /// Peak as a linear sample value
    pub fn linear_peak(&self) -> f64 {
        10.0_f64.powf(self.peak_dbfs / 20.0)
    }

    /// Gain in Q7.8 fixed point, as used by `R128_TRACK_GAIN`
    pub fn r128_gain(&self) -> i32 {
        (256.0 * self.gain_db)
            .round()
            .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i32
    }

    /// Check if applying this gain would cause clipping
    pub fn would_clip(&self) -> bool {
        self.gain_db + self.peak_dbfs > 0.0
    }

    /// `REPLAYGAIN_TRACK_GAIN` tag value
    pub fn gain_tag(&self) -> String {
        format!("{:.2} dB", self.gain_db)
    }

    /// `REPLAYGAIN_TRACK_PEAK` tag value
    pub fn peak_tag(&self) -> String {
        format!("{:.6}", self.linear_peak())
    }
}
