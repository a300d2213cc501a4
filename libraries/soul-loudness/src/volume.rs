//! Parser for RMS and peak level reports
//!
//! Two grammars are understood: the `astats` overall summary
//! (`RMS level dB: -20.1`, `Peak level dB: -1.0`) and the `volumedetect`
//! summary (`mean_volume: -20.1 dB`, `max_volume: -1.0 dB`). Silence is
//! reported as `-` or `-inf` and saturates like the loudnorm report does.

use crate::error::{LoudnessError, Result};
use crate::statistics::saturate;
use once_cell::sync::Lazy;
use regex::Regex;

static RMS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:RMS level dB:|mean_volume:) (-?inf|[-\d.]+)").expect("valid rms regex")
});
static PEAK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:Peak level dB:|max_volume:) (-?inf|[-\d.]+)").expect("valid peak regex")
});

/// Overall RMS and peak level of a stream, in dB
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeLevels {
    pub mean: f64,
    pub max: f64,
}

fn parse_level(raw: &str) -> Option<f64> {
    match raw {
        "-" | "-inf" => Some(f64::NEG_INFINITY),
        "inf" => Some(f64::INFINITY),
        other => other.parse::<f64>().ok(),
    }
}

fn first_level(re: &Regex, output: &str, what: &str) -> Result<f64> {
    let raw = re
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| LoudnessError::MeasurementParse(format!("Could not get {} volume", what)))?;

    parse_level(raw).map(saturate).ok_or_else(|| {
        LoudnessError::MeasurementParse(format!("Invalid {} volume value: {}", what, raw))
    })
}

/// Parse the first RMS and peak level reported in `output`
pub fn parse_volume_output(output: &str) -> Result<VolumeLevels> {
    Ok(VolumeLevels {
        mean: first_level(&RMS_RE, output, "mean")?,
        max: first_level(&PEAK_RE, output, "max")?,
    })
}
