//! Parser for the loudnorm filter's JSON report
//!
//! With `print_format=json` every loudnorm instance prints a marker line
//! followed by a flat JSON object whose values are strings:
//!
//! ```text
//! [Parsed_loudnorm_0 @ 0x7f8b4c004a00]
//! {
//!     "input_i" : "-26.94",
//!     "input_tp" : "-6.92",
//!     ...
//!     "normalization_type" : "dynamic",
//!     "target_offset" : "0.52"
//! }
//! ```

use crate::error::{LoudnessError, Result};
use crate::statistics::{saturate, EbuLoudnessStatistics, NormalizationMode};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[Parsed_loudnorm_(\d+)").expect("valid loudnorm marker regex"));

/// Parse every loudnorm report in `output`
///
/// Keys are the filter instance numbers from the markers, so iterating the
/// map yields reports in filter-graph order. An output without any marker
/// yields an empty map; a marker followed by malformed JSON is an error.
pub fn parse_loudnorm_output(output: &str) -> Result<BTreeMap<usize, EbuLoudnessStatistics>> {
    let mut result = BTreeMap::new();
    let mut current: Option<(usize, Vec<&str>)> = None;

    for line in output.lines().map(str::trim) {
        match current.as_mut() {
            None => {
                if let Some(caps) = MARKER_RE.captures(line) {
                    let index = caps[1].parse::<usize>().map_err(|e| {
                        LoudnessError::MeasurementParse(format!("bad loudnorm marker: {}", e))
                    })?;
                    current = Some((index, Vec::new()));
                }
            }
            Some((index, block)) => {
                // Progress and stats lines may interleave with the report
                if line.starts_with('{') || line.starts_with('}') || line.starts_with('"') {
                    block.push(line);
                }
                if line.starts_with('}') {
                    let stats = parse_block(&block.join("\n"))?;
                    debug!("Loudnorm stats for filter {} parsed: {:?}", index, stats);
                    result.insert(*index, stats);
                    current = None;
                }
            }
        }
    }

    Ok(result)
}

fn parse_block(block: &str) -> Result<EbuLoudnessStatistics> {
    let map: Map<String, Value> = serde_json::from_str(block)?;

    let number = |key: &str| -> Result<f64> {
        let value = map.get(key).ok_or_else(|| {
            LoudnessError::MeasurementParse(format!("loudnorm report lacks '{}'", key))
        })?;
        let parsed = match value {
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        };
        parsed.map(saturate).ok_or_else(|| {
            LoudnessError::MeasurementParse(format!("invalid value for '{}': {}", key, value))
        })
    };

    let normalization_type = match map.get("normalization_type").and_then(Value::as_str) {
        Some(s) if s.eq_ignore_ascii_case("dynamic") => NormalizationMode::Dynamic,
        _ => NormalizationMode::Linear,
    };

    Ok(EbuLoudnessStatistics {
        input_i: number("input_i")?,
        input_tp: number("input_tp")?,
        input_lra: number("input_lra")?,
        input_thresh: number("input_thresh")?,
        output_i: number("output_i")?,
        output_tp: number("output_tp")?,
        output_lra: number("output_lra")?,
        output_thresh: number("output_thresh")?,
        target_offset: number("target_offset")?,
        normalization_type,
    })
}
