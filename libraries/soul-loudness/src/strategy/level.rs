use super::{
    lower_only_passthrough, Adjustment, AdjustmentKind, NormalizationStrategy, NormalizationType,
    TargetParameters,
};
use crate::error::{LoudnessError, Result};
use crate::statistics::LoudnessStatistics;
use crate::volume::parse_volume_output;
use crate::warning::NormalizationWarning;
use tracing::info;

const ASTATS_FILTER: &str = "astats=measure_overall=Peak_level+RMS_level:measure_perchannel=0";

fn parse_levels(output: &str) -> Result<LoudnessStatistics> {
    let levels = parse_volume_output(output)?;
    Ok(LoudnessStatistics {
        mean: Some(levels.mean),
        max: Some(levels.max),
        ..Default::default()
    })
}

/// Static gain from `measured` to the target, with the clipping check
fn static_gain(
    params: &TargetParameters,
    stats: &LoudnessStatistics,
    measured: Option<f64>,
    batch_reference: Option<f64>,
) -> Result<Adjustment> {
    let (Some(measured), Some(max)) = (measured, stats.max) else {
        return Err(LoudnessError::MissingMeasurement(
            "no mean/max volume to normalize to".to_string(),
        ));
    };

    if let Some(passthrough) = lower_only_passthrough(params, measured) {
        return Ok(passthrough);
    }

    // In batch mode every stream shares the same gain
    let reference = batch_reference.unwrap_or(measured);
    let gain_db = params.target_level - reference;
    info!(
        "Adjusting stream by {:.2} dB to reach {}",
        gain_db, params.target_level
    );

    let mut warnings = Vec::new();
    let clip_amount = max + gain_db;
    if clip_amount > 0.0 {
        warnings.push(NormalizationWarning::Clipping {
            amount: clip_amount,
        }
        .log());
    }

    Ok(Adjustment {
        filter: format!("volume={}dB", gain_db),
        kind: AdjustmentKind::Volume { gain_db },
        warnings,
    })
}

/// Static gain towards a target RMS level
#[derive(Debug, Clone)]
pub struct RmsStrategy {
    params: TargetParameters,
}

impl RmsStrategy {
    pub fn new(params: TargetParameters) -> Self {
        Self { params }
    }
}

impl NormalizationStrategy for RmsStrategy {
    fn normalization_type(&self) -> NormalizationType {
        NormalizationType::Rms
    }

    fn params(&self) -> &TargetParameters {
        &self.params
    }

    fn measurement_filter(&self) -> String {
        ASTATS_FILTER.to_string()
    }

    fn parse_measurement(&self, output: &str) -> Result<LoudnessStatistics> {
        parse_levels(output)
    }

    fn adjustment_filter(
        &self,
        stats: &LoudnessStatistics,
        batch_reference: Option<f64>,
    ) -> Result<Adjustment> {
        static_gain(&self.params, stats, stats.mean, batch_reference)
    }
}

/// Static gain towards a target peak level
#[derive(Debug, Clone)]
pub struct PeakStrategy {
    params: TargetParameters,
}

impl PeakStrategy {
    pub fn new(params: TargetParameters) -> Self {
        Self { params }
    }
}

impl NormalizationStrategy for PeakStrategy {
    fn normalization_type(&self) -> NormalizationType {
        NormalizationType::Peak
    }

    fn params(&self) -> &TargetParameters {
        &self.params
    }

    fn measurement_filter(&self) -> String {
        ASTATS_FILTER.to_string()
    }

    fn parse_measurement(&self, output: &str) -> Result<LoudnessStatistics> {
        parse_levels(output)
    }

    fn adjustment_filter(
        &self,
        stats: &LoudnessStatistics,
        batch_reference: Option<f64>,
    ) -> Result<Adjustment> {
        static_gain(&self.params, stats, stats.max, batch_reference)
    }
}
