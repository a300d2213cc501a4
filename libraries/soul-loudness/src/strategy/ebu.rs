use super::{
    lower_only_passthrough, Adjustment, AdjustmentKind, NormalizationStrategy, NormalizationType,
    TargetParameters, EBU_TARGET_RANGE, LOUDNESS_RANGE_TARGET_RANGE,
};
use crate::error::{LoudnessError, Result};
use crate::filter::FilterSpec;
use crate::loudnorm::parse_loudnorm_output;
use crate::statistics::{EbuLoudnessStatistics, LoudnessStatistics, NormalizationMode};
use crate::warning::{constrain, NormalizationWarning};
use tracing::debug;

/// EBU R128 normalization through the loudnorm filter
///
/// The first pass measures with loudnorm itself; the second pass feeds the
/// measurement back as `measured_*` options so loudnorm can apply a single
/// linear gain. In dynamic mode the first pass is skipped.
#[derive(Debug, Clone)]
pub struct EbuStrategy {
    params: TargetParameters,
}

impl EbuStrategy {
    pub fn new(params: TargetParameters) -> Self {
        Self { params }
    }

    fn loudnorm(&self, target_level: f64, lra: f64) -> FilterSpec {
        FilterSpec::new("loudnorm")
            .opt("i", target_level)
            .opt("lra", lra)
            .opt("tp", self.params.true_peak)
    }

    fn dynamic_filter(&self) -> Adjustment {
        let p = &self.params;
        let mut warnings = Vec::new();
        if !p.sample_rate_set {
            warnings.push(NormalizationWarning::DynamicSampleRate.log());
        }

        let filter = self
            .loudnorm(p.target_level, p.loudness_range_target)
            .opt("offset", p.offset)
            .opt("linear", "false")
            .opt("print_format", "json")
            .opt_if(p.dual_mono, "dual_mono", "true");

        Adjustment {
            filter: filter.to_string(),
            kind: AdjustmentKind::Loudnorm,
            warnings,
        }
    }

    /// Effective LRA target after the keep-input policies
    fn loudness_range_target(
        &self,
        measured: &EbuLoudnessStatistics,
        warnings: &mut Vec<NormalizationWarning>,
    ) -> f64 {
        let p = &self.params;
        let (min, max) = (
            *LOUDNESS_RANGE_TARGET_RANGE.start(),
            *LOUDNESS_RANGE_TARGET_RANGE.end(),
        );

        if p.keep_loudness_range_target {
            debug!("Keeping input loudness range in second pass loudnorm filter");
            if !LOUDNESS_RANGE_TARGET_RANGE.contains(&measured.input_lra) {
                warnings.push(
                    NormalizationWarning::LoudnessRangeOutOfBounds {
                        measured: measured.input_lra,
                    }
                    .log(),
                );
            }
            return measured.input_lra.clamp(min, max);
        }

        if p.keep_lra_above_loudness_range_target && measured.input_lra > p.loudness_range_target {
            debug!("Input loudness range above target, keeping it");
            return measured.input_lra.min(max);
        }

        p.loudness_range_target
    }

    /// Effective integrated loudness target
    fn target_level(
        &self,
        input_i: f64,
        input_tp: f64,
        batch_reference: Option<f64>,
        warnings: &mut Vec<NormalizationWarning>,
    ) -> f64 {
        let p = &self.params;
        let mut target = p.target_level;

        if let Some(reference) = batch_reference {
            let anchored = p.target_level + (input_i - reference);
            target = anchored.clamp(*EBU_TARGET_RANGE.start(), *EBU_TARGET_RANGE.end());
            if (target - anchored).abs() > f64::EPSILON {
                warnings.push(
                    NormalizationWarning::BatchTargetClamped {
                        from: anchored,
                        to: target,
                    }
                    .log(),
                );
            }
            debug!(
                "Batch mode: stream at {:.2} LUFS, reference {:.2} LUFS, target {:.2} LUFS",
                input_i, reference, target
            );
        }

        if p.auto_lower_loudness_target {
            let safe_target = (input_i - input_tp + p.true_peak - 0.1).max(*EBU_TARGET_RANGE.start());
            if safe_target < target {
                target = safe_target;
                warnings.push(NormalizationWarning::AutoLoweredTarget { target }.log());
            }
        }

        target
    }
}

impl NormalizationStrategy for EbuStrategy {
    fn normalization_type(&self) -> NormalizationType {
        NormalizationType::Ebu
    }

    fn params(&self) -> &TargetParameters {
        &self.params
    }

    fn requires_first_pass(&self) -> bool {
        !self.params.dynamic
    }

    fn measurement_filter(&self) -> String {
        let p = &self.params;
        self.loudnorm(p.target_level, p.loudness_range_target)
            .opt("offset", p.offset)
            .opt("print_format", "json")
            .opt_if(p.dual_mono, "dual_mono", "true")
            .to_string()
    }

    fn parse_measurement(&self, output: &str) -> Result<LoudnessStatistics> {
        // A measurement pass runs a single loudnorm instance
        let stats = parse_loudnorm_output(output)?
            .into_values()
            .next()
            .ok_or_else(|| {
                LoudnessError::MeasurementParse("no loudnorm statistics in output".to_string())
            })?;

        Ok(LoudnessStatistics {
            ebu_pass1: Some(stats),
            ..Default::default()
        })
    }

    fn adjustment_filter(
        &self,
        stats: &LoudnessStatistics,
        batch_reference: Option<f64>,
    ) -> Result<Adjustment> {
        if self.params.dynamic {
            return Ok(self.dynamic_filter());
        }

        let measured = stats.ebu_pass1.as_ref().ok_or_else(|| {
            LoudnessError::MissingMeasurement("no loudnorm statistics for this stream".to_string())
        })?;

        let mut warnings = Vec::new();

        let mut input_i = measured.input_i;
        if input_i > 0.0 {
            warnings.push(NormalizationWarning::InputLoudnessAboveZero { measured: input_i }.log());
            input_i = 0.0;
        }

        if let Some(passthrough) = lower_only_passthrough(&self.params, input_i) {
            return Ok(passthrough);
        }

        let lra = self.loudness_range_target(measured, &mut warnings);
        if lra < measured.input_lra {
            warnings.push(
                NormalizationWarning::DynamicFallback {
                    input_lra: measured.input_lra,
                    target_lra: lra,
                }
                .log(),
            );
            if !self.params.sample_rate_set {
                warnings.push(NormalizationWarning::DynamicSampleRate.log());
            }
        }

        let target = self.target_level(input_i, measured.input_tp, batch_reference, &mut warnings);

        let offset = constrain(measured.target_offset, -99.0, 99.0, "target_offset", &mut warnings);
        let measured_i = constrain(input_i, -99.0, 0.0, "input_i", &mut warnings);
        let measured_lra = constrain(measured.input_lra, 0.0, 99.0, "input_lra", &mut warnings);
        let measured_tp = constrain(measured.input_tp, -99.0, 99.0, "input_tp", &mut warnings);
        let measured_thresh =
            constrain(measured.input_thresh, -99.0, 0.0, "input_thresh", &mut warnings);

        let filter = self
            .loudnorm(target, lra)
            .opt("offset", offset)
            .opt("measured_i", measured_i)
            .opt("measured_lra", measured_lra)
            .opt("measured_tp", measured_tp)
            .opt("measured_thresh", measured_thresh)
            .opt("linear", "true")
            .opt("print_format", "json")
            .opt_if(self.params.dual_mono, "dual_mono", "true");

        Ok(Adjustment {
            filter: filter.to_string(),
            kind: AdjustmentKind::Loudnorm,
            warnings,
        })
    }

    fn review_second_pass(&self, pass2: &EbuLoudnessStatistics) -> Option<NormalizationWarning> {
        if !self.params.dynamic && pass2.normalization_type == NormalizationMode::Dynamic {
            Some(NormalizationWarning::DynamicModeUsed.log())
        } else {
            None
        }
    }
}
