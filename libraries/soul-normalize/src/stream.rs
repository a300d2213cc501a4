//! Media streams of an input file
//!
//! Only audio streams carry state: their measurements and the warnings
//! raised while normalizing them. Video and subtitle streams are mapped
//! through untouched.

use crate::context::SessionContext;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use soul_ffmpeg::{null_device, EngineCommand, ProbedStream, ProgressFn};
use soul_loudness::{
    filter_chain, Adjustment, EbuLoudnessStatistics, LoudnessStatistics, NormalizationWarning,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// PCM encoder matching a bit depth
///
/// Unknown depths fall back to 16 bit.
pub fn pcm_codec_for_bit_depth(bit_depth: Option<u32>) -> &'static str {
    match bit_depth {
        None | Some(0) => "pcm_s16le",
        Some(depth) if depth <= 8 => "pcm_s8",
        Some(16) => "pcm_s16le",
        Some(24) => "pcm_s24le",
        Some(32) => "pcm_s32le",
        Some(64) => "pcm_s64le",
        Some(depth) => {
            warn!("Unsupported bit depth {}, falling back to pcm_s16le", depth);
            "pcm_s16le"
        }
    }
}

/// Statistics of one audio stream, as printed with `--print-stats`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStatistics {
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub stream_id: usize,
    pub ebu_pass1: Option<EbuLoudnessStatistics>,
    pub ebu_pass2: Option<EbuLoudnessStatistics>,
    pub mean: Option<f64>,
    pub max: Option<f64>,
}

/// A video stream, copied or re-encoded with the configured codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoStream {
    pub stream_id: usize,
    pub kind_index: usize,
}

/// A subtitle stream, always copied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtitleStream {
    pub stream_id: usize,
    pub kind_index: usize,
}

/// An audio stream selected for normalization
#[derive(Debug, Clone)]
pub struct AudioStream {
    /// Absolute stream index in the input
    pub stream_id: usize,
    /// Position among the input's audio streams
    pub kind_index: usize,
    pub sample_rate: Option<u32>,
    pub bit_depth: Option<u32>,
    pub duration: Option<f64>,
    pub is_default: bool,
    statistics: LoudnessStatistics,
    adjustment: Option<Adjustment>,
    warnings: Vec<NormalizationWarning>,
}

impl AudioStream {
    pub fn from_probe(probed: &ProbedStream, duration: Option<f64>) -> Self {
        Self {
            stream_id: probed.index,
            kind_index: probed.kind_index,
            sample_rate: probed.sample_rate,
            bit_depth: probed.bit_depth,
            duration,
            is_default: probed.is_default,
            statistics: LoudnessStatistics::default(),
            adjustment: None,
            warnings: Vec::new(),
        }
    }

    pub fn statistics(&self) -> &LoudnessStatistics {
        &self.statistics
    }

    /// Warnings raised for this stream so far
    pub fn warnings(&self) -> &[NormalizationWarning] {
        &self.warnings
    }

    /// Second-pass adjustment, once built
    pub fn adjustment(&self) -> Option<&Adjustment> {
        self.adjustment.as_ref()
    }

    pub fn pcm_codec(&self) -> &'static str {
        pcm_codec_for_bit_depth(self.bit_depth)
    }

    /// Filter graph input label, `[0:<id>]`
    pub fn input_label(&self) -> String {
        format!("[0:{}]", self.stream_id)
    }

    /// Filter graph output label, `[norm<id>]`
    pub fn output_label(&self) -> String {
        format!("[norm{}]", self.stream_id)
    }

    /// First-pass command measuring this stream into the null sink
    pub fn measurement_command(&self, ctx: &SessionContext, input: &Path) -> EngineCommand {
        let filter = filter_chain(
            ctx.config.pre_filter.as_deref(),
            &ctx.strategy.measurement_filter(),
            None,
        );

        let mut cmd = ctx.command();
        cmd.args(["-hide_banner", "-y", "-i"])
            .arg(input)
            .arg("-filter_complex")
            .arg(format!("{}{}", self.input_label(), filter))
            .args(["-vn", "-sn", "-f", "null"])
            .arg(null_device());
        cmd
    }

    /// Run the first pass and record its statistics
    pub async fn measure(
        &mut self,
        ctx: &SessionContext,
        input: &Path,
        on_progress: ProgressFn<'_>,
    ) -> Result<()> {
        info!(
            "Running first pass {} measurement for stream {}",
            ctx.strategy.normalization_type(),
            self.stream_id
        );

        let cmd = self.measurement_command(ctx, input);
        let output = ctx
            .runner
            .run_with_progress(&cmd, self.duration, on_progress)
            .await?;

        self.statistics = ctx.strategy.parse_measurement(&output)?;
        debug!(
            "First pass statistics for stream {}: {:?}",
            self.stream_id, self.statistics
        );
        Ok(())
    }

    /// Build the second-pass filter chain for this stream
    ///
    /// Returns the complete `[0:<id>]...[norm<id>]` chain.
    pub fn build_adjustment(
        &mut self,
        ctx: &SessionContext,
        batch_reference: Option<f64>,
    ) -> Result<String> {
        let adjustment = ctx
            .strategy
            .adjustment_filter(&self.statistics, batch_reference)?;

        let chain = filter_chain(
            ctx.config.pre_filter.as_deref(),
            &adjustment.filter,
            ctx.config.post_filter.as_deref(),
        );
        self.warnings.extend(adjustment.warnings.iter().cloned());
        self.adjustment = Some(adjustment);

        Ok(format!("{}{}{}", self.input_label(), chain, self.output_label()))
    }

    /// Whether the second pass will print a loudnorm report for this stream
    pub fn expects_second_pass_report(&self) -> bool {
        self.adjustment.as_ref().is_some_and(Adjustment::uses_loudnorm)
    }

    /// Record the loudnorm report of the adjustment pass
    pub fn set_second_pass_stats(&mut self, ctx: &SessionContext, stats: EbuLoudnessStatistics) {
        debug!(
            "Setting second pass stats for stream {} from {:?}",
            self.stream_id, stats
        );
        if let Some(warning) = ctx.strategy.review_second_pass(&stats) {
            self.warnings.push(warning);
        }
        self.statistics.ebu_pass2 = Some(stats);
    }

    /// Statistics record for this stream
    pub fn stats(&self, input_file: &Path, output_file: &Path) -> StreamStatistics {
        StreamStatistics {
            input_file: input_file.to_path_buf(),
            output_file: output_file.to_path_buf(),
            stream_id: self.stream_id,
            ebu_pass1: self.statistics.ebu_pass1.clone(),
            ebu_pass2: self.statistics.ebu_pass2.clone(),
            mean: self.statistics.mean,
            max: self.statistics.max,
        }
    }
}
