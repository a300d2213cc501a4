/// Normalization session configuration
use crate::error::{NormalizeError, Result};
use serde::{Deserialize, Serialize};
use soul_loudness::{
    NormalizationType, TargetParameters, DEFAULT_LOUDNESS_RANGE_TARGET, DEFAULT_TRUE_PEAK,
    EBU_R128_BROADCAST_LUFS, LOUDNESS_RANGE_TARGET_RANGE, OFFSET_RANGE, TRUE_PEAK_RANGE,
};
use std::ops::RangeInclusive;
use tracing::warn;

/// Output formats that cannot hold PCM audio
pub const PCM_INCOMPATIBLE_FORMATS: [&str; 7] = ["flac", "mp3", "mp4", "ogg", "oga", "opus", "webm"];

/// Output extensions that cannot hold PCM audio
pub const PCM_INCOMPATIBLE_EXTS: [&str; 8] =
    ["flac", "mp3", "mp4", "m4a", "ogg", "oga", "opus", "webm"];

/// Containers that cannot carry video
pub const AUDIO_ONLY_FORMATS: [&str; 8] = ["aac", "ast", "flac", "mka", "oga", "ogg", "opus", "wav"];

/// Containers that carry a single audio stream
pub const ONE_STREAM_FORMATS: [&str; 5] = ["aac", "ast", "flac", "mp3", "wav"];

/// Immutable configuration of one normalization session
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NormalizerConfig {
    #[serde(default)]
    pub normalization_type: NormalizationType,

    /// LUFS for ebu, dBFS for rms and peak
    #[serde(default = "default_target_level")]
    pub target_level: f64,

    #[serde(default = "default_loudness_range_target")]
    pub loudness_range_target: f64,

    #[serde(default)]
    pub keep_loudness_range_target: bool,

    #[serde(default)]
    pub keep_lra_above_loudness_range_target: bool,

    #[serde(default = "default_true_peak")]
    pub true_peak: f64,

    #[serde(default)]
    pub offset: f64,

    #[serde(default)]
    pub lower_only: bool,

    #[serde(default)]
    pub auto_lower_loudness_target: bool,

    #[serde(default)]
    pub dual_mono: bool,

    #[serde(default)]
    pub dynamic: bool,

    /// Audio encoder; PCM matching the input bit depth when unset
    #[serde(default)]
    pub audio_codec: Option<String>,

    #[serde(default)]
    pub audio_bitrate: Option<String>,

    #[serde(default)]
    pub sample_rate: Option<u32>,

    #[serde(default)]
    pub audio_channels: Option<u32>,

    /// Copy the original audio streams after the normalized ones
    #[serde(default)]
    pub keep_original_audio: bool,

    /// Copy audio streams excluded by stream selection
    #[serde(default)]
    pub keep_other_audio: bool,

    /// Input stream indices to normalize
    #[serde(default)]
    pub audio_streams: Option<Vec<usize>>,

    /// Normalize only streams with the default disposition
    #[serde(default)]
    pub audio_default_only: bool,

    #[serde(default)]
    pub pre_filter: Option<String>,

    #[serde(default)]
    pub post_filter: Option<String>,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default)]
    pub video_disable: bool,

    #[serde(default)]
    pub subtitle_disable: bool,

    #[serde(default)]
    pub metadata_disable: bool,

    #[serde(default)]
    pub chapters_disable: bool,

    /// Engine options placed before `-i`
    #[serde(default)]
    pub extra_input_options: Vec<String>,

    /// Engine options placed before `-f`
    #[serde(default)]
    pub extra_output_options: Vec<String>,

    #[serde(default)]
    pub output_format: Option<String>,

    /// Output extension when the output path has none
    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default)]
    pub dry_run: bool,

    /// Preserve relative loudness across all files
    #[serde(default)]
    pub batch: bool,

    /// Write ReplayGain tags to the input instead of re-encoding
    #[serde(default)]
    pub replaygain: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            normalization_type: NormalizationType::default(),
            target_level: default_target_level(),
            loudness_range_target: default_loudness_range_target(),
            keep_loudness_range_target: false,
            keep_lra_above_loudness_range_target: false,
            true_peak: default_true_peak(),
            offset: 0.0,
            lower_only: false,
            auto_lower_loudness_target: false,
            dual_mono: false,
            dynamic: false,
            audio_codec: None,
            audio_bitrate: None,
            sample_rate: None,
            audio_channels: None,
            keep_original_audio: false,
            keep_other_audio: false,
            audio_streams: None,
            audio_default_only: false,
            pre_filter: None,
            post_filter: None,
            video_codec: default_video_codec(),
            video_disable: false,
            subtitle_disable: false,
            metadata_disable: false,
            chapters_disable: false,
            extra_input_options: Vec::new(),
            extra_output_options: Vec::new(),
            output_format: None,
            extension: default_extension(),
            dry_run: false,
            batch: false,
            replaygain: false,
        }
    }
}

fn check_range(value: f64, range: RangeInclusive<f64>, name: &str) -> Result<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(NormalizeError::Configuration(format!(
            "{} must be within [{}, {}], got {}",
            name,
            range.start(),
            range.end(),
            value
        )))
    }
}

fn conflict(a: &str, b: &str) -> NormalizeError {
    NormalizeError::Configuration(format!("{} and {} are mutually exclusive", a, b))
}

impl NormalizerConfig {
    /// Validate value ranges and option combinations
    pub fn validate(&self) -> Result<()> {
        check_range(
            self.target_level,
            self.normalization_type.target_range(),
            &format!("Target level for {}", self.normalization_type),
        )?;
        check_range(
            self.loudness_range_target,
            LOUDNESS_RANGE_TARGET_RANGE,
            "Loudness range target",
        )?;
        check_range(self.true_peak, TRUE_PEAK_RANGE, "True peak")?;
        check_range(self.offset, OFFSET_RANGE, "Offset")?;

        if self.keep_loudness_range_target && self.keep_lra_above_loudness_range_target {
            return Err(conflict(
                "keep_loudness_range_target",
                "keep_lra_above_loudness_range_target",
            ));
        }

        if self.keep_loudness_range_target
            && (self.loudness_range_target - DEFAULT_LOUDNESS_RANGE_TARGET).abs() > f64::EPSILON
        {
            warn!("Setting --keep-loudness-range-target will override your set loudness range target value!");
        }

        if self.audio_streams.is_some() && self.audio_default_only {
            return Err(conflict("audio_streams", "audio_default_only"));
        }

        if matches!(&self.audio_streams, Some(streams) if streams.is_empty()) {
            return Err(NormalizeError::Configuration(
                "audio_streams must name at least one stream".to_string(),
            ));
        }

        if self.keep_other_audio && self.keep_original_audio {
            return Err(conflict("keep_other_audio", "keep_original_audio"));
        }

        if self.replaygain && self.normalization_type != NormalizationType::Ebu {
            return Err(NormalizeError::Configuration(
                "ReplayGain only works for EBU normalization type for now.".to_string(),
            ));
        }

        if self.is_pcm_audio() {
            if let Some(format) = &self.output_format {
                if PCM_INCOMPATIBLE_FORMATS.contains(&format.as_str()) {
                    return Err(NormalizeError::Configuration(format!(
                        "Output format {} does not support PCM audio. \
                         Please choose a suitable audio codec with the -c:a option.",
                        format
                    )));
                }
            }
        }

        Ok(())
    }

    /// Whether the output audio will be PCM
    pub fn is_pcm_audio(&self) -> bool {
        self.audio_codec
            .as_deref()
            .map_or(true, |codec| codec.contains("pcm"))
    }

    /// Targets handed to the normalization strategy
    pub fn target_parameters(&self) -> TargetParameters {
        TargetParameters {
            target_level: self.target_level,
            loudness_range_target: self.loudness_range_target,
            keep_loudness_range_target: self.keep_loudness_range_target,
            keep_lra_above_loudness_range_target: self.keep_lra_above_loudness_range_target,
            true_peak: self.true_peak,
            offset: self.offset,
            dual_mono: self.dual_mono,
            dynamic: self.dynamic,
            lower_only: self.lower_only,
            auto_lower_loudness_target: self.auto_lower_loudness_target,
            sample_rate_set: self.sample_rate.is_some(),
        }
    }
}

// Default values
fn default_target_level() -> f64 {
    EBU_R128_BROADCAST_LUFS
}

fn default_loudness_range_target() -> f64 {
    DEFAULT_LOUDNESS_RANGE_TARGET
}

fn default_true_peak() -> f64 {
    DEFAULT_TRUE_PEAK
}

fn default_video_codec() -> String {
    "copy".to_string()
}

fn default_extension() -> String {
    "mkv".to_string()
}
