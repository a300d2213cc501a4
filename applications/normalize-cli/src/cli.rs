//! Command-line arguments

use clap::{Args, Parser};
use config::Value;
use soul_normalize::NormalizationType;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "soul-normalize")]
#[command(version, about = "Loudness normalization of media files through ffmpeg", long_about = None)]
pub struct Cli {
    /// Input media files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output file names, one per input
    #[arg(short, long, num_args = 1..)]
    pub output: Vec<PathBuf>,

    /// Folder for outputs when --output is not given
    #[arg(long, default_value = "normalized")]
    pub output_folder: PathBuf,

    /// Overwrite existing output files
    #[arg(short, long)]
    pub force: bool,

    /// Measure only, print the commands that would run
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Print loudness statistics as JSON
    #[arg(short = 'p', long)]
    pub print_stats: bool,

    /// Show progress bars
    #[arg(long)]
    pub progress: bool,

    /// Debug output
    #[arg(short, long, conflicts_with = "quiet")]
    pub debug: bool,

    /// Informational output, the default level
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,

    /// TOML file with default options
    #[arg(long, env = "SOUL_NORMALIZE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub normalization: NormalizationArgs,

    #[command(flatten)]
    pub encoding: EncodingArgs,
}

#[derive(Args, Debug)]
#[command(next_help_heading = "Normalization")]
pub struct NormalizationArgs {
    /// Normalization type: ebu, rms or peak
    #[arg(long, value_parser = parse_normalization_type)]
    pub normalization_type: Option<NormalizationType>,

    /// Target level, LUFS for ebu, dBFS for rms and peak
    #[arg(short = 't', long, allow_hyphen_values = true)]
    pub target_level: Option<f64>,

    /// EBU loudness range target (LU)
    #[arg(long)]
    pub loudness_range_target: Option<f64>,

    /// Use the input loudness range as target
    #[arg(long)]
    pub keep_loudness_range_target: bool,

    /// Use the input loudness range when it exceeds the target
    #[arg(long)]
    pub keep_lra_above_loudness_range_target: bool,

    /// EBU maximum true peak (dBTP)
    #[arg(long, allow_hyphen_values = true)]
    pub true_peak: Option<f64>,

    /// EBU offset gain (LU)
    #[arg(long, allow_hyphen_values = true)]
    pub offset: Option<f64>,

    /// Never raise the level of a stream
    #[arg(long)]
    pub lower_only: bool,

    /// Lower the EBU target so true peak limiting is not needed
    #[arg(long)]
    pub auto_lower_loudness_target: bool,

    /// Treat mono input as dual mono
    #[arg(long)]
    pub dual_mono: bool,

    /// Force dynamic EBU normalization, skipping the first pass
    #[arg(long)]
    pub dynamic: bool,

    /// Preserve relative loudness across all inputs
    #[arg(long)]
    pub batch: bool,

    /// Write ReplayGain tags to the inputs instead of re-encoding
    #[arg(long)]
    pub replaygain: bool,
}

#[derive(Args, Debug)]
#[command(next_help_heading = "Encoding")]
pub struct EncodingArgs {
    /// Audio encoder (default: PCM matching the input bit depth)
    #[arg(long)]
    pub audio_codec: Option<String>,

    /// Audio bitrate, e.g. 192k
    #[arg(long)]
    pub audio_bitrate: Option<String>,

    /// Output sample rate
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Output channel count
    #[arg(long)]
    pub audio_channels: Option<u32>,

    /// Copy the original audio streams after the normalized ones
    #[arg(long)]
    pub keep_original_audio: bool,

    /// Copy audio streams that are not normalized
    #[arg(long)]
    pub keep_other_audio: bool,

    /// Input stream indices to normalize
    #[arg(long, value_delimiter = ',')]
    pub audio_streams: Option<Vec<usize>>,

    /// Normalize only streams with the default disposition
    #[arg(long)]
    pub audio_default_only: bool,

    /// Filter chain before normalization
    #[arg(long)]
    pub pre_filter: Option<String>,

    /// Filter chain after normalization
    #[arg(long)]
    pub post_filter: Option<String>,

    /// Video encoder
    #[arg(long)]
    pub video_codec: Option<String>,

    /// Drop video streams
    #[arg(long)]
    pub video_disable: bool,

    /// Drop subtitle streams
    #[arg(long)]
    pub subtitle_disable: bool,

    /// Drop metadata
    #[arg(long)]
    pub metadata_disable: bool,

    /// Drop chapters
    #[arg(long)]
    pub chapters_disable: bool,

    /// Extra ffmpeg options before the input, shell quoted
    #[arg(long, allow_hyphen_values = true)]
    pub extra_input_options: Option<String>,

    /// Extra ffmpeg options for the output, shell quoted
    #[arg(long, allow_hyphen_values = true)]
    pub extra_output_options: Option<String>,

    /// Output container format
    #[arg(long)]
    pub output_format: Option<String>,

    /// Output extension for --output-folder and null outputs
    #[arg(short = 'e', long)]
    pub extension: Option<String>,
}

fn parse_normalization_type(s: &str) -> Result<NormalizationType, String> {
    s.parse::<NormalizationType>().map_err(|e| e.to_string())
}

/// Split a shell-quoted option string
fn split_options(options: &str) -> anyhow::Result<Value> {
    let words = shlex::split(options)
        .ok_or_else(|| anyhow::anyhow!("Could not parse options: {}", options))?;
    Ok(Value::from(words))
}

impl Cli {
    /// Options given explicitly on the command line, as configuration keys
    pub fn overrides(&self) -> anyhow::Result<Vec<(&'static str, Value)>> {
        let n = &self.normalization;
        let e = &self.encoding;
        let mut overrides: Vec<(&'static str, Value)> = Vec::new();

        let flags = [
            ("keep_loudness_range_target", n.keep_loudness_range_target),
            (
                "keep_lra_above_loudness_range_target",
                n.keep_lra_above_loudness_range_target,
            ),
            ("lower_only", n.lower_only),
            ("auto_lower_loudness_target", n.auto_lower_loudness_target),
            ("dual_mono", n.dual_mono),
            ("dynamic", n.dynamic),
            ("batch", n.batch),
            ("replaygain", n.replaygain),
            ("keep_original_audio", e.keep_original_audio),
            ("keep_other_audio", e.keep_other_audio),
            ("audio_default_only", e.audio_default_only),
            ("video_disable", e.video_disable),
            ("subtitle_disable", e.subtitle_disable),
            ("metadata_disable", e.metadata_disable),
            ("chapters_disable", e.chapters_disable),
            ("dry_run", self.dry_run),
        ];
        overrides.extend(
            flags
                .into_iter()
                .filter(|(_, set)| *set)
                .map(|(key, _)| (key, Value::from(true))),
        );

        let numbers = [
            ("target_level", n.target_level),
            ("loudness_range_target", n.loudness_range_target),
            ("true_peak", n.true_peak),
            ("offset", n.offset),
        ];
        overrides.extend(
            numbers
                .into_iter()
                .filter_map(|(key, value)| value.map(|v| (key, Value::from(v)))),
        );

        let integers = [
            ("sample_rate", e.sample_rate),
            ("audio_channels", e.audio_channels),
        ];
        overrides.extend(
            integers
                .into_iter()
                .filter_map(|(key, value)| value.map(|v| (key, Value::from(i64::from(v))))),
        );

        let strings = [
            ("audio_codec", &e.audio_codec),
            ("audio_bitrate", &e.audio_bitrate),
            ("pre_filter", &e.pre_filter),
            ("post_filter", &e.post_filter),
            ("video_codec", &e.video_codec),
            ("output_format", &e.output_format),
            ("extension", &e.extension),
        ];
        overrides.extend(
            strings
                .into_iter()
                .filter_map(|(key, value)| value.as_ref().map(|v| (key, Value::from(v.as_str())))),
        );

        if let Some(normalization_type) = n.normalization_type {
            overrides.push(("normalization_type", Value::from(normalization_type.as_str())));
        }
        if let Some(streams) = &e.audio_streams {
            let streams: Vec<i64> = streams.iter().map(|&s| s as i64).collect();
            overrides.push(("audio_streams", Value::from(streams)));
        }
        if let Some(options) = &e.extra_input_options {
            overrides.push(("extra_input_options", split_options(options)?));
        }
        if let Some(options) = &e.extra_output_options {
            overrides.push(("extra_output_options", split_options(options)?));
        }

        Ok(overrides)
    }
}
