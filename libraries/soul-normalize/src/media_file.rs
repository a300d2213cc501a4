//! One input/output pair and its two-pass pipeline
//!
//! A [`MediaFile`] discovers its streams with a probe, measures the selected
//! audio streams (first pass) and then writes the normalized output with a
//! single filter-graph command (second pass).
//!
//! The second pass always writes into a scratch directory. The result is
//! moved into place only after the engine exited successfully; the scratch
//! directory is removed when it goes out of scope, on every exit path.

use crate::config::{NormalizerConfig, AUDIO_ONLY_FORMATS, ONE_STREAM_FORMATS};
use crate::context::SessionContext;
use crate::error::{NormalizeError, Result};
use crate::progress::ProgressReporter;
use crate::stream::{AudioStream, StreamStatistics, SubtitleStream, VideoStream};
use soul_ffmpeg::{
    is_null_device, parse_probe_output, probe_command, EngineCommand, ProbedStream, StreamKind,
};
use soul_loudness::{
    parse_loudnorm_output, write_replaygain_tags, LoudnessError, NormalizationType, TrackGain,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Tags that would be stale after re-encoding
const STALE_GAIN_TAGS: [&str; 6] = [
    "REPLAYGAIN_TRACK_GAIN",
    "REPLAYGAIN_TRACK_PEAK",
    "REPLAYGAIN_ALBUM_GAIN",
    "REPLAYGAIN_ALBUM_PEAK",
    "R128_TRACK_GAIN",
    "R128_ALBUM_GAIN",
];

/// Where a media file is in its pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Discovered,
    Measuring,
    /// Measured, waiting for the batch reference
    BatchPending,
    Adjusting,
    Done,
    /// Excluded from the adjustment phase after a failed batch analysis
    Skipped,
    Failed,
}

/// Output extension, lowercased
///
/// Falls back to `default` when the output is the null device or has no
/// extension.
pub fn output_extension(output: &Path, default: &str) -> String {
    if is_null_device(output) {
        return default.to_ascii_lowercase();
    }
    output
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or(default)
        .to_ascii_lowercase()
}

/// Split the input's audio streams into (normalized, not normalized)
pub fn select_audio_streams(
    config: &NormalizerConfig,
    audio: &[ProbedStream],
) -> (Vec<ProbedStream>, Vec<ProbedStream>) {
    if let Some(ids) = &config.audio_streams {
        for id in ids {
            if !audio.iter().any(|s| s.index == *id) {
                warn!("Audio stream {} not found in input, ignoring it", id);
            }
        }
        return audio.iter().cloned().partition(|s| ids.contains(&s.index));
    }

    if config.audio_default_only {
        let (default, other): (Vec<_>, Vec<_>) =
            audio.iter().cloned().partition(|s| s.is_default);
        if default.is_empty() {
            if let Some((first, rest)) = audio.split_first() {
                warn!(
                    "No audio stream has the default disposition, using stream {}",
                    first.index
                );
                return (vec![first.clone()], rest.to_vec());
            }
        }
        return (default, other);
    }

    (audio.to_vec(), Vec::new())
}

#[derive(Debug)]
pub struct MediaFile {
    ctx: SessionContext,
    input_file: PathBuf,
    output_file: PathBuf,
    output_ext: String,
    duration: Option<f64>,
    state: FileState,
    audio_streams: Vec<AudioStream>,
    /// Unselected audio streams copied with `keep_other_audio`
    other_audio: Vec<ProbedStream>,
    video_streams: Vec<VideoStream>,
    subtitle_streams: Vec<SubtitleStream>,
}

impl MediaFile {
    /// Probe `input` and select the audio streams to normalize
    pub async fn discover(ctx: SessionContext, input: &Path, output: &Path) -> Result<Self> {
        let output_ext = output_extension(output, &ctx.config.extension);

        info!("Probing {}", input.display());
        let log = ctx.runner.run(&probe_command(&ctx.ffmpeg, input)).await?;
        let report = parse_probe_output(&log);
        if report.streams.is_empty() {
            return Err(NormalizeError::Probe(format!(
                "Could not find any streams in {}",
                input.display()
            )));
        }
        debug!("Probe of {}: {:?}", input.display(), report);

        let audio: Vec<ProbedStream> = report.audio().cloned().collect();
        let (mut selected, mut other) = select_audio_streams(&ctx.config, &audio);
        if !ctx.config.keep_other_audio {
            other.clear();
        }

        let mut video_streams: Vec<VideoStream> = report
            .of_kind(StreamKind::Video)
            .map(|s| VideoStream {
                stream_id: s.index,
                kind_index: s.kind_index,
            })
            .collect();
        let mut subtitle_streams: Vec<SubtitleStream> = report
            .of_kind(StreamKind::Subtitle)
            .map(|s| SubtitleStream {
                stream_id: s.index,
                kind_index: s.kind_index,
            })
            .collect();

        if ONE_STREAM_FORMATS.contains(&output_ext.as_str()) {
            if selected.len() > 1 || !other.is_empty() {
                warn!(
                    "Output file only supports one stream. Keeping only first audio stream of {}.",
                    input.display()
                );
            }
            selected.truncate(1);
            other.clear();
            video_streams.clear();
            subtitle_streams.clear();
        }

        if selected.is_empty() {
            return Err(NormalizeError::no_audio(input));
        }

        let audio_streams = selected
            .iter()
            .map(|s| AudioStream::from_probe(s, report.duration))
            .collect();

        Ok(Self {
            ctx,
            input_file: input.to_path_buf(),
            output_file: output.to_path_buf(),
            output_ext,
            duration: report.duration,
            state: FileState::Discovered,
            audio_streams,
            other_audio: other,
            video_streams,
            subtitle_streams,
        })
    }

    pub fn input_file(&self) -> &Path {
        &self.input_file
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    pub fn output_ext(&self) -> &str {
        &self.output_ext
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: FileState) {
        self.state = state;
    }

    pub fn audio_streams(&self) -> &[AudioStream] {
        &self.audio_streams
    }

    pub fn video_streams(&self) -> &[VideoStream] {
        &self.video_streams
    }

    pub fn subtitle_streams(&self) -> &[SubtitleStream] {
        &self.subtitle_streams
    }

    /// Levels batch mode averages, one per selected audio stream
    pub fn measured_levels(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.audio_streams
            .iter()
            .map(|s| self.ctx.strategy.measured_level(s.statistics()))
    }

    /// Measure every selected audio stream
    pub async fn first_pass(&mut self, reporter: &mut dyn ProgressReporter) -> Result<()> {
        self.state = FileState::Measuring;
        if !self.ctx.strategy.requires_first_pass() {
            debug!("Dynamic EBU mode: first pass not needed");
            return Ok(());
        }

        info!("Running first pass for {}", self.input_file.display());
        let total = self.audio_streams.len();
        for (i, stream) in self.audio_streams.iter_mut().enumerate() {
            reporter.task_started(&format!("Stream {}/{}: measuring", i + 1, total));
            stream
                .measure(&self.ctx, &self.input_file, &mut |p: f32| {
                    reporter.task_progress(p)
                })
                .await?;
            reporter.task_finished();
        }
        Ok(())
    }

    /// Adjust every selected audio stream and write the output
    ///
    /// With a `batch_reference` every stream is anchored to the shared
    /// batch loudness instead of its own measurement.
    pub async fn second_pass(
        &mut self,
        batch_reference: Option<f64>,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<()> {
        self.state = FileState::Adjusting;
        info!("Running second pass for {}", self.input_file.display());

        let chains = self
            .audio_streams
            .iter_mut()
            .map(|stream| stream.build_adjustment(&self.ctx, batch_reference))
            .collect::<Result<Vec<_>>>()?;
        let filter_complex = chains.join(";");

        if self.has_elided_video() && !self.ctx.config.video_disable {
            warn!(
                "Output container {} cannot hold video, dropping video streams of {}",
                self.output_ext,
                self.input_file.display()
            );
        }

        let dry_run = self.ctx.config.dry_run;
        let scratch = if dry_run || is_null_device(&self.output_file) {
            None
        } else {
            Some(
                tempfile::Builder::new()
                    .prefix("soul-normalize-")
                    .tempdir()?,
            )
        };
        let target = match &scratch {
            Some(dir) => dir.path().join(format!("out.{}", self.output_ext)),
            None => self.output_file.clone(),
        };
        if dry_run {
            warn!("Dry run used, not actually writing {}", self.output_file.display());
        }

        let cmd = self.second_pass_command(&filter_complex, &target);
        reporter.task_started("Second pass");
        let output = self
            .ctx
            .runner
            .run_with_progress(&cmd, self.duration, &mut |p: f32| reporter.task_progress(p))
            .await?;
        reporter.task_finished();

        if !dry_run {
            self.record_second_pass(&output);
        }

        if self.ctx.config.replaygain {
            self.write_replaygain()?;
        } else if scratch.is_some() {
            move_into_place(&target, &self.output_file).await?;
            info!("Normalized file written to {}", self.output_file.display());
        }

        self.state = FileState::Done;
        Ok(())
    }

    /// Statistics of every selected audio stream
    pub fn stats(&self) -> Vec<StreamStatistics> {
        self.audio_streams
            .iter()
            .map(|s| s.stats(&self.input_file, &self.output_file))
            .collect()
    }

    fn is_single_stream(&self) -> bool {
        ONE_STREAM_FORMATS.contains(&self.output_ext.as_str())
    }

    fn has_elided_video(&self) -> bool {
        !self.video_streams.is_empty() && AUDIO_ONLY_FORMATS.contains(&self.output_ext.as_str())
    }

    fn writes_video(&self) -> bool {
        !self.ctx.config.video_disable
            && !self.video_streams.is_empty()
            && !AUDIO_ONLY_FORMATS.contains(&self.output_ext.as_str())
    }

    fn writes_subtitles(&self) -> bool {
        !self.ctx.config.subtitle_disable && !self.subtitle_streams.is_empty()
    }

    /// Audio streams copied after the normalized ones, as (stream id, audio index)
    fn copied_audio(&self) -> Vec<(usize, usize)> {
        if self.is_single_stream() {
            return Vec::new();
        }
        if self.ctx.config.keep_original_audio {
            self.audio_streams
                .iter()
                .map(|s| (s.stream_id, s.kind_index))
                .collect()
        } else {
            self.other_audio
                .iter()
                .map(|s| (s.index, s.kind_index))
                .collect()
        }
    }

    /// The complete adjustment command writing to `target`
    pub(crate) fn second_pass_command(&self, filter_complex: &str, target: &Path) -> EngineCommand {
        let config = &self.ctx.config;
        let copied = self.copied_audio();
        let normalized = self.audio_streams.len();
        let write_video = self.writes_video();
        let write_subtitles = self.writes_subtitles();

        let mut cmd = self.ctx.command().dry(config.dry_run);
        cmd.args(["-hide_banner", "-y"])
            .args(&config.extra_input_options)
            .arg("-i")
            .arg(&self.input_file)
            .arg("-filter_complex")
            .arg(filter_complex);

        if config.metadata_disable {
            cmd.args(["-map_metadata", "-1"]);
        } else {
            cmd.args(["-map_metadata", "0"]);
            let audio_sources = self
                .audio_streams
                .iter()
                .map(|s| s.kind_index)
                .chain(copied.iter().map(|(_, kind_index)| *kind_index));
            for (k, source) in audio_sources.enumerate() {
                cmd.arg(format!("-map_metadata:s:a:{}", k))
                    .arg(format!("0:s:a:{}", source));
            }
            if write_video {
                for (k, video) in self.video_streams.iter().enumerate() {
                    cmd.arg(format!("-map_metadata:s:v:{}", k))
                        .arg(format!("0:s:v:{}", video.kind_index));
                }
            }
            if write_subtitles {
                for (k, subtitle) in self.subtitle_streams.iter().enumerate() {
                    cmd.arg(format!("-map_metadata:s:s:{}", k))
                        .arg(format!("0:s:s:{}", subtitle.kind_index));
                }
            }
        }

        cmd.arg("-map_chapters")
            .arg(if config.chapters_disable { "-1" } else { "0" });

        if write_video {
            for video in &self.video_streams {
                cmd.arg("-map").arg(format!("0:{}", video.stream_id));
            }
            cmd.arg("-c:v").arg(&config.video_codec);
        }

        for stream in &self.audio_streams {
            cmd.arg("-map").arg(stream.output_label());
        }

        match &config.audio_codec {
            Some(codec) => {
                cmd.arg("-c:a").arg(codec);
            }
            None => {
                for (k, stream) in self.audio_streams.iter().enumerate() {
                    cmd.arg(format!("-c:a:{}", k)).arg(stream.pcm_codec());
                }
            }
        }

        if let Some(bitrate) = &config.audio_bitrate {
            if config.audio_codec.as_deref() == Some("libvorbis") {
                // libvorbis takes the generic option
                cmd.arg("-b").arg(bitrate);
            } else {
                cmd.arg("-b:a").arg(bitrate);
            }
        }
        if let Some(rate) = config.sample_rate {
            cmd.arg("-ar").arg(rate.to_string());
        }
        if let Some(channels) = config.audio_channels {
            cmd.arg("-ac").arg(channels.to_string());
        }

        if write_subtitles {
            for subtitle in &self.subtitle_streams {
                cmd.arg("-map").arg(format!("0:{}", subtitle.stream_id));
            }
            cmd.args(["-c:s", "copy"]);
        }

        for (n, (stream_id, _)) in copied.iter().enumerate() {
            cmd.arg("-map")
                .arg(format!("0:{}", stream_id))
                .arg(format!("-c:a:{}", normalized + n))
                .arg("copy");
        }

        if !config.metadata_disable {
            for tag in STALE_GAIN_TAGS {
                cmd.arg("-metadata").arg(format!("{}=", tag));
            }
            for k in 0..normalized {
                for tag in STALE_GAIN_TAGS {
                    cmd.arg(format!("-metadata:s:a:{}", k))
                        .arg(format!("{}=", tag));
                }
            }
        }

        cmd.args(&config.extra_output_options);
        match &config.output_format {
            Some(format) => {
                cmd.arg("-f").arg(format);
            }
            None if is_null_device(target) => {
                cmd.args(["-f", "null"]);
            }
            None => {}
        }
        cmd.arg(target);
        cmd
    }

    /// Match second-pass loudnorm reports back to their streams
    ///
    /// Only streams adjusted through loudnorm print a report, so lower-only
    /// passthrough streams are skipped when pairing.
    fn record_second_pass(&mut self, output: &str) {
        if self.ctx.strategy.normalization_type() != NormalizationType::Ebu {
            return;
        }
        if !self.audio_streams.iter().any(AudioStream::expects_second_pass_report) {
            return;
        }

        let reports = match parse_loudnorm_output(output) {
            Ok(reports) => reports,
            Err(e) => {
                warn!(
                    "Could not read second pass statistics of {}: {}",
                    self.input_file.display(),
                    e
                );
                return;
            }
        };

        let mut reports = reports.into_values();
        for stream in self
            .audio_streams
            .iter_mut()
            .filter(|s| s.expects_second_pass_report())
        {
            match reports.next() {
                Some(report) => stream.set_second_pass_stats(&self.ctx, report),
                None => warn!(
                    "No second pass statistics reported for stream {}",
                    stream.stream_id
                ),
            }
        }
    }

    /// Tag the original input with the track gain of its first audio stream
    fn write_replaygain(&self) -> Result<()> {
        if self.audio_streams.len() > 1 {
            warn!(
                "ReplayGain tagging uses the first audio stream of {} only",
                self.input_file.display()
            );
        }
        let Some(stream) = self.audio_streams.first() else {
            return Ok(());
        };

        let statistics = stream.statistics();
        let ebu = match (&statistics.ebu_pass2, &statistics.ebu_pass1) {
            (Some(pass2), _) => pass2,
            (None, Some(pass1)) => {
                warn!("No second pass statistics available, using first pass for ReplayGain");
                pass1
            }
            (None, None) => {
                return Err(NormalizeError::MeasurementParse(format!(
                    "No loudness statistics for ReplayGain of {}",
                    self.input_file.display()
                )))
            }
        };

        let gain = TrackGain::from_ebu(ebu, self.ctx.config.target_level);
        if self.ctx.config.dry_run {
            warn!(
                "Dry run used, not writing ReplayGain tags (gain {}, peak {})",
                gain.gain_tag(),
                gain.peak_tag()
            );
            return Ok(());
        }

        match write_replaygain_tags(&self.input_file, &gain) {
            Ok(()) => {
                info!(
                    "ReplayGain tags written to {} (gain {}, peak {})",
                    self.input_file.display(),
                    gain.gain_tag(),
                    gain.peak_tag()
                );
                Ok(())
            }
            Err(LoudnessError::UnsupportedFormat(ext)) => {
                warn!(
                    "Skipping ReplayGain tags for {}, unsupported format {}",
                    self.input_file.display(),
                    ext
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Rename `from` to `to`, copying across filesystems
async fn move_into_place(from: &Path, to: &Path) -> Result<()> {
    debug!("Moving {} to {}", from.display(), to.display());
    if tokio::fs::rename(from, to).await.is_err() {
        tokio::fs::copy(from, to).await?;
        tokio::fs::remove_file(from).await?;
    }
    Ok(())
}
