//! Integration tests for soul-normalize
//!
//! Every session here runs against a scripted engine that answers probe,
//! measurement and adjustment commands with canned ffmpeg logs, so no
//! ffmpeg installation is needed.

use async_trait::async_trait;
use lofty::{ItemKey, Probe, TaggedFileExt};
use proptest::prelude::*;
use soul_ffmpeg::{EngineCommand, FfmpegError, ProgressFn};
use soul_loudness::NormalizationMode;
use soul_normalize::{
    batch_reference, CommandRunner, FileState, NormalizationType, NormalizationWarning,
    NormalizeError, Normalizer, NormalizerConfig,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ========== Scripted Engine ==========

/// Answers engine commands with canned logs
#[derive(Default)]
struct FakeEngine {
    /// Probe logs by input file name
    probes: HashMap<String, String>,
    /// First-pass logs by (input file name, stream id)
    measurements: HashMap<(String, usize), String>,
    second_pass_log: String,
    fail_second_pass: bool,
    no_loudnorm: bool,
    commands: Mutex<Vec<EngineCommand>>,
}

impl FakeEngine {
    fn probe(mut self, name: &str, log: String) -> Self {
        self.probes.insert(name.to_string(), log);
        self
    }

    fn measurement(mut self, name: &str, stream_id: usize, log: String) -> Self {
        self.measurements.insert((name.to_string(), stream_id), log);
        self
    }

    fn second_pass(mut self, log: String) -> Self {
        self.second_pass_log = log;
        self
    }

    fn commands(&self) -> Vec<EngineCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Adjustment commands, i.e. everything writing a real output
    fn second_pass_commands(&self) -> Vec<Vec<String>> {
        self.commands()
            .iter()
            .map(EngineCommand::args_lossy)
            .filter(|args| args.iter().any(|a| a == "-map_chapters"))
            .collect()
    }

    fn respond(&self, command: &EngineCommand) -> soul_ffmpeg::Result<String> {
        self.commands.lock().unwrap().push(command.clone());
        let args = command.args_lossy();

        if args.iter().any(|a| a == "-filters") {
            return Ok(if self.no_loudnorm {
                " ... volume            A->A       Change input volume.".to_string()
            } else {
                " ... loudnorm          A->A       EBU R128 loudness normalization".to_string()
            });
        }

        let input = value_after(&args, "-i")
            .map(|p| file_name(Path::new(&p)))
            .unwrap_or_default();

        if args.iter().any(|a| a == "-t") {
            return Ok(self.probes.get(&input).cloned().unwrap_or_default());
        }

        if args.iter().any(|a| a == "-vn") {
            let graph = value_after(&args, "-filter_complex").unwrap_or_default();
            let stream_id = graph
                .trim_start_matches("[0:")
                .split(']')
                .next()
                .and_then(|id| id.parse::<usize>().ok())
                .unwrap_or_default();
            return Ok(self
                .measurements
                .get(&(input, stream_id))
                .cloned()
                .unwrap_or_default());
        }

        if self.fail_second_pass {
            return Err(FfmpegError::Execution {
                command: command.to_shell_string(),
                stderr: "Conversion failed!".to_string(),
            });
        }

        if let Some(target) = command.output_target() {
            let target = Path::new(target);
            if !soul_ffmpeg::is_null_device(target) {
                std::fs::write(target, b"normalized").unwrap();
            }
        }
        Ok(self.second_pass_log.clone())
    }
}

#[async_trait]
impl CommandRunner for FakeEngine {
    async fn execute(&self, command: &EngineCommand) -> soul_ffmpeg::Result<String> {
        self.respond(command)
    }

    async fn execute_with_progress(
        &self,
        command: &EngineCommand,
        _duration: Option<f64>,
        on_progress: ProgressFn<'_>,
    ) -> soul_ffmpeg::Result<String> {
        on_progress(50.0);
        self.respond(command)
    }
}

// ========== Helper Functions ==========

fn value_after(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Probe banner with `audio` PCM streams, optionally preceded by a video stream
fn probe_log(name: &str, audio: usize, video: bool) -> String {
    let mut log = format!(
        "Input #0, matroska,webm, from '{name}':\n  Duration: 00:00:10.00, start: 0.000000, bitrate: 1536 kb/s\n"
    );
    let mut index = 0;
    if video {
        log.push_str("  Stream #0:0: Video: h264 (High), yuv420p, 320x240, 25 fps (default)\n");
        index += 1;
    }
    for i in 0..audio {
        let default = if i == 0 { " (default)" } else { "" };
        log.push_str(&format!(
            "  Stream #0:{}(eng): Audio: pcm_s16le, 48000 Hz, stereo, s16, 1536 kb/s{}\n",
            index + i,
            default
        ));
    }
    log.push_str("Output #0, null, to '/dev/null':\n");
    log
}

fn loudnorm_report(index: usize, input_i: f64, input_lra: f64, mode: &str) -> String {
    format!(
        "[Parsed_loudnorm_{index} @ 0x5581]\n\
         {{\n\
         \t\"input_i\" : \"{input_i:.2}\",\n\
         \t\"input_tp\" : \"-4.00\",\n\
         \t\"input_lra\" : \"{input_lra:.2}\",\n\
         \t\"input_thresh\" : \"-34.00\",\n\
         \t\"output_i\" : \"-23.00\",\n\
         \t\"output_tp\" : \"-2.00\",\n\
         \t\"output_lra\" : \"7.00\",\n\
         \t\"output_thresh\" : \"-33.00\",\n\
         \t\"normalization_type\" : \"{mode}\",\n\
         \t\"target_offset\" : \"0.10\"\n\
         }}\n"
    )
}

fn astats_log(rms: f64, peak: f64) -> String {
    format!(
        "[Parsed_astats_0 @ 0x5581] Overall\n\
         [Parsed_astats_0 @ 0x5581] Peak level dB: {peak:.6}\n\
         [Parsed_astats_0 @ 0x5581] RMS level dB: {rms:.6}\n"
    )
}

/// Create empty input files in a scratch directory
fn inputs(dir: &TempDir, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.path().join(name);
            std::fs::write(&path, b"input").unwrap();
            path
        })
        .collect()
}

/// Write a minimal MPEG-1 Layer III file: 20 silent 128 kb/s, 44.1 kHz frames
fn write_mp3(path: &Path) {
    let mut frame = vec![0u8; 417];
    frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
    std::fs::write(path, frame.repeat(20)).unwrap();
}

fn mp3_probe_log(name: &str) -> String {
    [
        format!("Input #0, mp3, from '{name}':"),
        "  Duration: 00:00:00.52, start: 0.000000, bitrate: 128 kb/s".to_string(),
        "  Stream #0:0: Audio: mp3, 44100 Hz, stereo, fltp, 128 kb/s".to_string(),
        "Output #0, null, to '/dev/null':".to_string(),
    ]
    .join("\n")
}

fn track_gain_tags(path: &Path) -> (Option<String>, Option<String>) {
    let tagged = Probe::open(path).unwrap().read().unwrap();
    let tag = tagged.primary_tag().unwrap();
    (
        tag.get_string(&ItemKey::ReplayGainTrackGain).map(str::to_string),
        tag.get_string(&ItemKey::ReplayGainTrackPeak).map(str::to_string),
    )
}

async fn session(config: NormalizerConfig, engine: &Arc<FakeEngine>) -> Normalizer {
    let runner: Arc<dyn CommandRunner> = engine.clone();
    Normalizer::with_runner(config, PathBuf::from("ffmpeg"), runner)
        .await
        .unwrap()
}

// ========== Property-Based Tests ==========

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// The batch reference is the plain mean of the measured values
    #[test]
    fn batch_reference_is_unweighted_mean(
        levels in prop::collection::vec(-70.0_f64..0.0_f64, 1..20),
        missing in 0usize..5,
    ) {
        let expected = levels.iter().sum::<f64>() / levels.len() as f64;
        let with_missing = levels
            .iter()
            .copied()
            .map(Some)
            .chain(std::iter::repeat(None).take(missing));

        let reference = batch_reference(with_missing).unwrap();
        prop_assert!((reference - expected).abs() < 1e-9);

        let min = levels.iter().copied().fold(f64::INFINITY, f64::min);
        let max = levels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(reference >= min - 1e-9 && reference <= max + 1e-9);
    }
}

// ========== Session Tests ==========

#[tokio::test]
async fn test_two_stream_ebu_falls_back_to_dynamic() {
    let dir = TempDir::new().unwrap();
    let input = inputs(&dir, &["movie.mkv"]).remove(0);
    let output = dir.path().join("out").join("movie.mkv");
    std::fs::create_dir_all(output.parent().unwrap()).unwrap();

    let engine = Arc::new(
        FakeEngine::default()
            .probe("movie.mkv", probe_log("movie.mkv", 2, true))
            .measurement("movie.mkv", 1, loudnorm_report(0, -21.5, 12.0, "dynamic"))
            .measurement("movie.mkv", 2, loudnorm_report(0, -24.3, 9.5, "dynamic"))
            .second_pass(format!(
                "{}{}",
                loudnorm_report(0, -21.5, 12.0, "dynamic"),
                loudnorm_report(1, -24.3, 9.5, "dynamic")
            )),
    );

    let mut normalizer = session(NormalizerConfig::default(), &engine).await;
    normalizer.add_media_file(&input, &output).await.unwrap();
    normalizer.run_normalization().await.unwrap();

    let stats = normalizer.stats();
    assert_eq!(stats.len(), 2);
    for record in stats {
        let pass1 = record.ebu_pass1.as_ref().unwrap();
        assert!((-25.0..=-21.0).contains(&pass1.input_i));
        let pass2 = record.ebu_pass2.as_ref().unwrap();
        assert_eq!(pass2.normalization_type, NormalizationMode::Dynamic);
        assert_eq!(record.output_file, output);
    }
    assert_eq!(stats[0].stream_id, 1);
    assert_eq!(stats[1].stream_id, 2);

    let media_file = &normalizer.media_files()[0];
    assert_eq!(media_file.state(), FileState::Done);
    for stream in media_file.audio_streams() {
        assert!(stream
            .warnings()
            .iter()
            .any(|w| matches!(w, NormalizationWarning::DynamicFallback { .. })));
    }

    assert_eq!(std::fs::read(&output).unwrap(), b"normalized");

    let second = &engine.second_pass_commands()[0];
    let graph = value_after(second, "-filter_complex").unwrap();
    assert!(graph.starts_with("[0:1]loudnorm=i=-23:lra=7:tp=-2:offset=0.1:measured_i=-21.5"));
    assert!(graph.contains("[norm1];[0:2]loudnorm="));
    assert!(graph.ends_with("[norm2]"));
    assert_eq!(value_after(second, "-c:v").as_deref(), Some("copy"));
    assert_eq!(value_after(second, "-c:a:0").as_deref(), Some("pcm_s16le"));
    assert_eq!(value_after(second, "-c:a:1").as_deref(), Some("pcm_s16le"));
    assert!(second.windows(2).any(|w| w == ["-map", "[norm2]"]));
    assert!(second.windows(2).any(|w| w == ["-map", "0:0"]));
    assert!(second
        .windows(2)
        .any(|w| w == ["-map_metadata:s:a:1", "0:s:a:1"]));
}

#[tokio::test]
async fn test_batch_mode_anchors_to_mean_level() {
    let dir = TempDir::new().unwrap();
    let names = ["a.wav", "b.wav", "c.wav"];
    let files = inputs(&dir, &names);
    let out_dir = dir.path().join("normalized");
    std::fs::create_dir_all(&out_dir).unwrap();

    let mut engine = FakeEngine::default();
    for (name, rms) in names.iter().zip([-10.0, -20.0, -30.0]) {
        engine = engine
            .probe(name, probe_log(name, 1, false))
            .measurement(name, 0, astats_log(rms, rms + 6.0));
    }
    let engine = Arc::new(engine);

    let config = NormalizerConfig {
        normalization_type: NormalizationType::Rms,
        target_level: -15.0,
        batch: true,
        ..Default::default()
    };
    let mut normalizer = session(config, &engine).await;
    for (input, name) in files.iter().zip(names) {
        normalizer
            .add_media_file(input, out_dir.join(name))
            .await
            .unwrap();
    }
    normalizer.run_normalization().await.unwrap();

    let seconds = engine.second_pass_commands();
    assert_eq!(seconds.len(), 3);
    for args in &seconds {
        let graph = value_after(args, "-filter_complex").unwrap();
        assert_eq!(graph, "[0:0]volume=5dB[norm0]");
    }

    let means: Vec<Option<f64>> = normalizer.stats().iter().map(|s| s.mean).collect();
    assert_eq!(means, vec![Some(-10.0), Some(-20.0), Some(-30.0)]);

    // -10 dB RMS with a -4 dB peak clips once raised by 5 dB
    let first = &normalizer.media_files()[0].audio_streams()[0];
    assert!(first
        .warnings()
        .iter()
        .any(|w| matches!(w, NormalizationWarning::Clipping { .. })));
}

#[tokio::test]
async fn test_conflicting_stream_selection_touches_nothing() {
    let engine = Arc::new(FakeEngine::default());
    let runner: Arc<dyn CommandRunner> = engine.clone();
    let config = NormalizerConfig {
        audio_streams: Some(vec![1]),
        audio_default_only: true,
        ..Default::default()
    };

    let result = Normalizer::with_runner(config, PathBuf::from("ffmpeg"), runner).await;
    assert!(matches!(result, Err(NormalizeError::Configuration(_))));
    assert!(engine.commands().is_empty());
}

#[tokio::test]
async fn test_missing_loudnorm_filter_rejects_ebu() {
    let engine = Arc::new(FakeEngine {
        no_loudnorm: true,
        ..Default::default()
    });
    let runner: Arc<dyn CommandRunner> = engine.clone();

    let result =
        Normalizer::with_runner(NormalizerConfig::default(), PathBuf::from("ffmpeg"), runner).await;
    assert!(matches!(result, Err(NormalizeError::Configuration(_))));
}

#[tokio::test]
async fn test_failed_second_pass_leaves_output_untouched() {
    let dir = TempDir::new().unwrap();
    let input = inputs(&dir, &["song.wav"]).remove(0);
    let output = dir.path().join("song-normalized.wav");
    std::fs::write(&output, b"previous").unwrap();

    let engine = Arc::new(FakeEngine {
        fail_second_pass: true,
        ..FakeEngine::default()
            .probe("song.wav", probe_log("song.wav", 1, false))
            .measurement("song.wav", 0, loudnorm_report(0, -18.0, 5.0, "linear"))
    });

    let mut normalizer = session(NormalizerConfig::default(), &engine).await;
    normalizer.add_media_file(&input, &output).await.unwrap();
    let err = normalizer.run_normalization().await.unwrap_err();
    assert!(matches!(err, NormalizeError::EngineExecution(_)));

    assert_eq!(std::fs::read(&output).unwrap(), b"previous");
    assert_eq!(normalizer.media_files()[0].state(), FileState::Failed);
    assert!(normalizer.stats().is_empty());

    let second = engine.second_pass_commands().remove(0);
    let scratch_target = PathBuf::from(second.last().unwrap());
    assert_ne!(scratch_target, output);
    assert!(!scratch_target.parent().unwrap().exists());
}

#[tokio::test]
async fn test_failure_in_one_of_many_files_continues() {
    let dir = TempDir::new().unwrap();
    let files = inputs(&dir, &["one.wav", "two.wav"]);

    let engine = Arc::new(FakeEngine {
        fail_second_pass: true,
        ..FakeEngine::default()
            .probe("one.wav", probe_log("one.wav", 1, false))
            .probe("two.wav", probe_log("two.wav", 1, false))
            .measurement("one.wav", 0, loudnorm_report(0, -18.0, 5.0, "linear"))
            .measurement("two.wav", 0, loudnorm_report(0, -19.0, 5.0, "linear"))
    });

    let mut normalizer = session(NormalizerConfig::default(), &engine).await;
    for input in &files {
        normalizer
            .add_media_file(input, input.with_extension("mkv"))
            .await
            .unwrap();
    }
    normalizer.run_normalization().await.unwrap();

    assert_eq!(engine.second_pass_commands().len(), 2);
    assert!(normalizer
        .media_files()
        .iter()
        .all(|f| f.state() == FileState::Failed));
    assert!(normalizer.stats().is_empty());
}

#[tokio::test]
async fn test_peak_normalization_to_zero() {
    let dir = TempDir::new().unwrap();
    let input = inputs(&dir, &["tone.wav"]).remove(0);
    let output = dir.path().join("tone-normalized.wav");

    let engine = Arc::new(
        FakeEngine::default()
            .probe("tone.wav", probe_log("tone.wav", 1, false))
            .measurement("tone.wav", 0, astats_log(-15.0, -3.0)),
    );
    let config = NormalizerConfig {
        normalization_type: NormalizationType::Peak,
        target_level: 0.0,
        ..Default::default()
    };

    let mut normalizer = session(config, &engine).await;
    normalizer.add_media_file(&input, &output).await.unwrap();
    normalizer.run_normalization().await.unwrap();

    let second = &engine.second_pass_commands()[0];
    assert_eq!(
        value_after(second, "-filter_complex").as_deref(),
        Some("[0:0]volume=3dB[norm0]")
    );
    assert_eq!(normalizer.stats()[0].max, Some(-3.0));
    assert!(normalizer.stats()[0].ebu_pass1.is_none());
    assert!(output.exists());
}

#[tokio::test]
async fn test_dry_run_measures_but_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = inputs(&dir, &["dry.wav"]).remove(0);
    let output = dir.path().join("dry.mkv");

    let engine = Arc::new(
        FakeEngine::default()
            .probe("dry.wav", probe_log("dry.wav", 1, false))
            .measurement("dry.wav", 0, loudnorm_report(0, -18.0, 5.0, "linear")),
    );
    let config = NormalizerConfig {
        dry_run: true,
        ..Default::default()
    };

    let mut normalizer = session(config, &engine).await;
    normalizer.add_media_file(&input, &output).await.unwrap();
    normalizer.run_normalization().await.unwrap();

    assert!(engine.second_pass_commands().is_empty());
    assert!(!output.exists());
    let stats = &normalizer.stats()[0];
    assert!(stats.ebu_pass1.is_some());
    assert!(stats.ebu_pass2.is_none());
}

#[tokio::test]
async fn test_lower_only_passes_quiet_stream_through() {
    let dir = TempDir::new().unwrap();
    let input = inputs(&dir, &["quiet.wav"]).remove(0);

    let engine = Arc::new(
        FakeEngine::default()
            .probe("quiet.wav", probe_log("quiet.wav", 1, false))
            .measurement("quiet.wav", 0, loudnorm_report(0, -30.0, 5.0, "linear")),
    );
    let config = NormalizerConfig {
        lower_only: true,
        ..Default::default()
    };

    let mut normalizer = session(config, &engine).await;
    normalizer
        .add_media_file(&input, dir.path().join("quiet.mkv"))
        .await
        .unwrap();
    normalizer.run_normalization().await.unwrap();

    let second = &engine.second_pass_commands()[0];
    assert_eq!(
        value_after(second, "-filter_complex").as_deref(),
        Some("[0:0]acopy[norm0]")
    );
    let stream = &normalizer.media_files()[0].audio_streams()[0];
    assert!(stream.statistics().ebu_pass2.is_none());
    assert!(stream
        .warnings()
        .iter()
        .any(|w| matches!(w, NormalizationWarning::AlreadyBelowTarget { .. })));
}

#[tokio::test]
async fn test_single_stream_container_keeps_first_audio_stream() {
    let dir = TempDir::new().unwrap();
    let input = inputs(&dir, &["multi.mkv"]).remove(0);

    let engine = Arc::new(FakeEngine::default().probe("multi.mkv", probe_log("multi.mkv", 3, true)));
    let mut normalizer = session(NormalizerConfig::default(), &engine).await;
    normalizer
        .add_media_file(&input, dir.path().join("multi.wav"))
        .await
        .unwrap();

    let media_file = &normalizer.media_files()[0];
    assert_eq!(media_file.output_ext(), "wav");
    assert_eq!(media_file.audio_streams().len(), 1);
    assert_eq!(media_file.audio_streams()[0].stream_id, 1);
    assert!(media_file.video_streams().is_empty());
}

#[tokio::test]
async fn test_input_without_audio_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = inputs(&dir, &["silent.mkv"]).remove(0);

    let engine = Arc::new(FakeEngine::default().probe("silent.mkv", probe_log("silent.mkv", 0, true)));
    let mut normalizer = session(NormalizerConfig::default(), &engine).await;
    let err = normalizer
        .add_media_file(&input, dir.path().join("out.mkv"))
        .await
        .unwrap_err();
    assert!(matches!(err, NormalizeError::NoAudioStream(_)));
    assert_eq!(normalizer.file_count(), 0);
}

#[tokio::test]
async fn test_pcm_output_extension_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = inputs(&dir, &["song.wav"]).remove(0);

    let engine = Arc::new(FakeEngine::default().probe("song.wav", probe_log("song.wav", 1, false)));
    let mut normalizer = session(NormalizerConfig::default(), &engine).await;
    let err = normalizer
        .add_media_file(&input, dir.path().join("song.mp3"))
        .await
        .unwrap_err();
    assert!(matches!(err, NormalizeError::Configuration(_)));
}

#[tokio::test]
async fn test_keep_original_audio_and_stale_tags() {
    let dir = TempDir::new().unwrap();
    let input = inputs(&dir, &["show.mkv"]).remove(0);

    let engine = Arc::new(
        FakeEngine::default()
            .probe("show.mkv", probe_log("show.mkv", 1, false))
            .measurement("show.mkv", 0, astats_log(-25.0, -8.0)),
    );
    let config = NormalizerConfig {
        normalization_type: NormalizationType::Rms,
        target_level: -20.0,
        keep_original_audio: true,
        audio_codec: Some("libvorbis".to_string()),
        audio_bitrate: Some("192k".to_string()),
        sample_rate: Some(48000),
        ..Default::default()
    };

    let mut normalizer = session(config, &engine).await;
    normalizer
        .add_media_file(&input, dir.path().join("show-normalized.mkv"))
        .await
        .unwrap();
    normalizer.run_normalization().await.unwrap();

    let second = &engine.second_pass_commands()[0];
    assert_eq!(value_after(second, "-c:a").as_deref(), Some("libvorbis"));
    assert_eq!(value_after(second, "-b").as_deref(), Some("192k"));
    assert_eq!(value_after(second, "-ar").as_deref(), Some("48000"));
    assert!(second
        .windows(4)
        .any(|w| w == ["-map", "0:0", "-c:a:1", "copy"]));
    assert!(second
        .windows(2)
        .any(|w| w == ["-map_metadata:s:a:1", "0:s:a:0"]));
    assert!(second
        .windows(2)
        .any(|w| w == ["-metadata", "REPLAYGAIN_TRACK_GAIN="]));
    assert!(second
        .windows(2)
        .any(|w| w == ["-metadata:s:a:0", "R128_TRACK_GAIN="]));
}

#[tokio::test]
async fn test_validate_input_files_reports_every_problem() {
    let dir = TempDir::new().unwrap();
    let files = inputs(&dir, &["good.wav", "video.mkv"]);

    let engine = Arc::new(
        FakeEngine::default()
            .probe("good.wav", probe_log("good.wav", 1, false))
            .probe("video.mkv", probe_log("video.mkv", 0, true)),
    );
    let normalizer = session(NormalizerConfig::default(), &engine).await;

    let mut paths = files.clone();
    paths.push(dir.path().join("missing.wav"));
    paths.push(dir.path().to_path_buf());

    let errors = normalizer.validate_input_files(&paths).await;
    assert_eq!(errors.len(), 3);
    assert!(errors[0].contains("video.mkv") && errors[0].contains("no audio"));
    assert!(errors[1].contains("missing.wav"));
    assert!(errors[2].contains("not a file"));
}

#[tokio::test]
async fn test_keep_other_audio_copies_unselected_streams() {
    let dir = TempDir::new().unwrap();
    let input = inputs(&dir, &["dub.mkv"]).remove(0);

    let engine = Arc::new(
        FakeEngine::default()
            .probe("dub.mkv", probe_log("dub.mkv", 2, true))
            .measurement("dub.mkv", 2, astats_log(-25.0, -8.0)),
    );
    let config = NormalizerConfig {
        normalization_type: NormalizationType::Rms,
        target_level: -20.0,
        audio_streams: Some(vec![2]),
        keep_other_audio: true,
        ..Default::default()
    };

    let mut normalizer = session(config, &engine).await;
    normalizer
        .add_media_file(&input, dir.path().join("dub-normalized.mkv"))
        .await
        .unwrap();
    normalizer.run_normalization().await.unwrap();

    let second = &engine.second_pass_commands()[0];
    assert_eq!(
        value_after(second, "-filter_complex").as_deref(),
        Some("[0:2]volume=5dB[norm2]")
    );
    assert!(second
        .windows(4)
        .any(|w| w == ["-map", "[norm2]", "-c:a:0", "pcm_s16le"]));
    assert!(second
        .windows(4)
        .any(|w| w == ["-map", "0:1", "-c:a:1", "copy"]));
    assert!(second
        .windows(2)
        .any(|w| w == ["-map_metadata:s:a:0", "0:s:a:1"]));
    assert!(second
        .windows(2)
        .any(|w| w == ["-map_metadata:s:a:1", "0:s:a:0"]));
    // Copied streams keep their tags
    assert!(!second
        .windows(2)
        .any(|w| w[0] == "-metadata:s:a:1"));
    assert_eq!(normalizer.stats().len(), 1);
    assert_eq!(normalizer.stats()[0].stream_id, 2);
}

#[tokio::test]
async fn test_batch_skips_file_whose_analysis_failed() {
    let dir = TempDir::new().unwrap();
    let names = ["good.wav", "broken.wav"];
    let files = inputs(&dir, &names);

    // No measurement log for broken.wav, so its first pass cannot be parsed
    let engine = Arc::new(
        FakeEngine::default()
            .probe("good.wav", probe_log("good.wav", 1, false))
            .probe("broken.wav", probe_log("broken.wav", 1, false))
            .measurement("good.wav", 0, astats_log(-20.0, -9.0)),
    );
    let config = NormalizerConfig {
        normalization_type: NormalizationType::Rms,
        target_level: -15.0,
        batch: true,
        ..Default::default()
    };

    let mut normalizer = session(config, &engine).await;
    for input in &files {
        normalizer
            .add_media_file(input, input.with_extension("mkv"))
            .await
            .unwrap();
    }
    normalizer.run_normalization().await.unwrap();

    let states: Vec<FileState> = normalizer.media_files().iter().map(|f| f.state()).collect();
    assert_eq!(states, vec![FileState::Done, FileState::Skipped]);
    assert_eq!(normalizer.stats().len(), 1);

    let seconds = engine.second_pass_commands();
    assert_eq!(seconds.len(), 1);
    assert_eq!(
        value_after(&seconds[0], "-filter_complex").as_deref(),
        Some("[0:0]volume=5dB[norm0]")
    );
    assert!(!files[1].with_extension("mkv").exists());
}

#[tokio::test]
async fn test_second_pass_reports_skip_passthrough_streams() {
    let dir = TempDir::new().unwrap();
    let input = inputs(&dir, &["mixed.mkv"]).remove(0);

    let engine = Arc::new(
        FakeEngine::default()
            .probe("mixed.mkv", probe_log("mixed.mkv", 2, false))
            .measurement("mixed.mkv", 0, loudnorm_report(0, -30.0, 5.0, "linear"))
            .measurement("mixed.mkv", 1, loudnorm_report(0, -14.0, 5.0, "linear"))
            // acopy is filter 0 of the graph, loudnorm filter 1
            .second_pass(loudnorm_report(1, -14.0, 5.0, "linear")),
    );
    let config = NormalizerConfig {
        lower_only: true,
        ..Default::default()
    };

    let mut normalizer = session(config, &engine).await;
    normalizer
        .add_media_file(&input, dir.path().join("mixed-normalized.mkv"))
        .await
        .unwrap();
    normalizer.run_normalization().await.unwrap();

    let graph = value_after(&engine.second_pass_commands()[0], "-filter_complex").unwrap();
    assert!(graph.starts_with("[0:0]acopy[norm0];[0:1]loudnorm="));

    let streams = normalizer.media_files()[0].audio_streams();
    assert!(streams[0].statistics().ebu_pass2.is_none());
    let pass2 = streams[1].statistics().ebu_pass2.as_ref().unwrap();
    assert_eq!(pass2.input_i, -14.0);
}

#[tokio::test]
async fn test_replaygain_prefers_second_pass_statistics() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("track.mp3");
    write_mp3(&input);
    let output = dir.path().join("track.mkv");

    let engine = Arc::new(
        FakeEngine::default()
            .probe("track.mp3", mp3_probe_log("track.mp3"))
            .measurement("track.mp3", 0, loudnorm_report(0, -18.0, 5.0, "linear"))
            .second_pass(loudnorm_report(0, -20.0, 5.0, "linear")),
    );
    let config = NormalizerConfig {
        replaygain: true,
        ..Default::default()
    };

    let mut normalizer = session(config, &engine).await;
    normalizer.add_media_file(&input, &output).await.unwrap();
    normalizer.run_normalization().await.unwrap();

    // -23 target against the -20 LUFS second pass, not the -18 first pass
    let (gain, peak) = track_gain_tags(&input);
    assert_eq!(gain.as_deref(), Some("-3.00 dB"));
    assert_eq!(peak.as_deref(), Some("0.630957"));

    assert!(!output.exists());
    let second = engine.second_pass_commands().remove(0);
    let scratch_target = PathBuf::from(second.last().unwrap());
    assert!(!scratch_target.parent().unwrap().exists());
    assert_eq!(normalizer.media_files()[0].state(), FileState::Done);
}

#[tokio::test]
async fn test_replaygain_falls_back_to_first_pass() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("fallback.mp3");
    write_mp3(&input);
    let output = dir.path().join("fallback.mkv");

    // The adjustment pass prints no loudnorm report
    let engine = Arc::new(
        FakeEngine::default()
            .probe("fallback.mp3", mp3_probe_log("fallback.mp3"))
            .measurement("fallback.mp3", 0, loudnorm_report(0, -18.0, 5.0, "linear")),
    );
    let config = NormalizerConfig {
        replaygain: true,
        ..Default::default()
    };

    let mut normalizer = session(config, &engine).await;
    normalizer.add_media_file(&input, &output).await.unwrap();
    normalizer.run_normalization().await.unwrap();

    let (gain, _) = track_gain_tags(&input);
    assert_eq!(gain.as_deref(), Some("-5.00 dB"));
    assert!(normalizer.stats()[0].ebu_pass2.is_none());
    assert!(!output.exists());
}

#[tokio::test]
async fn test_replaygain_unsupported_format_leaves_input_alone() {
    let dir = TempDir::new().unwrap();
    let input = inputs(&dir, &["song.wav"]).remove(0);
    let output = dir.path().join("song.mkv");

    let engine = Arc::new(
        FakeEngine::default()
            .probe("song.wav", probe_log("song.wav", 1, false))
            .measurement("song.wav", 0, loudnorm_report(0, -18.0, 5.0, "linear"))
            .second_pass(loudnorm_report(0, -20.0, 5.0, "linear")),
    );
    let config = NormalizerConfig {
        replaygain: true,
        ..Default::default()
    };

    let mut normalizer = session(config, &engine).await;
    normalizer.add_media_file(&input, &output).await.unwrap();
    normalizer.run_normalization().await.unwrap();

    assert_eq!(std::fs::read(&input).unwrap(), b"input");
    assert!(!output.exists());
    assert_eq!(normalizer.media_files()[0].state(), FileState::Done);
    assert_eq!(normalizer.stats().len(), 1);
}
