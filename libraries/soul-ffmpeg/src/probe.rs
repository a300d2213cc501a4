//! Stream discovery from the engine's input banner
//!
//! The probe is a zero-length stream copy to the null muxer. The interesting
//! part is the banner ffmpeg prints for the input:
//!
//! ```text
//! Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'test.mp4':
//!   Duration: 00:00:10.01, start: 0.000000, bitrate: 1025 kb/s
//!   Stream #0:0[0x1](und): Video: h264 (High) (avc1 / 0x31637661), yuv420p, 320x240, 25 fps (default)
//!   Stream #0:1[0x2](eng): Audio: aac (LC) (mp4a / 0x6134706D), 44100 Hz, stereo, fltp, 128 kb/s (default)
//! ```

use crate::command::{null_device, EngineCommand};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, warn};

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Duration: (\d{2}):(\d{2}):(\d{2})\.(\d{2})").expect("valid duration regex")
});
static STREAM_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#0:(\d+)").expect("valid stream id regex"));
static SAMPLE_RATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) Hz").expect("valid sample rate regex"));
static BIT_DEPTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[sfu](\d+)(p|le|be)?").expect("valid bit depth regex"));
static CODEC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:Audio|Video|Subtitle): ([A-Za-z0-9_\-]+)").expect("valid codec regex")
});

/// Kind of a discovered stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Audio,
    Video,
    Subtitle,
}

impl StreamKind {
    /// Stream specifier letter used in `-map_metadata:s:<x>` style options
    pub fn specifier(&self) -> char {
        match self {
            Self::Audio => 'a',
            Self::Video => 'v',
            Self::Subtitle => 's',
        }
    }
}

/// One stream line from the probe banner
#[derive(Debug, Clone, PartialEq)]
pub struct ProbedStream {
    /// Absolute stream index in the input (`#0:<index>`)
    pub index: usize,
    /// Position among input streams of the same kind (`0:a:<n>`)
    pub kind_index: usize,
    pub kind: StreamKind,
    pub codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub bit_depth: Option<u32>,
    /// Whether the stream carries the `default` disposition
    pub is_default: bool,
}

/// Everything the probe tells us about an input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    /// Duration in seconds
    pub duration: Option<f64>,
    /// Streams in discovery order
    pub streams: Vec<ProbedStream>,
}

impl ProbeReport {
    pub fn audio(&self) -> impl Iterator<Item = &ProbedStream> {
        self.of_kind(StreamKind::Audio)
    }

    pub fn of_kind(&self, kind: StreamKind) -> impl Iterator<Item = &ProbedStream> {
        self.streams.iter().filter(move |s| s.kind == kind)
    }
}

/// Build the stream discovery command
pub fn probe_command(ffmpeg: &Path, input: &Path) -> EngineCommand {
    let mut cmd = EngineCommand::new(ffmpeg);
    cmd.arg("-i")
        .arg(input)
        .args(["-c", "copy", "-t", "0", "-map", "0", "-f", "null"])
        .arg(null_device());
    cmd
}

/// Parse `Duration: HH:MM:SS.CC` into seconds
pub fn parse_duration(line: &str) -> Option<f64> {
    let caps = DURATION_RE.captures(line)?;
    let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
    let (h, m, s, cs) = (field(1)?, field(2)?, field(3)?, field(4)?);
    Some((h * 3600 + m * 60 + s) as f64 + cs as f64 / 100.0)
}

/// Parse the probe log
///
/// Only the input section is considered; stream lines of the output section
/// repeat the same indices and are ignored.
pub fn parse_probe_output(output: &str) -> ProbeReport {
    let mut report = ProbeReport::default();

    for line in output.lines().map(str::trim) {
        if line.starts_with("Output #") {
            break;
        }

        if line.contains("Duration") {
            match parse_duration(line) {
                Some(duration) => {
                    debug!("Found duration: {} s", duration);
                    report.duration = Some(duration);
                }
                None => warn!("Could not extract duration from input file!"),
            }
        }

        if !line.starts_with("Stream") {
            continue;
        }

        let Some(index) = STREAM_ID_RE
            .captures(line)
            .and_then(|c| c[1].parse::<usize>().ok())
        else {
            continue;
        };
        if report.streams.iter().any(|s| s.index == index) {
            continue;
        }

        let kind = if line.contains("Audio") {
            StreamKind::Audio
        } else if line.contains("Video") {
            StreamKind::Video
        } else if line.contains("Subtitle") {
            StreamKind::Subtitle
        } else {
            continue;
        };

        let (sample_rate, bit_depth) = if kind == StreamKind::Audio {
            let sample_rate = SAMPLE_RATE_RE
                .captures(line)
                .and_then(|c| c[1].parse::<u32>().ok());
            let bit_depth = BIT_DEPTH_RE
                .captures(line)
                .and_then(|c| c[1].parse::<u32>().ok());
            (sample_rate, bit_depth)
        } else {
            (None, None)
        };

        let kind_index = report.of_kind(kind).count();
        debug!("Found {:?} stream at index {}", kind, index);

        report.streams.push(ProbedStream {
            index,
            kind_index,
            kind,
            codec: CODEC_RE.captures(line).map(|c| c[1].to_string()),
            sample_rate,
            bit_depth,
            is_default: line.contains("(default)"),
        });
    }

    report
}
