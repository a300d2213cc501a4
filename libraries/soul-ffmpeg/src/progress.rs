//! Progress reporting from the engine's `-progress` key/value stream

/// Keys that only ever appear in progress or stats output
const PROGRESS_KEYS: [&str; 9] = [
    "bitrate=",
    "total_size=",
    "out_time_us=",
    "out_time_ms=",
    "out_time=",
    "dup_frames=",
    "drop_frames=",
    "speed=",
    "progress=",
];

/// Remove progress lines from captured engine output
pub fn prune_progress_lines(output: &str) -> String {
    output
        .lines()
        .filter(|line| !PROGRESS_KEYS.iter().any(|key| line.contains(key)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One parsed line of `-progress` output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressLine {
    /// Output time reached so far, in seconds
    OutTime(f64),
    /// The engine reported `progress=end`
    End,
}

/// Parse a `-progress` key/value line
///
/// Both `out_time_us` and `out_time_ms` carry microseconds.
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => value
            .trim()
            .parse::<i64>()
            .ok()
            .map(|us| ProgressLine::OutTime(us.max(0) as f64 / 1_000_000.0)),
        "progress" if value.trim() == "end" => Some(ProgressLine::End),
        _ => None,
    }
}

/// Turns progress lines into a monotonic percentage sequence ending at 100
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    duration: Option<f64>,
    last: f32,
}

impl ProgressTracker {
    /// Create a tracker for a source of the given duration (seconds)
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            duration: duration.filter(|d| *d > 0.0),
            last: 0.0,
        }
    }

    /// Feed one line; returns a new percentage when it advanced
    pub fn update(&mut self, line: &str) -> Option<f32> {
        let percent = match parse_progress_line(line)? {
            ProgressLine::End => 100.0,
            ProgressLine::OutTime(seconds) => {
                let duration = self.duration?;
                ((seconds / duration) * 100.0).clamp(0.0, 100.0) as f32
            }
        };

        if percent > self.last {
            self.last = percent;
            Some(percent)
        } else {
            None
        }
    }

    /// Final value; `Some(100.0)` unless 100 was already reported
    pub fn finish(&mut self) -> Option<f32> {
        if self.last < 100.0 {
            self.last = 100.0;
            Some(100.0)
        } else {
            None
        }
    }
}
