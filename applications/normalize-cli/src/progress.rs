//! Progress bars for the terminal

use indicatif::{ProgressBar, ProgressStyle};
use soul_normalize::ProgressReporter;
use std::path::Path;

const TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}";

/// One bar per engine pass, labelled with the file it belongs to
#[derive(Default)]
pub struct BarReporter {
    file_label: String,
    bar: Option<ProgressBar>,
}

impl BarReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
    }
}

impl ProgressReporter for BarReporter {
    fn file_started(&mut self, index: usize, total: usize, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.file_label = format!("File {}/{} ({})", index + 1, total, name);
    }

    fn task_started(&mut self, name: &str) {
        let bar = ProgressBar::new(100);
        bar.set_style(Self::style());
        bar.set_message(format!("{}: {}", self.file_label, name));
        self.bar = Some(bar);
    }

    fn task_progress(&mut self, percent: f32) {
        if let Some(bar) = &self.bar {
            bar.set_position(percent.clamp(0.0, 100.0).round() as u64);
        }
    }

    fn task_finished(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}
