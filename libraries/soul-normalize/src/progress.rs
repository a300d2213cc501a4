//! Progress reporting hooks
//!
//! The library only emits events; rendering (bars, percentages) is left to
//! the application.

use std::path::Path;

/// Receives progress events from a normalization run
///
/// All methods default to doing nothing.
pub trait ProgressReporter: Send {
    /// A file is about to be processed (`index` is zero-based)
    fn file_started(&mut self, _index: usize, _total: usize, _path: &Path) {}

    /// A named engine pass started, e.g. "Stream 1/2: measuring"
    fn task_started(&mut self, _name: &str) {}

    /// Percentage of the current pass, in `[0, 100]`
    fn task_progress(&mut self, _percent: f32) {}

    fn task_finished(&mut self) {}
}

/// Reporter that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {}
