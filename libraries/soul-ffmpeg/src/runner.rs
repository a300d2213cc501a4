//! Running engine commands
//!
//! [`CommandRunner`] is the seam between orchestration code and the external
//! engine. [`FfmpegRunner`] spawns real processes; tests substitute scripted
//! runners that return canned logs.

use crate::command::EngineCommand;
use crate::error::{FfmpegError, Result};
use crate::progress::{prune_progress_lines, ProgressTracker};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, enabled, Level};

/// Progress callback, receives percentages in `[0, 100]`
pub type ProgressFn<'a> = &'a mut (dyn FnMut(f32) + Send);

/// Executes engine commands
///
/// Implementors provide [`execute`](Self::execute) and
/// [`execute_with_progress`](Self::execute_with_progress); callers use
/// [`run`](Self::run) and [`run_with_progress`](Self::run_with_progress),
/// which add dry-run handling and logging on top.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, returning stdout followed by stderr
    async fn execute(&self, command: &EngineCommand) -> Result<String>;

    /// Run to completion while reporting progress, returning stderr
    ///
    /// `duration` is the length of the source in seconds, used to turn the
    /// engine's output time into a percentage.
    async fn execute_with_progress(
        &self,
        command: &EngineCommand,
        duration: Option<f64>,
        on_progress: ProgressFn<'_>,
    ) -> Result<String>;

    /// Run a command and capture its combined output
    ///
    /// Dry commands are logged and return an empty string.
    async fn run(&self, command: &EngineCommand) -> Result<String> {
        debug!("Running command: {}", command);
        if command.is_dry() {
            debug!("Dry mode specified, not actually running command");
            return Ok(String::new());
        }
        self.execute(command).await
    }

    /// Run a long transcode, reporting progress
    ///
    /// The last reported value is always 100, also for dry commands.
    async fn run_with_progress(
        &self,
        command: &EngineCommand,
        duration: Option<f64>,
        on_progress: ProgressFn<'_>,
    ) -> Result<String> {
        debug!("Running command: {}", command);
        if command.is_dry() {
            debug!("Dry mode specified, not actually running command");
            on_progress(100.0);
            return Ok(String::new());
        }

        let mut last = 0.0_f32;
        let output = {
            let mut track = |percent: f32| {
                last = percent;
                on_progress(percent);
            };
            self.execute_with_progress(command, duration, &mut track)
                .await?
        };
        if last < 100.0 {
            on_progress(100.0);
        }

        if enabled!(Level::DEBUG) {
            debug!("ffmpeg output: {}", prune_progress_lines(&output));
        }
        Ok(output)
    }
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner;

impl FfmpegRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(command: &EngineCommand) -> Command {
        let mut cmd = Command::new(command.program());
        cmd.args(command.get_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(command: &EngineCommand, source: std::io::Error) -> FfmpegError {
        FfmpegError::Spawn {
            command: command.to_shell_string(),
            source,
        }
    }
}

#[async_trait]
impl CommandRunner for FfmpegRunner {
    async fn execute(&self, command: &EngineCommand) -> Result<String> {
        let output = Self::command(command)
            .output()
            .await
            .map_err(|e| Self::spawn_error(command, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(FfmpegError::Execution {
                command: command.to_shell_string(),
                stderr: stderr.into_owned(),
            });
        }

        Ok(format!("{}{}", stdout, stderr))
    }

    async fn execute_with_progress(
        &self,
        command: &EngineCommand,
        duration: Option<f64>,
        on_progress: ProgressFn<'_>,
    ) -> Result<String> {
        // Progress goes to stdout as key=value lines, logs stay on stderr
        let mut with_progress = EngineCommand::new(command.program());
        with_progress
            .args(["-progress", "pipe:1", "-nostats"])
            .args(command.get_args());

        let mut child = Self::command(&with_progress)
            .spawn()
            .map_err(|e| Self::spawn_error(command, e))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            Self::spawn_error(command, std::io::Error::other("stdout not captured"))
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            Self::spawn_error(command, std::io::Error::other("stderr not captured"))
        })?;

        // Drain stderr concurrently so the engine never blocks on a full pipe
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).await.map(|_| buf)
        });

        let mut tracker = ProgressTracker::new(duration);
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(percent) = tracker.update(&line) {
                on_progress(percent);
            }
        }

        let status = child.wait().await?;
        let stderr_bytes = stderr_task
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))??;
        let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();

        if !status.success() {
            return Err(FfmpegError::Execution {
                command: command.to_shell_string(),
                stderr,
            });
        }

        if let Some(percent) = tracker.finish() {
            on_progress(percent);
        }

        Ok(stderr)
    }
}
