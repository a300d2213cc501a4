//! Normalization session
//!
//! A [`Normalizer`] owns the configuration, the media files added to it and
//! the statistics of every file that completed. Files are processed one
//! after the other, either each on its own or, in batch mode, in three
//! phases sharing one reference level.

use crate::config::{NormalizerConfig, PCM_INCOMPATIBLE_EXTS};
use crate::context::SessionContext;
use crate::error::{NormalizeError, Result};
use crate::media_file::{output_extension, FileState, MediaFile};
use crate::progress::{ProgressReporter, SilentProgress};
use crate::stream::StreamStatistics;
use soul_ffmpeg::{
    has_loudnorm, locate_ffmpeg, parse_probe_output, probe_command, CommandRunner, FfmpegRunner,
};
use soul_loudness::NormalizationType;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Mean of the measured levels, ignoring streams without a finite measurement
///
/// Returns `None` when nothing was measured.
pub fn batch_reference(levels: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let measured: Vec<f64> = levels
        .into_iter()
        .flatten()
        .filter(|level| level.is_finite())
        .collect();

    if measured.is_empty() {
        warn!("No measurements available for batch normalization, normalizing each file on its own");
        return None;
    }

    let reference = measured.iter().sum::<f64>() / measured.len() as f64;
    info!(
        "Batch reference level {:.2} from {} streams",
        reference,
        measured.len()
    );
    Some(reference)
}

pub struct Normalizer {
    ctx: SessionContext,
    media_files: Vec<MediaFile>,
    stats: Vec<StreamStatistics>,
    reporter: Box<dyn ProgressReporter>,
}

impl Normalizer {
    /// Create a session running the `ffmpeg` found on this system
    pub async fn new(config: NormalizerConfig) -> Result<Self> {
        let ffmpeg = locate_ffmpeg()?;
        debug!("Using ffmpeg at {}", ffmpeg.display());
        Self::with_runner(config, ffmpeg, Arc::new(FfmpegRunner::new())).await
    }

    /// Create a session on top of a custom command runner
    pub async fn with_runner(
        config: NormalizerConfig,
        ffmpeg: PathBuf,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        config.validate()?;

        if config.normalization_type == NormalizationType::Ebu
            && !has_loudnorm(runner.as_ref(), &ffmpeg).await?
        {
            return Err(NormalizeError::Configuration(
                "ffmpeg does not support the loudnorm filter required for EBU normalization"
                    .to_string(),
            ));
        }

        Ok(Self {
            ctx: SessionContext::new(config, ffmpeg, runner),
            media_files: Vec::new(),
            stats: Vec::new(),
            reporter: Box::new(SilentProgress),
        })
    }

    /// Report progress to `reporter` instead of discarding it
    pub fn with_progress(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.ctx.config
    }

    /// Check every input up front, returning one message per invalid file
    pub async fn validate_input_files(&self, paths: &[PathBuf]) -> Vec<String> {
        let mut errors = Vec::new();

        for path in paths {
            if !path.exists() {
                errors.push(format!("{}: file does not exist", path.display()));
                continue;
            }
            if !path.is_file() {
                errors.push(format!("{}: not a file", path.display()));
                continue;
            }

            let cmd = probe_command(&self.ctx.ffmpeg, path);
            match self.ctx.runner.run(&cmd).await {
                Ok(output) => {
                    if parse_probe_output(&output).audio().next().is_none() {
                        errors.push(format!("{}: no audio streams found", path.display()));
                    }
                }
                Err(e) => errors.push(format!("{}: could not be probed: {}", path.display(), e)),
            }
        }

        errors
    }

    /// Add an input/output pair to the session
    ///
    /// Checks the input and the output container, then probes the input.
    pub async fn add_media_file(
        &mut self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<()> {
        let input = input.as_ref();
        let output = output.as_ref();

        if !input.is_file() {
            return Err(NormalizeError::Configuration(format!(
                "Input file {} does not exist",
                input.display()
            )));
        }

        let ext = output_extension(output, &self.ctx.config.extension);
        if self.ctx.config.is_pcm_audio() && PCM_INCOMPATIBLE_EXTS.contains(&ext.as_str()) {
            return Err(NormalizeError::Configuration(format!(
                "Output extension {} does not support PCM audio. \
                 Please choose a suitable audio codec with the -c:a option.",
                ext
            )));
        }

        let media_file = MediaFile::discover(self.ctx.clone(), input, output).await?;
        self.media_files.push(media_file);
        Ok(())
    }

    pub fn media_files(&self) -> &[MediaFile] {
        &self.media_files
    }

    pub fn file_count(&self) -> usize {
        self.media_files.len()
    }

    /// Statistics of every stream of every completed file
    pub fn stats(&self) -> &[StreamStatistics] {
        &self.stats
    }

    /// Normalize every added file
    ///
    /// A failing file is logged and skipped, unless it is the only file in
    /// the session, in which case its error is returned.
    pub async fn run_normalization(&mut self) -> Result<()> {
        if self.ctx.config.batch {
            self.run_batch().await
        } else {
            self.run_per_file().await
        }
    }

    async fn run_per_file(&mut self) -> Result<()> {
        let total = self.media_files.len();
        let reporter = self.reporter.as_mut();

        for (index, media_file) in self.media_files.iter_mut().enumerate() {
            reporter.file_started(index, total, media_file.input_file());

            let result = match media_file.first_pass(reporter).await {
                Ok(()) => media_file.second_pass(None, reporter).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => self.stats.extend(media_file.stats()),
                Err(e) => {
                    media_file.set_state(FileState::Failed);
                    if total == 1 {
                        return Err(e);
                    }
                    error!(
                        "Error processing input file {}: {}",
                        media_file.input_file().display(),
                        e
                    );
                }
            }
        }

        info!("Normalization complete");
        Ok(())
    }

    async fn run_batch(&mut self) -> Result<()> {
        let total = self.media_files.len();
        let strategy = Arc::clone(&self.ctx.strategy);
        let reporter = self.reporter.as_mut();

        if strategy.normalization_type() == NormalizationType::Ebu {
            warn!(
                "Batch mode with EBU normalization may change the relative loudness of files. \
                 Consider rms or peak normalization to preserve it exactly."
            );
        }

        // Phase 1: measure everything before adjusting anything
        if strategy.requires_first_pass() {
            for (index, media_file) in self.media_files.iter_mut().enumerate() {
                reporter.file_started(index, total, media_file.input_file());
                match media_file.first_pass(reporter).await {
                    Ok(()) => media_file.set_state(FileState::BatchPending),
                    Err(e) => {
                        media_file.set_state(FileState::Skipped);
                        if total == 1 {
                            return Err(e);
                        }
                        error!(
                            "Analysis of {} failed, skipping it: {}",
                            media_file.input_file().display(),
                            e
                        );
                    }
                }
            }
        } else {
            warn!("Dynamic EBU mode does not measure files first, batch reference is not used");
            for media_file in &mut self.media_files {
                media_file.set_state(FileState::BatchPending);
            }
        }

        // Phase 2: one reference for all files
        let reference = if strategy.requires_first_pass() {
            batch_reference(
                self.media_files
                    .iter()
                    .filter(|f| f.state() == FileState::BatchPending)
                    .flat_map(|f| f.measured_levels()),
            )
        } else {
            None
        };

        // Phase 3: adjust against the shared reference
        for (index, media_file) in self.media_files.iter_mut().enumerate() {
            if media_file.state() != FileState::BatchPending {
                continue;
            }
            reporter.file_started(index, total, media_file.input_file());
            match media_file.second_pass(reference, reporter).await {
                Ok(()) => self.stats.extend(media_file.stats()),
                Err(e) => {
                    media_file.set_state(FileState::Failed);
                    if total == 1 {
                        return Err(e);
                    }
                    error!(
                        "Error processing input file {}: {}",
                        media_file.input_file().display(),
                        e
                    );
                }
            }
        }

        info!("Batch normalization complete");
        Ok(())
    }
}
