//! Shared state of a normalization session

use crate::config::NormalizerConfig;
use soul_ffmpeg::{CommandRunner, EngineCommand};
use soul_loudness::NormalizationStrategy;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a media file needs from its session
///
/// Cloning is cheap; all fields are shared.
#[derive(Clone)]
pub struct SessionContext {
    pub config: Arc<NormalizerConfig>,
    pub strategy: Arc<dyn NormalizationStrategy>,
    pub runner: Arc<dyn CommandRunner>,
    pub ffmpeg: PathBuf,
}

impl SessionContext {
    pub fn new(config: NormalizerConfig, ffmpeg: PathBuf, runner: Arc<dyn CommandRunner>) -> Self {
        let strategy: Arc<dyn NormalizationStrategy> = Arc::from(
            config
                .normalization_type
                .strategy(config.target_parameters()),
        );
        Self {
            config: Arc::new(config),
            strategy,
            runner,
            ffmpeg,
        }
    }

    /// A fresh engine command
    pub fn command(&self) -> EngineCommand {
        EngineCommand::new(&self.ffmpeg)
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("config", &self.config)
            .field("strategy", &self.strategy)
            .field("ffmpeg", &self.ffmpeg)
            .finish_non_exhaustive()
    }
}
