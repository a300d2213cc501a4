//! Layered configuration: TOML file, then environment, then command line

use anyhow::Context;
use config::{Config, Environment, File, FileFormat, Value};
use soul_normalize::NormalizerConfig;
use std::path::Path;

/// Prefix of configuration environment variables, e.g. `SOUL_NORMALIZE_TARGET_LEVEL`
pub const ENV_PREFIX: &str = "SOUL_NORMALIZE";

/// Build the session configuration
///
/// Later sources win: the optional TOML file, then `SOUL_NORMALIZE_*`
/// variables, then options given on the command line.
pub fn load(
    file: Option<&Path>,
    overrides: Vec<(&'static str, Value)>,
) -> anyhow::Result<NormalizerConfig> {
    let mut settings = Config::builder();

    if let Some(path) = file {
        if !path.is_file() {
            anyhow::bail!("Configuration file {} does not exist", path.display());
        }
        settings = settings.add_source(File::from(path).format(FileFormat::Toml));
    }

    settings = settings.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("audio_streams")
            .with_list_parse_key("extra_input_options")
            .with_list_parse_key("extra_output_options"),
    );

    for (key, value) in overrides {
        settings = settings
            .set_override(key, value)
            .with_context(|| format!("Invalid value for {}", key))?;
    }

    let config: NormalizerConfig = settings
        .build()
        .context("Could not load configuration")?
        .try_deserialize()
        .context("Invalid configuration")?;

    config.validate()?;
    Ok(config)
}
