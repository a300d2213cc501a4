/// Soul Normalize - loudness normalization of media files through ffmpeg
mod cli;
mod progress;
mod settings;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use progress::BarReporter;
use soul_normalize::{Normalizer, NormalizerConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    run(cli).await
}

fn init_tracing(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    let default_filter = format!(
        "soul_normalize={level},soul_ffmpeg={level},soul_loudness={level}",
        level = level
    );

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Output path for every input
fn output_paths(cli: &Cli, config: &NormalizerConfig) -> anyhow::Result<Vec<PathBuf>> {
    if !cli.output.is_empty() {
        if cli.output.len() != cli.inputs.len() {
            anyhow::bail!(
                "Number of output files ({}) does not match number of input files ({})",
                cli.output.len(),
                cli.inputs.len()
            );
        }
        return Ok(cli.output.clone());
    }

    Ok(cli
        .inputs
        .iter()
        .map(|input| folder_output(&cli.output_folder, input, &config.extension))
        .collect())
}

fn folder_output(folder: &Path, input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    folder.join(format!("{}.{}", stem, extension))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = settings::load(cli.config.as_deref(), cli.overrides()?)?;
    let outputs = output_paths(&cli, &config)?;
    let replaygain = config.replaygain;
    let dry_run = config.dry_run;

    let mut normalizer = Normalizer::new(config).await?;
    if cli.progress {
        normalizer = normalizer.with_progress(Box::new(BarReporter::new()));
    }

    let errors = normalizer.validate_input_files(&cli.inputs).await;
    if !errors.is_empty() {
        for error in &errors {
            tracing::error!("{}", error);
        }
        anyhow::bail!("{} input file(s) failed validation", errors.len());
    }

    if cli.output.is_empty() && !dry_run && !cli.output_folder.exists() {
        tracing::warn!(
            "Output directory '{}' does not exist, will create",
            cli.output_folder.display()
        );
        tokio::fs::create_dir_all(&cli.output_folder)
            .await
            .with_context(|| format!("Could not create {}", cli.output_folder.display()))?;
    }

    for (input, output) in cli.inputs.iter().zip(&outputs) {
        if output.exists() && !cli.force && !replaygain {
            tracing::error!(
                "Output file {} already exists, skipping. Use -f to force overwriting.",
                output.display()
            );
            continue;
        }

        normalizer
            .add_media_file(input, output)
            .await
            .with_context(|| format!("Could not add {}", input.display()))?;
    }

    normalizer.run_normalization().await?;

    if cli.print_stats {
        println!("{}", serde_json::to_string_pretty(normalizer.stats())?);
    }

    Ok(())
}
