//! CLI flag definitions and dispatch.

use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use tracing::info;

use crate::pipeline::{PipelineKind, PipelineRunner, RunOptions, Settings};

/// Runs the crawling, feature engineering and dataset generation pipelines.
#[derive(Parser, Debug)]
#[command(name = "llm-engineering")]
#[command(about = "Run the LLM twin data pipelines")]
#[command(version)]
#[command(
    long_about = "Runs the selected data pipelines in order: ETL, feature engineering, then instruction dataset generation.\n\nEach pipeline reads its parameters from <root-dir>/configs/<pipeline>.yaml.\n\nExample usage:\n  llm-engineering --run-etl --run-feature-engineering --no-cache"
)]
pub struct Cli {
    /// Disable caching of step outputs.
    #[arg(long)]
    pub no_cache: bool,

    /// Run the digital data ETL pipeline.
    #[arg(long)]
    pub run_etl: bool,

    /// Run the feature engineering pipeline.
    #[arg(long)]
    pub run_feature_engineering: bool,

    /// Run the instruction dataset generation pipeline.
    #[arg(long)]
    pub run_create_dataset: bool,

    /// Project root holding the configs/ directory.
    #[arg(long, default_value = ".")]
    pub root_dir: PathBuf,

    /// Warehouse URL (SQLite URL or path, or "memory").
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Directory for run records, outputs and the step cache.
    #[arg(long, env = "ARTIFACT_PATH")]
    pub artifact_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

impl Cli {
    /// Selected pipelines in execution order.
    pub fn selected_pipelines(&self) -> Vec<PipelineKind> {
        PipelineKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                PipelineKind::DigitalDataEtl => self.run_etl,
                PipelineKind::FeatureEngineering => self.run_feature_engineering,
                PipelineKind::GenerateInstructDatasets => self.run_create_dataset,
            })
            .collect()
    }

    /// Environment settings with CLI overrides applied.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = Settings::from_env()?;
        if let Some(url) = &self.database_url {
            settings = settings.with_database_url(url.clone());
        }
        if let Some(path) = &self.artifact_path {
            settings = settings.with_artifact_path(path.clone());
        }
        settings.validate()?;
        Ok(settings)
    }
}

/// Parse CLI arguments without running any command.
///
/// Use this when you need to access CLI arguments (like log_level) before
/// running the command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI arguments and run the selected pipelines.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the selected pipelines with the parsed arguments.
///
/// Pipelines run one after another; the first failure stops the rest.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let pipelines = cli.selected_pipelines();
    if pipelines.is_empty() {
        bail!("Please specify a pipeline to run.");
    }

    let enable_cache = !cli.no_cache;
    let runner = PipelineRunner::connect(cli.settings()?).await?;

    for kind in pipelines {
        let options = RunOptions::for_pipeline(kind, &cli.root_dir, enable_cache);
        let record = runner.run(kind, &options).await?;

        info!(
            pipeline = %kind,
            run = %record.run_name,
            steps = record.steps.len(),
            "Pipeline finished"
        );
        println!("{}: {} ({})", kind, record.status, record.run_name);
    }

    Ok(())
}
