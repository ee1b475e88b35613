//! Operator CLI for the engagement pipeline.
//!
//! Commands:
//! - validate-models: check the feature-extraction model deployment
//! - export: dump a meeting's aggregates, analyses and bucket summaries

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use engagement_lib::{
    analysis::validate_model_deployment, init_logging, report, Database,
    PipelineSettings,
};

#[derive(Parser)]
#[command(name = "engagement")]
#[command(about = "Operate the meeting engagement pipeline", long_about = None)]
struct Cli {
    /// Settings file (JSON). Falls back to $ENGAGEMENT_SETTINGS, then defaults.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that every required model file exists and parses
    ValidateModels {
        /// Overrides analysis.modelsDir from the settings
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },

    /// Print a meeting's persisted engagement data as JSON
    Export {
        /// SQLite document store
        #[arg(long)]
        db: PathBuf,

        #[arg(long)]
        meeting: String,

        /// Only analyses inside aggregation.recentWindowMs, newest first
        #[arg(long)]
        recent: bool,
    },
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.settings {
        Some(path) => PipelineSettings::load(path)?,
        None => PipelineSettings::from_env()?,
    };

    match cli.command {
        Commands::ValidateModels { models_dir } => {
            let dir = models_dir.unwrap_or_else(|| PathBuf::from(&settings.analysis.models_dir));
            validate_model_deployment(&dir, &settings.analysis.required_models)?;
            println!("all {} models valid in {}", settings.analysis.required_models.len(), dir.display());
            Ok(())
        }
        Commands::Export { db, meeting, recent } => {
            if !db.exists() {
                anyhow::bail!("no database at {}", db.display());
            }
            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            runtime.block_on(async {
                let database = Database::from_settings(db, &settings.aggregation)?;
                let json = if recent {
                    let since = Utc::now().timestamp_millis() - settings.aggregation.recent_window_ms;
                    let records = report::recent_analyses(&database, &meeting, since).await?;
                    serde_json::to_string_pretty(&records)?
                } else {
                    let report = report::export_meeting(&database, &meeting).await?;
                    serde_json::to_string_pretty(&report)?
                };
                println!("{json}");
                Ok::<(), anyhow::Error>(())
            })
        }
    }
}
