//! Relation extraction model training and prediction.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tcre_core::SqliteCandidateStore;
use tcre_trainer::{run_predict, run_train, CommonOptions, TrainOptions};
use tracing::info;

#[derive(Parser)]
#[command(name = "tcre")]
#[command(about = "Train and apply recurrent relation classifiers")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a single model
    Train {
        #[command(flatten)]
        options: TrainOptions,
    },
    /// Predict labels for candidates using a trained model
    Predict {
        /// Path to json file containing candidate ids keyed by split name ("predict")
        #[arg(long)]
        splits_file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level: tracing::Level = cli
        .common
        .log_level
        .parse()
        .with_context(|| format!("invalid log level {:?}", cli.common.log_level))?;
    tracing_subscriber::fmt().with_max_level(level).init();

    let store = SqliteCandidateStore::open(&cli.common.candidate_db)
        .with_context(|| format!("opening candidate database {:?}", cli.common.candidate_db))?;

    match cli.command {
        Commands::Train { options } => {
            let run = run_train(cli.common, options, &store)?;
            info!("Finished after {} epochs", run.outcome.epochs);
        }
        Commands::Predict { splits_file } => {
            let predictions = run_predict(cli.common, splits_file, &store)?;
            info!("Wrote {} predictions", predictions.len());
        }
    }
    Ok(())
}
