mod config;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pipeline::{SampleArgs, TrainCategoricalArgs, TrainGenerativeArgs};

/// drbm: train and sample discriminative restricted Boltzmann machines.
#[derive(Parser)]
#[command(name = "drbm", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a DRBM on data synthesised by a generator DRBM.
    TrainGenerative {
        /// Path to the experiment config JSON file.
        learning_config: PathBuf,
        /// Number of epochs.
        learning_epoch: usize,
        /// Directory to write the learning log and model into.
        #[arg(short = 'd', long = "output_directory", default_value = "./results/")]
        output_directory: PathBuf,
        /// Filename suffix.
        #[arg(short = 's', long = "filename_suffix")]
        filename_suffix: Option<String>,
    },
    /// Train a DRBM on labelled train/test datasets.
    TrainCategorical {
        /// Path to the experiment config JSON file.
        learning_config: PathBuf,
        /// Number of epochs.
        learning_epoch: usize,
        /// Training dataset JSON.
        #[arg(long)]
        train: PathBuf,
        /// Test dataset JSON.
        #[arg(long)]
        test: PathBuf,
        /// Directory to write the learning log and model into.
        #[arg(short = 'd', long = "output_directory", default_value = "./results/")]
        output_directory: PathBuf,
        /// Filename suffix.
        #[arg(short = 's', long = "filename_suffix")]
        filename_suffix: Option<String>,
    },
    /// Draw a labelled dataset from a saved model by stick-breaking.
    Sample {
        /// Saved model JSON.
        model: PathBuf,
        /// Number of examples.
        count: usize,
        /// Output dataset JSON.
        #[arg(long)]
        output: PathBuf,
        /// Seed for input sampling and category draws.
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::TrainGenerative {
            learning_config,
            learning_epoch,
            output_directory,
            filename_suffix,
        } => pipeline::run_train_generative(TrainGenerativeArgs {
            config: learning_config,
            epochs: learning_epoch,
            output_dir: output_directory,
            suffix: filename_suffix,
        }),
        Command::TrainCategorical {
            learning_config,
            learning_epoch,
            train,
            test,
            output_directory,
            filename_suffix,
        } => pipeline::run_train_categorical(TrainCategoricalArgs {
            config: learning_config,
            epochs: learning_epoch,
            train,
            test,
            output_dir: output_directory,
            suffix: filename_suffix,
        }),
        Command::Sample {
            model,
            count,
            output,
            seed,
        } => pipeline::run_sample(SampleArgs {
            model,
            count,
            output,
            seed,
        }),
    }
}
