use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use tabnet_cli::config::{ModelOverrides, TrainingOverrides};
use tabnet_cli::pipeline::{self, DescribeArgs, TestArgs, TrainArgs};

/// tabnet: train and evaluate TabNet models on CSV data.
#[derive(Parser)]
#[command(name = "tabnet", version, about)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// CLI subcommands for training, evaluation and model inspection.
#[derive(Subcommand)]
enum Command {
    /// Train a model on a CSV file and save it.
    Train {
        /// Training CSV file with a header row.
        #[arg(long)]
        train_file: PathBuf,
        /// Path for the saved model file.
        #[arg(long)]
        output: PathBuf,
        /// Name of the column to predict.
        #[arg(long)]
        target_column: String,
        /// Comma-separated categorical columns. Include the target column for
        /// classification.
        #[arg(long, value_delimiter = ',')]
        categorical_columns: Vec<String>,
        /// Held-out CSV file evaluated after training.
        #[arg(long)]
        test_file: Option<PathBuf>,
        /// Training config TOML file. Defaults to configs/train.toml when present.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Path to write JSON training results.
        #[arg(long)]
        results: Option<PathBuf>,
        #[arg(long)]
        num_epochs: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        learning_rate: Option<f64>,
        /// Seed for initialisation, shuffling and dropout.
        #[arg(long)]
        seed: Option<u64>,
        /// Probability of zeroing each input cell during training.
        #[arg(long)]
        input_dropout: Option<f64>,
        #[arg(long)]
        num_decision_steps: Option<usize>,
        #[arg(long)]
        feature_dimension: Option<usize>,
        #[arg(long)]
        relaxation_factor: Option<f64>,
        #[arg(long)]
        sparsity_loss_weight: Option<f64>,
        #[arg(long)]
        reconstruction_loss_weight: Option<f64>,
        /// Embedding width of every categorical column.
        #[arg(long)]
        categorical_embedding_size: Option<usize>,
    },
    /// Evaluate a saved model on a labelled CSV file.
    Test {
        /// Path to the model file.
        #[arg(long)]
        model: PathBuf,
        /// CSV file with the same header as the training file.
        #[arg(long)]
        input: PathBuf,
        /// Prediction CSV output.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Attention map CSV output.
        #[arg(long)]
        attention_map: Option<PathBuf>,
        /// Path to write JSON evaluation results.
        #[arg(long)]
        results: Option<PathBuf>,
    },
    /// Print the schema and hyperparameters stored in a model file.
    Describe {
        /// Path to the model file.
        #[arg(long)]
        model: PathBuf,
    },
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match cli.command {
        Command::Train {
            train_file,
            output,
            target_column,
            categorical_columns,
            test_file,
            config,
            results,
            num_epochs,
            batch_size,
            learning_rate,
            seed,
            input_dropout,
            num_decision_steps,
            feature_dimension,
            relaxation_factor,
            sparsity_loss_weight,
            reconstruction_loss_weight,
            categorical_embedding_size,
        } => pipeline::run_train(TrainArgs {
            train_file,
            output,
            target_column,
            categorical_columns,
            test_file,
            config,
            model_overrides: ModelOverrides {
                num_decision_steps,
                feature_dimension,
                categorical_embedding_dimension: categorical_embedding_size,
                relaxation_factor,
                sparsity_loss_weight,
                reconstruction_loss_weight,
                ..Default::default()
            },
            training_overrides: TrainingOverrides {
                num_epochs,
                batch_size,
                learning_rate,
                seed,
                input_dropout,
                ..Default::default()
            },
            results,
        })
        .map(|_| ()),
        Command::Test {
            model,
            input,
            output,
            attention_map,
            results,
        } => pipeline::run_test(TestArgs {
            model,
            input,
            output,
            attention_map,
            results,
        })
        .map(|_| ()),
        Command::Describe { model } => pipeline::run_describe(DescribeArgs { model }),
    }
}
