//! Train, test and describe pipelines behind the CLI subcommands.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use tabnet::{
    evaluate, init_network, load_model, save_model, train, write_attention, write_predictions,
    LossWeights, Objective, Predictor,
};
use tabular::{CsvLoader, DataRecord, RecordError};

use crate::config::{build_configs, resolve_train_toml, ModelOverrides, TrainingOverrides};
use crate::results::{write_json, EvaluationResult, TrainResult};

type TrainBackend = Autodiff<NdArray<f32>>;
type InferBackend = NdArray<f32>;

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    pub train_file: PathBuf,
    /// Path for the saved model file.
    pub output: PathBuf,
    pub target_column: String,
    pub categorical_columns: Vec<String>,
    /// Held-out file evaluated after training.
    pub test_file: Option<PathBuf>,
    /// Explicit config file. Falls back to `configs/train.toml` if present.
    pub config: Option<PathBuf>,
    pub model_overrides: ModelOverrides,
    pub training_overrides: TrainingOverrides,
    /// Optional JSON results file.
    pub results: Option<PathBuf>,
}

/// Arguments for the `test` subcommand.
#[derive(Debug)]
pub struct TestArgs {
    pub model: PathBuf,
    pub input: PathBuf,
    /// Prediction CSV, one row per accepted input row.
    pub output: Option<PathBuf>,
    /// Attention CSV, one row per record and decision step.
    pub attention_map: Option<PathBuf>,
    /// JSON evaluation results.
    pub results: Option<PathBuf>,
}

/// Arguments for the `describe` subcommand.
#[derive(Debug)]
pub struct DescribeArgs {
    pub model: PathBuf,
}

/// Optional output files of an evaluation.
#[derive(Debug, Default)]
struct EvaluationOutputs<'a> {
    predictions: Option<&'a Path>,
    attention_map: Option<&'a Path>,
}

fn report_rejected(path: &Path, errors: &[RecordError]) {
    if !errors.is_empty() {
        tracing::warn!(
            path = %path.display(),
            rejected = errors.len(),
            "Some rows could not be encoded and were skipped"
        );
    }
}

/// Load `input` against the predictor's metadata, predict, score and write
/// the requested files.
fn evaluate_file(
    predictor: &Predictor<InferBackend>,
    model_path: &Path,
    input: &Path,
    outputs: EvaluationOutputs<'_>,
) -> anyhow::Result<EvaluationResult> {
    let metadata = predictor.metadata();
    let loaded = CsvLoader::load_with_metadata(input, metadata, 0)?;
    report_rejected(input, &loaded.errors);

    let predictions = predictor.predict(&loaded.dataset)?;
    let records: Vec<&DataRecord> = loaded.dataset.iter().collect();
    let report = evaluate(metadata, &records, &predictions)?;
    report.log();

    if let Some(path) = outputs.predictions {
        write_predictions(path, metadata, &records, &predictions)?;
    }
    if let Some(path) = outputs.attention_map {
        write_attention(path, metadata, &predictions)?;
    }

    Ok(EvaluationResult {
        model: model_path.display().to_string(),
        input: input.display().to_string(),
        rejected_records: loaded.errors.len(),
        report,
    })
}

/// Train a model on a CSV file, save it, and optionally evaluate a held-out
/// file.
pub fn run_train(args: TrainArgs) -> anyhow::Result<TrainResult> {
    let start = Instant::now();

    // 1. Resolve configs
    let toml = resolve_train_toml(args.config.as_deref())?;
    let (model_config, training_config) =
        build_configs(&toml, &args.model_overrides, &args.training_overrides);

    // 2. Load and encode the training data
    let mut loaded = CsvLoader::load_training(
        &args.train_file,
        &args.target_column,
        args.categorical_columns.as_slice(),
        training_config.seed,
    )?;
    report_rejected(&args.train_file, &loaded.errors);

    let model_config = model_config.backfill(&loaded.metadata);
    tracing::info!(
        target_column = %args.target_column,
        target_kind = %loaded.metadata.target_kind(),
        continuous = loaded.metadata.num_continuous(),
        categorical = loaded.metadata.num_categorical(),
        columns = model_config.num_columns,
        outputs = model_config.output_dimension,
        "Prepared training data"
    );

    // 3. Train
    let device = Default::default();
    let network = init_network::<TrainBackend>(&model_config, training_config.seed, &device)?;
    let objective = Objective::for_target(loaded.metadata.target_kind());
    let (network, summary) = train(
        &training_config,
        network,
        &mut loaded.dataset,
        objective,
        LossWeights::from(&model_config),
        &device,
    )?;

    // 4. Save
    let network = network.valid();
    save_model(&args.output, &network, &loaded.metadata, &model_config)?;

    // 5. Optional held-out evaluation
    let evaluation = match &args.test_file {
        Some(test_file) => {
            let predictor = Predictor::new(
                network,
                loaded.metadata.clone(),
                model_config.categorical_embedding_dimension,
                device,
            );
            Some(evaluate_file(
                &predictor,
                &args.output,
                test_file,
                EvaluationOutputs::default(),
            )?)
        }
        None => None,
    };

    let result = TrainResult {
        model: args.output.display().to_string(),
        train_file: args.train_file.display().to_string(),
        records: loaded.dataset.len(),
        rejected_records: loaded.errors.len(),
        summary,
        evaluation,
    };
    if let Some(path) = &args.results {
        write_json(path, &result)?;
    }

    println!("\n--- Training Summary ---");
    println!("Records: {} ({} rejected)", result.records, result.rejected_records);
    println!("Epochs: {}", result.summary.epochs);
    if let Some(last) = &result.summary.final_epoch {
        println!("Final epoch: {last}");
    }
    if let Some(evaluation) = &result.evaluation {
        println!("Test loss: {:.5}", evaluation.report.loss());
    }
    println!("Model: {}", result.model);
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());

    Ok(result)
}

/// Evaluate a saved model on a labelled CSV file.
pub fn run_test(args: TestArgs) -> anyhow::Result<EvaluationResult> {
    let device = Default::default();
    let saved = load_model::<InferBackend>(&args.model, &device)?;
    let predictor = Predictor::from_saved(saved, device);

    let result = evaluate_file(
        &predictor,
        &args.model,
        &args.input,
        EvaluationOutputs {
            predictions: args.output.as_deref(),
            attention_map: args.attention_map.as_deref(),
        },
    )?;

    if let Some(path) = &args.results {
        write_json(path, &result)?;
    }
    Ok(result)
}

/// Print the schema, statistics and hyperparameters stored in a model file.
pub fn run_describe(args: DescribeArgs) -> anyhow::Result<()> {
    let saved = load_model::<InferBackend>(&args.model, &Default::default())?;
    let metadata = &saved.metadata;

    println!("--- Model ---");
    println!("File: {}", args.model.display());
    println!(
        "Target: {} ({})",
        metadata.target_column().name,
        metadata.target_kind()
    );
    if let Some(classes) = metadata.target_names() {
        println!("Classes: {}", classes.names().join(", "));
    }

    println!("\n--- Columns ---");
    for (position, column) in metadata.columns().iter().enumerate() {
        let role = if position == metadata.target_column_index() {
            " [target]"
        } else {
            ""
        };
        println!(
            "{:<24} {:<12} mean={:<12.5} stddev={:.5}{role}",
            column.name,
            column.kind.to_string(),
            column.average,
            column.stddev
        );
    }
    println!("Categorical values: {}", metadata.num_categorical_values());

    println!("\n--- TabNet Config ---");
    println!("{}", serde_json::to_string_pretty(&saved.config)?);
    Ok(())
}
