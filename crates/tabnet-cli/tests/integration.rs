//! Integration tests for the tabnet CLI pipelines.
//!
//! Synthetic tests write CSV files to a temp dir and drive train, test and
//! describe end to end. The `#[ignore]` tests need the public datasets under
//! `datasets/` relative to the workspace root.
//!
//! ## Running
//!
//! ```sh
//! cargo test -p tabnet-cli -- --ignored
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tabnet::EvaluationReport;
use tabnet_cli::config::{ModelOverrides, TrainingOverrides};
use tabnet_cli::pipeline::{run_describe, run_test, run_train, DescribeArgs, TestArgs, TrainArgs};
use tabnet_cli::results::EvaluationResult;
use tempfile::TempDir;

fn write_csv(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

/// Two continuous features and one categorical feature. The class is decided
/// by which quadrant cluster the point was drawn from.
fn quadrant_csv(rows: usize, seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let classes = [("ne", 3.0, 3.0), ("nw", -3.0, 3.0), ("sw", -3.0, -3.0), ("se", 3.0, -3.0)];
    let colours = ["red", "green", "blue"];
    let mut text = String::from("colour,x,y,quadrant\n");
    for i in 0..rows {
        let (label, cx, cy) = classes[i % classes.len()];
        let x = cx + rng.gen_range(-1.0..1.0);
        let y = cy + rng.gen_range(-1.0..1.0);
        let colour = colours[rng.gen_range(0..colours.len())];
        text.push_str(&format!("{colour},{x:.4},{y:.4},{label}\n"));
    }
    text
}

/// `price = 5x + 2 * (size is large) + noise`, with a categorical size.
fn pricing_csv(rows: usize, seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut text = String::from("x,size,price\n");
    for _ in 0..rows {
        let x: f64 = rng.gen_range(-1.0..1.0);
        let large = rng.gen_bool(0.5);
        let size = if large { "large" } else { "small" };
        let price = 5.0 * x + if large { 2.0 } else { 0.0 } + rng.gen_range(-0.2..0.2);
        text.push_str(&format!("{x:.4},{size},{price:.4}\n"));
    }
    text
}

fn train_args(train_file: PathBuf, output: PathBuf, target: &str, categorical: &[&str]) -> TrainArgs {
    TrainArgs {
        train_file,
        output,
        target_column: target.to_string(),
        categorical_columns: categorical.iter().map(|c| c.to_string()).collect(),
        test_file: None,
        config: None,
        model_overrides: ModelOverrides {
            num_decision_steps: Some(3),
            virtual_batch_size: Some(32),
            ..Default::default()
        },
        training_overrides: TrainingOverrides {
            num_epochs: Some(25),
            batch_size: Some(32),
            learning_rate: Some(0.02),
            ..Default::default()
        },
        results: None,
    }
}

fn test_args(model: PathBuf, input: PathBuf) -> TestArgs {
    TestArgs {
        model,
        input,
        output: None,
        attention_map: None,
        results: None,
    }
}

#[test]
fn test_classification_train_then_test() {
    let tmp = TempDir::new().unwrap();
    let train_file = write_csv(tmp.path(), "train.csv", &quadrant_csv(320, 1));
    let test_file = write_csv(tmp.path(), "test.csv", &quadrant_csv(80, 2));
    let model = tmp.path().join("models/quadrants.bin");

    let mut args = train_args(train_file, model.clone(), "quadrant", &["colour", "quadrant"]);
    args.test_file = Some(test_file.clone());
    args.results = Some(tmp.path().join("train.json"));
    let trained = run_train(args).unwrap();

    assert!(model.is_file());
    assert_eq!(trained.records, 320);
    assert_eq!(trained.summary.epochs, 25);
    assert!(tmp.path().join("train.json").is_file());
    let held_out = trained.evaluation.expect("held-out evaluation");
    assert!(matches!(held_out.report, EvaluationReport::Classification(_)));

    let mut args = test_args(model.clone(), test_file);
    args.output = Some(tmp.path().join("predictions.csv"));
    args.attention_map = Some(tmp.path().join("attention.csv"));
    args.results = Some(tmp.path().join("results.json"));
    let result = run_test(args).unwrap();

    let EvaluationReport::Classification(report) = &result.report else {
        panic!("expected classification report");
    };
    assert!(report.macro_f1 >= 0.85, "macro F1 {:.3}", report.macro_f1);
    assert_eq!(report.classes.len(), 4);
    // The reloaded model scores the held-out file exactly as the trained one.
    assert_eq!(result.report, held_out.report);

    let predictions = std::fs::read_to_string(tmp.path().join("predictions.csv")).unwrap();
    assert_eq!(predictions.lines().next(), Some("label,predicted,probability"));
    assert_eq!(predictions.lines().count(), 81);

    let attention = std::fs::read_to_string(tmp.path().join("attention.csv")).unwrap();
    assert_eq!(attention.lines().next(), Some("line,step,x,y,colour"));
    assert_eq!(attention.lines().count(), 1 + 80 * 3);

    let saved: EvaluationResult =
        serde_json::from_str(&std::fs::read_to_string(tmp.path().join("results.json")).unwrap())
            .unwrap();
    assert_eq!(saved.rejected_records, 0);

    run_describe(DescribeArgs { model }).unwrap();
}

#[test]
fn test_regression_train_then_test() {
    let tmp = TempDir::new().unwrap();
    let train_file = write_csv(tmp.path(), "train.csv", &pricing_csv(320, 3));
    let test_file = write_csv(tmp.path(), "test.csv", &pricing_csv(80, 4));
    let model = tmp.path().join("pricing.bin");

    let mut args = train_args(train_file, model.clone(), "price", &["size"]);
    args.training_overrides.num_epochs = Some(40);
    run_train(args).unwrap();

    let mut args = test_args(model, test_file);
    args.output = Some(tmp.path().join("predictions.csv"));
    let result = run_test(args).unwrap();
    let EvaluationReport::Regression(report) = result.report else {
        panic!("expected regression report");
    };
    assert!(report.r_squared > 0.5, "R-squared {:.3}", report.r_squared);

    // Predictions are written on the original price scale.
    let predictions = std::fs::read_to_string(tmp.path().join("predictions.csv")).unwrap();
    let mut lines = predictions.lines();
    assert_eq!(lines.next(), Some("label,prediction"));
    let labels: Vec<f64> = lines
        .map(|line| line.split(',').next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(labels.len(), 80);
    assert!(labels.iter().any(|v| *v > 3.0), "labels look standardized");
}

#[test]
fn test_unseen_category_rows_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let train_file = write_csv(tmp.path(), "train.csv", &quadrant_csv(64, 5));
    let test_file = write_csv(
        tmp.path(),
        "test.csv",
        "colour,x,y,quadrant\nred,3.0,3.0,ne\npurple,-3.0,3.0,nw\nblue,-3.0,-3.0,sw\n",
    );
    let model = tmp.path().join("model.bin");

    let mut args = train_args(train_file, model.clone(), "quadrant", &["colour", "quadrant"]);
    args.training_overrides.num_epochs = Some(2);
    run_train(args).unwrap();

    let result = run_test(test_args(model, test_file)).unwrap();
    assert_eq!(result.rejected_records, 1);
    let EvaluationReport::Classification(report) = result.report else {
        panic!("expected classification report");
    };
    assert_eq!(report.records, 2);
}

#[test]
fn test_schema_mismatch_fails() {
    let tmp = TempDir::new().unwrap();
    let train_file = write_csv(tmp.path(), "train.csv", &quadrant_csv(64, 6));
    let test_file = write_csv(tmp.path(), "test.csv", "x,y,colour,quadrant\n3.0,3.0,red,ne\n");
    let model = tmp.path().join("model.bin");

    let mut args = train_args(train_file, model.clone(), "quadrant", &["colour", "quadrant"]);
    args.training_overrides.num_epochs = Some(1);
    run_train(args).unwrap();

    assert!(run_test(test_args(model, test_file)).is_err());
}

#[test]
fn test_explicit_config_file_is_applied() {
    let tmp = TempDir::new().unwrap();
    let train_file = write_csv(tmp.path(), "train.csv", &quadrant_csv(64, 7));
    let config = write_csv(
        tmp.path(),
        "train.toml",
        "[model]\nnum_decision_steps = 4\nfeature_dimension = 6\n\n[training]\nnum_epochs = 2\n",
    );
    let model = tmp.path().join("model.bin");

    let mut args = train_args(train_file, model.clone(), "quadrant", &["colour", "quadrant"]);
    args.config = Some(config);
    // Flags win over the file.
    args.model_overrides.num_decision_steps = None;
    args.training_overrides.num_epochs = Some(3);
    let trained = run_train(args).unwrap();
    assert_eq!(trained.summary.epochs, 3);

    let saved = tabnet::load_model::<burn::backend::ndarray::NdArray<f32>>(&model, &Default::default())
        .unwrap();
    assert_eq!(saved.config.num_decision_steps, 4);
    assert_eq!(saved.config.feature_dimension, 6);
}

// --- Public datasets -------------------------------------------------------

fn dataset_path(relative: &str) -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let workspace_root = manifest_dir.parent().unwrap().parent().unwrap();
    workspace_root.join("datasets").join(relative)
}

fn dataset_args(train: &str, target: &str, categorical: &[&str], epochs: usize, steps: usize) -> TrainArgs {
    let tmp = std::env::temp_dir().join(format!("tabnet-{target}.bin"));
    TrainArgs {
        train_file: dataset_path(train),
        output: tmp,
        target_column: target.to_string(),
        categorical_columns: categorical.iter().map(|c| c.to_string()).collect(),
        test_file: None,
        config: None,
        model_overrides: ModelOverrides {
            num_decision_steps: Some(steps),
            ..Default::default()
        },
        training_overrides: TrainingOverrides {
            num_epochs: Some(epochs),
            ..Default::default()
        },
        results: None,
    }
}

#[test]
#[ignore]
fn test_iris() {
    let mut args = dataset_args("iris/iris.train", "species", &["species"], 20, 3);
    args.model_overrides.sparsity_loss_weight = Some(0.01);
    let model = args.output.clone();
    let trained = run_train(args).unwrap();
    assert_eq!(trained.summary.epochs, 20);

    let result = run_test(test_args(model, dataset_path("iris/iris.test"))).unwrap();
    let EvaluationReport::Classification(report) = result.report else {
        panic!("expected classification report");
    };
    assert!(report.macro_f1 >= 0.85, "macro F1 {:.3}", report.macro_f1);
}

#[test]
#[ignore]
fn test_breast_cancer() {
    let categorical = [
        "Class",
        "Age",
        "Menopause",
        "Tumor-size",
        "Inv-nodes",
        "Node-caps",
        "Breast",
        "Breast-quad",
        "Irradiat",
    ];
    let args = dataset_args("breast_cancer/breast-cancer.train", "Class", &categorical, 40, 6);
    let model = args.output.clone();
    run_train(args).unwrap();

    let result = run_test(test_args(model, dataset_path("breast_cancer/breast-cancer.test"))).unwrap();
    let EvaluationReport::Classification(report) = result.report else {
        panic!("expected classification report");
    };
    assert!(report.macro_f1 >= 0.67, "macro F1 {:.3}", report.macro_f1);
}

#[test]
#[ignore]
fn test_boston_housing() {
    let mut args = dataset_args("boston_housing/boston-housing-train.csv", "medv", &[], 20, 3);
    args.model_overrides.sparsity_loss_weight = Some(0.01);
    let model = args.output.clone();
    run_train(args).unwrap();

    let result = run_test(test_args(
        model,
        dataset_path("boston_housing/boston-housing-test.csv"),
    ))
    .unwrap();
    let EvaluationReport::Regression(report) = result.report else {
        panic!("expected regression report");
    };
    assert!(
        (0.6..=0.75).contains(&report.r_squared),
        "R-squared {:.3}",
        report.r_squared
    );
}
