//! TabNet training loop.
//!
//! Walks the dataset in mini-batches once per epoch, composes the weighted
//! loss from every forward pass and takes one Adam step per batch.

use std::time::Instant;

use burn::grad_clipping::GradientClippingConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Distribution;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tabular::{Dataset, DatasetOrder};

use crate::model::bridge::records_to_input;
use crate::model::network::TabularNetwork;
use crate::model::tabnet::TabNetConfig;
use crate::training::loss::{compose_loss, LossWeights, Objective};
use crate::training::metrics::{LossBreakdown, RunningAverage};

/// Configuration for the training loop.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = 10)]
    pub num_epochs: usize,
    #[config(default = 16)]
    pub batch_size: usize,
    #[config(default = 0.01)]
    pub learning_rate: f64,
    /// Gradients are clipped element-wise to `[-v, v]`.
    #[config(default = 2000.0)]
    pub grad_clip_value: f64,
    /// Batches between loss reports.
    #[config(default = 10)]
    pub report_interval: usize,
    /// Seeds parameter initialisation, shuffling and input dropout.
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = true)]
    pub shuffle: bool,
    /// Probability of zeroing each input cell during training.
    #[config(default = 0.0)]
    pub input_dropout: f64,
}

impl TrainingConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.batch_size > 0, "batch_size must be positive");
        anyhow::ensure!(
            self.learning_rate > 0.0 && self.learning_rate.is_finite(),
            "learning_rate must be positive, got {}",
            self.learning_rate
        );
        anyhow::ensure!(
            self.grad_clip_value > 0.0,
            "grad_clip_value must be positive, got {}",
            self.grad_clip_value
        );
        anyhow::ensure!(
            (0.0..1.0).contains(&self.input_dropout),
            "input_dropout must lie in [0, 1), got {}",
            self.input_dropout
        );
        Ok(())
    }
}

/// Outcome of a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub epochs: usize,
    pub batches: usize,
    /// Average weighted losses of the last epoch.
    pub final_epoch: Option<LossBreakdown>,
    pub elapsed_secs: f64,
}

/// Validate `config` and build a freshly initialised network with
/// parameters drawn from `seed`.
pub fn init_network<B: Backend>(
    config: &TabNetConfig,
    seed: u64,
    device: &B::Device,
) -> anyhow::Result<TabularNetwork<B>> {
    config.validate()?;
    B::seed(seed);
    Ok(TabularNetwork::init(config, device))
}

/// Zero each cell with probability `rate`. Kept cells are not rescaled.
fn input_dropout<B: Backend>(input: Tensor<B, 2>, rate: f64) -> Tensor<B, 2> {
    if rate <= 0.0 {
        return input;
    }
    let keep = Tensor::<B, 2>::random(input.shape(), Distribution::Bernoulli(1.0 - rate), &input.device());
    input * keep
}

/// Train `network` on `dataset`.
///
/// `dataset` must already be standardized. Its iteration order is reset at
/// the start of every epoch.
pub fn train<B: AutodiffBackend>(
    config: &TrainingConfig,
    mut network: TabularNetwork<B>,
    dataset: &mut Dataset,
    objective: Objective,
    weights: LossWeights,
    device: &B::Device,
) -> anyhow::Result<(TabularNetwork<B>, TrainingSummary)> {
    config.validate()?;
    anyhow::ensure!(!dataset.is_empty(), "training dataset is empty");

    B::seed(config.seed);
    dataset.reseed(config.seed);
    let order = if config.shuffle {
        DatasetOrder::Random
    } else {
        DatasetOrder::Original
    };

    let mut optimizer = AdamConfig::new()
        .with_grad_clipping(Some(GradientClippingConfig::Value(
            config.grad_clip_value as f32,
        )))
        .init();

    let batches_per_epoch = dataset.len().div_ceil(config.batch_size);
    let total_batches = batches_per_epoch * config.num_epochs;
    tracing::info!(
        records = dataset.len(),
        epochs = config.num_epochs,
        batch_size = config.batch_size,
        batches_per_epoch,
        objective = %objective,
        lr = config.learning_rate,
        "Starting training"
    );

    let pb = ProgressBar::new(total_batches as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let start = Instant::now();
    let mut batches = 0usize;
    let mut final_epoch = None;
    let mut window = RunningAverage::new();

    for epoch in 0..config.num_epochs {
        dataset.reset_order(order);
        let mut epoch_avg = RunningAverage::new();

        loop {
            let records = dataset.next_batch(config.batch_size);
            if records.is_empty() {
                break;
            }

            let input = network.encode_input(records_to_input::<B>(&records, device))?;
            let input = input_dropout(input, config.input_dropout);
            let targets = objective.targets::<B>(&records, device);

            let output = network.forward_encoded(input);
            let loss = compose_loss(output, targets, weights);
            let breakdown = LossBreakdown::from_loss(&loss);

            let grads = GradientsParams::from_grads(loss.total.backward(), &network);
            network = optimizer.step(config.learning_rate, network, grads);

            batches += 1;
            window.update(&breakdown);
            epoch_avg.update(&breakdown);
            pb.inc(1);

            if config.report_interval > 0 && batches % config.report_interval == 0 {
                if let Some(avg) = window.mean() {
                    let warnings = avg.health_check();
                    if !warnings.is_empty() {
                        tracing::warn!(epoch, batch = batches, "Health check warnings: {:?}", warnings);
                    }
                    pb.set_message(format!("{:.4}", avg.total));
                    tracing::debug!(
                        epoch,
                        batch = batches,
                        loss = avg.total,
                        target_loss = avg.target,
                        sparsity_loss = avg.sparsity,
                        reconstruction_loss = avg.reconstruction,
                        "batch {batches}/{total_batches} | {avg}"
                    );
                }
                window.reset();
            }
        }

        if let Some(avg) = epoch_avg.mean() {
            let warnings = avg.health_check();
            if !warnings.is_empty() {
                tracing::warn!(epoch, "Health check warnings: {:?}", warnings);
            }
            tracing::info!(
                epoch,
                batches = epoch_avg.count(),
                loss = avg.total,
                target_loss = avg.target,
                sparsity_loss = avg.sparsity,
                reconstruction_loss = avg.reconstruction,
                "epoch {}/{} | {avg}",
                epoch + 1,
                config.num_epochs
            );
            final_epoch = Some(avg);
        }
    }

    pb.finish_with_message("done");
    let elapsed_secs = start.elapsed().as_secs_f64();
    tracing::info!(batches, elapsed_secs, "Training complete");

    Ok((
        network,
        TrainingSummary {
            epochs: config.num_epochs,
            batches,
            final_epoch,
            elapsed_secs,
        },
    ))
}
