use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;
use tabular::{Metadata, TargetKind};
use thiserror::Error;

use crate::model::attention::{AttentiveTransformer, AttentiveTransformerConfig};
use crate::model::decoder::{Decoder, DecoderConfig};
use crate::model::feature_transformer::{FeatureTransformer, FeatureTransformerConfig};
use crate::model::normalization::{GhostBatchNorm, GhostBatchNormConfig};

/// Lower bound applied to mask values inside the entropy logarithm.
pub const ENTROPY_EPSILON: f64 = 1e-5;

/// Configuration for the TabNet model.
///
/// `num_columns`, `num_categorical_embeddings` and `output_dimension` depend
/// on the parsed training data; fill them with [`TabNetConfig::backfill`]
/// before building the model.
#[derive(Config, Debug)]
pub struct TabNetConfig {
    /// Number of decision steps. At least 2.
    #[config(default = 3)]
    pub num_decision_steps: usize,
    /// Width of the encoded input vector.
    #[config(default = 0)]
    pub num_columns: usize,
    /// Width of the transformed features inside every step.
    #[config(default = 8)]
    pub feature_dimension: usize,
    /// Number of classes, or 1 for regression.
    #[config(default = 1)]
    pub output_dimension: usize,
    /// Embedding width of every categorical column.
    #[config(default = 1)]
    pub categorical_embedding_dimension: usize,
    /// Rows in the global categorical embedding table.
    #[config(default = 0)]
    pub num_categorical_embeddings: usize,
    /// Per-step selection budget. 1 forbids reusing a column.
    #[config(default = 1.5)]
    pub relaxation_factor: f64,
    #[config(default = 0.9)]
    pub batch_momentum: f64,
    #[config(default = 128)]
    pub virtual_batch_size: usize,
    #[config(default = 1e-4)]
    pub sparsity_loss_weight: f64,
    #[config(default = 0.0)]
    pub reconstruction_loss_weight: f64,
    #[config(default = 1.0)]
    pub target_loss_weight: f64,
}

/// Rejected TabNet hyperparameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("num_decision_steps must be at least 2, got {0}")]
    TooFewSteps(usize),
    #[error("{0} must be positive")]
    ZeroDimension(&'static str),
    #[error("relaxation_factor must be at least 1, got {0}")]
    Relaxation(f64),
    #[error("batch_momentum must lie in [0, 1), got {0}")]
    Momentum(f64),
    #[error("{name} must be non-negative, got {value}")]
    NegativeWeight { name: &'static str, value: f64 },
}

impl TabNetConfig {
    /// Copy of this config with the data-dependent sizes taken from
    /// `metadata`.
    pub fn backfill(&self, metadata: &Metadata) -> Self {
        let output_dimension = match metadata.target_kind() {
            TargetKind::Categorical => metadata.num_classes(),
            TargetKind::Continuous => 1,
        };
        self.clone()
            .with_num_columns(
                metadata.num_continuous()
                    + metadata.num_categorical() * self.categorical_embedding_dimension,
            )
            .with_num_categorical_embeddings(metadata.num_categorical_values())
            .with_output_dimension(output_dimension)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_decision_steps < 2 {
            return Err(ConfigError::TooFewSteps(self.num_decision_steps));
        }
        for (name, value) in [
            ("num_columns", self.num_columns),
            ("feature_dimension", self.feature_dimension),
            ("output_dimension", self.output_dimension),
            ("categorical_embedding_dimension", self.categorical_embedding_dimension),
            ("virtual_batch_size", self.virtual_batch_size),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDimension(name));
            }
        }
        if !(self.relaxation_factor >= 1.0) {
            return Err(ConfigError::Relaxation(self.relaxation_factor));
        }
        if !(0.0..1.0).contains(&self.batch_momentum) {
            return Err(ConfigError::Momentum(self.batch_momentum));
        }
        for (name, value) in [
            ("sparsity_loss_weight", self.sparsity_loss_weight),
            ("reconstruction_loss_weight", self.reconstruction_loss_weight),
            ("target_loss_weight", self.target_loss_weight),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::NegativeWeight { name, value });
            }
        }
        Ok(())
    }

    /// Initialize the TabNet core. Call [`TabNetConfig::validate`] first.
    pub fn init<B: Backend>(&self, device: &B::Device) -> TabNet<B> {
        let steps = self.num_decision_steps;
        let mask_steps = steps.saturating_sub(1);

        let transformer = |d_input: usize, num_steps: usize| {
            FeatureTransformerConfig::new(d_input, self.feature_dimension)
                .with_num_steps(num_steps)
                .with_momentum(self.batch_momentum)
                .with_virtual_batch_size(self.virtual_batch_size)
        };

        TabNet {
            input_norm: GhostBatchNormConfig::new(self.num_columns)
                .with_momentum(self.batch_momentum)
                .with_virtual_batch_size(self.virtual_batch_size)
                .init(device),
            shared: transformer(self.num_columns, steps)
                .with_skip_input_residual(true)
                .init(device),
            steps: (0..steps)
                .map(|_| transformer(self.feature_dimension, 1).init(device))
                .collect(),
            attention: (0..mask_steps)
                .map(|_| {
                    AttentiveTransformerConfig::new(self.feature_dimension, self.num_columns)
                        .with_momentum(self.batch_momentum)
                        .with_virtual_batch_size(self.virtual_batch_size)
                        .init(device)
                })
                .collect(),
            decoders: (0..mask_steps)
                .map(|_| DecoderConfig::new(self.feature_dimension, self.num_columns).init(device))
                .collect(),
            output: LinearConfig::new(self.feature_dimension, self.output_dimension)
                .with_bias(false)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device),
            feature_dimension: self.feature_dimension,
            relaxation_factor: self.relaxation_factor,
        }
    }
}

/// Everything one forward pass produces.
#[derive(Debug, Clone)]
pub struct TabNetOutput<B: Backend> {
    /// Logits or regression output, `(batch, output_dimension)`.
    pub output: Tensor<B, 2>,
    /// Sum of the per-step reconstructions, `(batch, num_columns)`.
    pub decoded: Tensor<B, 2>,
    /// Input after the feature normalization, `(batch, num_columns)`.
    pub normalized_input: Tensor<B, 2>,
    /// Summed mask entropy per example, `(batch,)`.
    pub attention_entropy: Tensor<B, 1>,
    /// One `(batch, num_columns)` mask per mask-producing step. Filled in
    /// inference passes only.
    pub attention_masks: Vec<Tensor<B, 2>>,
}

/// TabNet: sequential attentive feature selection over decision steps.
///
/// ```text
/// input  = GhostBatchNorm(raw)
/// prior  = 1, masked = input
/// for step in 0..N:
///     transformed = step_transformer[step](shared(step, masked))
///     if step > 0:  out += relu(transformed); decoded += decoder[step-1](transformed)
///     if step == N-1: stop
///     mask    = attention[step](transformed, prior)        (sparsemax)
///     prior  *= relaxation - mask
///     masked  = input ⊙ mask
///     entropy += Σ -mask·ln(max(mask, ε)) / (N-1)
/// output = Linear(out)
/// ```
#[derive(Module, Debug)]
pub struct TabNet<B: Backend> {
    input_norm: GhostBatchNorm<B>,
    /// Dense weights shared by every step, one normalization per step.
    shared: FeatureTransformer<B>,
    /// Independent per-step blocks.
    steps: Vec<FeatureTransformer<B>>,
    /// One per step that produces a mask (all but the last).
    attention: Vec<AttentiveTransformer<B>>,
    /// One per step that contributes output (all but the first).
    decoders: Vec<Decoder<B>>,
    output: Linear<B>,
    feature_dimension: usize,
    relaxation_factor: f64,
}

/// Sparsity term of one step's mask, shape `(batch, 1)`:
/// `Σ -m·ln(max(m, ε)) / (N-1)`. Zero exactly when a row is one-hot.
pub(crate) fn step_entropy<B: Backend>(mask: Tensor<B, 2>, num_steps: usize) -> Tensor<B, 2> {
    let scale = 1.0 / num_steps.saturating_sub(1).max(1) as f64;
    (mask.clone().neg() * mask.clamp_min(ENTROPY_EPSILON).log())
        .sum_dim(1)
        .mul_scalar(scale)
}

impl<B: Backend> TabNet<B> {
    /// Forward pass over an encoded input of shape `(batch, num_columns)`.
    ///
    /// On an autodiff backend this is a training pass: normalization uses
    /// batch statistics and no masks are kept. Otherwise it is an inference
    /// pass and every step's mask is returned.
    pub fn forward(&self, raw: Tensor<B, 2>) -> TabNetOutput<B> {
        let [batch, columns] = raw.dims();
        let device = raw.device();
        let num_steps = self.steps.len();
        let record_masks = !B::ad_enabled();

        let input = self.input_norm.forward(raw);
        let mut prior = Tensor::<B, 2>::ones([batch, columns], &device);
        let mut masked = input.clone();
        let mut aggregated = Tensor::<B, 2>::zeros([batch, self.feature_dimension], &device);
        let mut decoded = Tensor::<B, 2>::zeros([batch, columns], &device);
        let mut entropy = Tensor::<B, 2>::zeros([batch, 1], &device);
        let mut masks = Vec::new();

        for (step, step_transformer) in self.steps.iter().enumerate() {
            let transformed = step_transformer.forward(0, self.shared.forward(step, masked));

            if step > 0 {
                aggregated = aggregated + relu(transformed.clone());
                decoded = decoded + self.decoders[step - 1].forward(transformed.clone());
            }
            if step + 1 == num_steps {
                break;
            }

            let mask = self.attention[step].forward(transformed, prior.clone());
            if record_masks {
                masks.push(mask.clone());
            }

            prior = prior * mask.clone().neg().add_scalar(self.relaxation_factor);
            masked = input.clone() * mask.clone();

            entropy = entropy + step_entropy(mask, num_steps);
        }

        TabNetOutput {
            output: self.output.forward(aggregated),
            decoded,
            normalized_input: input,
            attention_entropy: entropy.squeeze::<1>(1),
            attention_masks: masks,
        }
    }

    pub fn num_decision_steps(&self) -> usize {
        self.steps.len()
    }
}
