use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;

use crate::model::normalization::{GhostBatchNorm, GhostBatchNormConfig};

/// Configuration for a two-layer GLU feature transformer block.
///
/// ```text
/// (batch, d_input)
///   → GLU layer 1 → (+ input) * sqrt(0.5)     [residual skipped if configured]
///   → GLU layer 2 → (+ layer 1) * sqrt(0.5)
///   → (batch, d_feature)
///
/// GLU layer: Linear(d → 2·d_feature, no bias) → GhostBatchNorm[step] → value ⊙ σ(gate)
/// ```
#[derive(Config, Debug)]
pub struct FeatureTransformerConfig {
    /// Width of the incoming features.
    pub d_input: usize,
    /// Width of the transformed features.
    pub d_feature: usize,
    /// Number of decision steps sharing the dense weights. Each step gets its
    /// own normalization layers.
    #[config(default = 1)]
    pub num_steps: usize,
    /// Skip the residual around the first layer. Required when
    /// `d_input != d_feature`.
    #[config(default = false)]
    pub skip_input_residual: bool,
    #[config(default = 0.9)]
    pub momentum: f64,
    #[config(default = 128)]
    pub virtual_batch_size: usize,
}

/// Dense projection, per-step normalization and gated linear unit.
#[derive(Module, Debug)]
pub struct GluLayer<B: Backend> {
    pub(crate) dense: Linear<B>,
    norms: Vec<GhostBatchNorm<B>>,
    d_feature: usize,
}

impl<B: Backend> GluLayer<B> {
    fn new(config: &FeatureTransformerConfig, d_input: usize, device: &B::Device) -> Self {
        let width = 2 * config.d_feature;
        Self {
            dense: LinearConfig::new(d_input, width)
                .with_bias(false)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device),
            norms: (0..config.num_steps.max(1))
                .map(|_| {
                    GhostBatchNormConfig::new(width)
                        .with_momentum(config.momentum)
                        .with_virtual_batch_size(config.virtual_batch_size)
                        .init(device)
                })
                .collect(),
            d_feature: config.d_feature,
        }
    }

    /// `(batch, d_input)` → `(batch, d_feature)`.
    pub fn forward(&self, step: usize, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let projected = self.norms[step].forward(self.dense.forward(x));
        glu(projected, self.d_feature)
    }
}

/// Split `(batch, 2·d)` into value and gate halves and return
/// `value ⊙ sigmoid(gate)`.
pub fn glu<B: Backend>(x: Tensor<B, 2>, d: usize) -> Tensor<B, 2> {
    let [batch, _] = x.dims();
    let value = x.clone().slice([0..batch, 0..d]);
    let gate = x.slice([0..batch, d..2 * d]);
    value * sigmoid(gate)
}

/// Two GLU layers with scaled residual connections.
///
/// The shared instance is built with `num_steps = N` and is called with the
/// decision step index; every step reuses its dense weights and owns its
/// normalization. Per-step instances are built with `num_steps = 1`.
#[derive(Module, Debug)]
pub struct FeatureTransformer<B: Backend> {
    pub(crate) layer1: GluLayer<B>,
    pub(crate) layer2: GluLayer<B>,
    skip_input_residual: bool,
}

impl FeatureTransformerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FeatureTransformer<B> {
        FeatureTransformer {
            layer1: GluLayer::new(self, self.d_input, device),
            layer2: GluLayer::new(self, self.d_feature, device),
            skip_input_residual: self.skip_input_residual || self.d_input != self.d_feature,
        }
    }
}

impl<B: Backend> FeatureTransformer<B> {
    /// `(batch, d_input)` → `(batch, d_feature)` using the normalization
    /// layers of decision step `step`.
    pub fn forward(&self, step: usize, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let scale = 0.5f64.sqrt();

        let first = self.layer1.forward(step, x.clone());
        let first = if self.skip_input_residual {
            first
        } else {
            (first + x).mul_scalar(scale)
        };

        let second = self.layer2.forward(step, first.clone());
        (second + first).mul_scalar(scale)
    }

    /// Number of decision steps with their own normalization layers.
    pub fn num_steps(&self) -> usize {
        self.layer1.norms.len()
    }
}
