use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;

use crate::model::normalization::{GhostBatchNorm, GhostBatchNormConfig};
use crate::model::sparsemax::sparsemax;

/// Configuration for the attentive transformer of one decision step.
#[derive(Config, Debug)]
pub struct AttentiveTransformerConfig {
    pub d_feature: usize,
    pub num_columns: usize,
    #[config(default = 0.9)]
    pub momentum: f64,
    #[config(default = 128)]
    pub virtual_batch_size: usize,
}

/// Produces a step's feature-selection mask.
///
/// ```text
/// mask = sparsemax(GhostBatchNorm(Linear(transformed)) ⊙ prior)
/// ```
#[derive(Module, Debug)]
pub struct AttentiveTransformer<B: Backend> {
    linear: Linear<B>,
    norm: GhostBatchNorm<B>,
}

impl AttentiveTransformerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentiveTransformer<B> {
        AttentiveTransformer {
            linear: LinearConfig::new(self.d_feature, self.num_columns)
                .with_bias(false)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device),
            norm: GhostBatchNormConfig::new(self.num_columns)
                .with_momentum(self.momentum)
                .with_virtual_batch_size(self.virtual_batch_size)
                .init(device),
        }
    }
}

impl<B: Backend> AttentiveTransformer<B> {
    /// `transformed`: `(batch, d_feature)`, `prior`: `(batch, num_columns)`.
    /// Returns a `(batch, num_columns)` mask whose rows lie on the simplex.
    pub fn forward(&self, transformed: Tensor<B, 2>, prior: Tensor<B, 2>) -> Tensor<B, 2> {
        let logits = self.norm.forward(self.linear.forward(transformed));
        sparsemax(logits * prior)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::tensor::Distribution;

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_mask_rows_sum_to_one() {
        let device = Default::default();
        let attention = AttentiveTransformerConfig::new(4, 5).init::<TestAutodiffBackend>(&device);
        let transformed = Tensor::<TestAutodiffBackend, 2>::random(
            [10, 4],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let mask = attention.forward(transformed, Tensor::ones([10, 5], &device));
        assert_eq!(mask.dims(), [10, 5]);

        let sums = mask.sum_dim(1).into_data().to_vec::<f32>().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }
}
