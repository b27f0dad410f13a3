use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;

/// Configuration for a per-step reconstruction head.
#[derive(Config, Debug)]
pub struct DecoderConfig {
    /// Width of the transformed features of a decision step.
    pub d_feature: usize,
    /// Width of the encoded input to reconstruct.
    pub num_columns: usize,
}

/// Bias-free linear projection of a step's transformed features back onto
/// the encoded input columns.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    pub(crate) linear: Linear<B>,
}

impl DecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Decoder<B> {
        Decoder {
            linear: LinearConfig::new(self.d_feature, self.num_columns)
                .with_bias(false)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device),
        }
    }
}

impl<B: Backend> Decoder<B> {
    /// `(batch, d_feature)` → `(batch, num_columns)`.
    pub fn forward(&self, transformed: Tensor<B, 2>) -> Tensor<B, 2> {
        self.linear.forward(transformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_zero_input_reconstructs_zero() {
        let device = Default::default();
        let decoder = DecoderConfig::new(4, 6).init::<TestBackend>(&device);
        let out = decoder.forward(Tensor::zeros([3, 4], &device));
        assert_eq!(out.dims(), [3, 6]);
        let total: f32 = out.abs().sum().into_scalar().elem();
        assert_eq!(total, 0.0, "a bias-free decoder maps zero to zero");
    }
}
