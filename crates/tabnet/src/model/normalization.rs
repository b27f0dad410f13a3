use burn::module::{Param, RunningState};
use burn::prelude::*;

/// Configuration for a ghost batch normalization layer.
#[derive(Config, Debug)]
pub struct GhostBatchNormConfig {
    /// Number of features (columns) to normalize.
    pub num_features: usize,
    /// Weight of the old running statistics in each update.
    #[config(default = 0.9)]
    pub momentum: f64,
    /// Rows per virtual batch during training.
    #[config(default = 128)]
    pub virtual_batch_size: usize,
    /// Added to the variance before the square root.
    #[config(default = 1e-5)]
    pub epsilon: f64,
}

/// Batch normalization over virtual batches.
///
/// Training passes (autodiff backends) split the batch into chunks of
/// `virtual_batch_size` rows and normalize each chunk with its own biased
/// mean and variance. A single leftover row has zero variance, so it joins
/// the chunk before it instead of standing alone. The running statistics are updated once per call from
/// the full-batch statistics:
///
/// ```text
/// running = momentum * running + (1 - momentum) * batch
/// ```
///
/// Inference passes normalize with the running statistics.
#[derive(Module, Debug)]
pub struct GhostBatchNorm<B: Backend> {
    /// Scale, shape (num_features,). Initialized to 1.
    gamma: Param<Tensor<B, 1>>,
    /// Shift, shape (num_features,). Initialized to 0.
    beta: Param<Tensor<B, 1>>,
    running_mean: RunningState<Tensor<B, 1>>,
    running_var: RunningState<Tensor<B, 1>>,
    momentum: f64,
    virtual_batch_size: usize,
    epsilon: f64,
}

impl GhostBatchNormConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> GhostBatchNorm<B> {
        GhostBatchNorm {
            gamma: Param::from_tensor(Tensor::ones([self.num_features], device)),
            beta: Param::from_tensor(Tensor::zeros([self.num_features], device)),
            running_mean: RunningState::new(Tensor::zeros([self.num_features], device)),
            running_var: RunningState::new(Tensor::ones([self.num_features], device)),
            momentum: self.momentum,
            virtual_batch_size: self.virtual_batch_size.max(1),
            epsilon: self.epsilon,
        }
    }
}

impl<B: Backend> GhostBatchNorm<B> {
    /// Input and output shape: `(batch, num_features)`.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let normalized = if B::ad_enabled() {
            self.forward_train(input)
        } else {
            self.forward_inference(input)
        };
        normalized * self.gamma.val().unsqueeze::<2>() + self.beta.val().unsqueeze::<2>()
    }

    fn forward_train(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, features] = input.dims();

        let chunks: Vec<Tensor<B, 2>> = virtual_batches(batch, self.virtual_batch_size)
            .into_iter()
            .map(|(start, end)| {
                let chunk = input.clone().slice([start..end, 0..features]);
                let (mean, var) = mean_var(chunk.clone());
                (chunk - mean) / var.add_scalar(self.epsilon).sqrt()
            })
            .collect();

        let (batch_mean, batch_var) = mean_var(input.detach());
        let keep = self.momentum;
        let running_mean = self.running_mean.value_sync().mul_scalar(keep)
            + batch_mean.squeeze::<1>(0).mul_scalar(1.0 - keep);
        let running_var = self.running_var.value_sync().mul_scalar(keep)
            + batch_var.squeeze::<1>(0).mul_scalar(1.0 - keep);
        self.running_mean.update(running_mean.detach());
        self.running_var.update(running_var.detach());

        Tensor::cat(chunks, 0)
    }

    fn forward_inference(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mean = self.running_mean.value().unsqueeze::<2>();
        let var = self.running_var.value().unsqueeze::<2>();
        (input - mean) / var.add_scalar(self.epsilon).sqrt()
    }

    /// Current running mean, shape (num_features,).
    pub fn running_mean(&self) -> Tensor<B, 1> {
        self.running_mean.value()
    }

    /// Current running variance, shape (num_features,).
    pub fn running_var(&self) -> Tensor<B, 1> {
        self.running_var.value()
    }
}

/// Row ranges `[start, end)` of the virtual batches. A one-row tail is
/// merged into the previous range.
fn virtual_batches(batch: usize, size: usize) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = (0..batch)
        .step_by(size)
        .map(|start| (start, (start + size).min(batch)))
        .collect();
    if ranges.len() > 1 && ranges[ranges.len() - 1].1 - ranges[ranges.len() - 1].0 == 1 {
        if let Some((_, end)) = ranges.pop() {
            if let Some(last) = ranges.last_mut() {
                last.1 = end;
            }
        }
    }
    ranges
}

/// Column mean and biased variance, both shape (1, features).
fn mean_var<B: Backend>(x: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let mean = x.clone().mean_dim(0);
    let var = (x - mean.clone()).powf_scalar(2.0).mean_dim(0);
    (mean, var)
}
