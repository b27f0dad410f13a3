//! Loss composition for TabNet training.
//!
//! The total batch loss is
//!
//! ```text
//! target_w · target_loss + sparsity_w · mean(attention_entropy) + reconstruction_w · reconstruction_loss
//! ```
//!
//! where the target loss is cross-entropy for categorical targets and mean
//! squared error for continuous ones, and the reconstruction loss compares the
//! summed decoder output with a detached copy of the normalized input.

use std::fmt;

use burn::nn::loss::{CrossEntropyLossConfig, MseLoss, Reduction};
use burn::prelude::*;
use tabular::{DataRecord, TargetKind};

use crate::model::bridge::{records_to_target, TargetBatch};
use crate::model::tabnet::{TabNetConfig, TabNetOutput};

/// Target objective, selected once from the target kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    CrossEntropy,
    MeanSquaredError,
}

impl Objective {
    pub fn for_target(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Categorical => Self::CrossEntropy,
            TargetKind::Continuous => Self::MeanSquaredError,
        }
    }

    pub fn target_kind(self) -> TargetKind {
        match self {
            Self::CrossEntropy => TargetKind::Categorical,
            Self::MeanSquaredError => TargetKind::Continuous,
        }
    }

    /// Target tensor for `records`, shaped for this objective.
    pub fn targets<B: Backend>(self, records: &[&DataRecord], device: &B::Device) -> TargetBatch<B> {
        records_to_target(records, self.target_kind(), device)
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CrossEntropy => write!(f, "cross-entropy"),
            Self::MeanSquaredError => write!(f, "mse"),
        }
    }
}

/// Weights of the three loss components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossWeights {
    pub target: f64,
    pub sparsity: f64,
    pub reconstruction: f64,
}

impl From<&TabNetConfig> for LossWeights {
    fn from(config: &TabNetConfig) -> Self {
        Self {
            target: config.target_loss_weight,
            sparsity: config.sparsity_loss_weight,
            reconstruction: config.reconstruction_loss_weight,
        }
    }
}

/// Batch loss and its weighted components, each of shape `(1,)`.
#[derive(Debug, Clone)]
pub struct CompositeLoss<B: Backend> {
    pub total: Tensor<B, 1>,
    pub target: Tensor<B, 1>,
    pub sparsity: Tensor<B, 1>,
    pub reconstruction: Tensor<B, 1>,
}

/// Mean target loss over the batch.
///
/// Class targets use cross-entropy on the logits. Value targets use MSE
/// against the first output column.
pub fn target_loss<B: Backend>(output: Tensor<B, 2>, targets: TargetBatch<B>) -> Tensor<B, 1> {
    match targets {
        TargetBatch::Classes(classes) => CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output, classes),
        TargetBatch::Values(values) => {
            let [batch, _] = output.dims();
            let prediction = output.slice([0..batch, 0..1]);
            MseLoss::new().forward(prediction, values, Reduction::Mean)
        }
    }
}

/// Mean attention entropy over the batch.
pub fn sparsity_loss<B: Backend>(attention_entropy: Tensor<B, 1>) -> Tensor<B, 1> {
    attention_entropy.mean()
}

/// MSE between the summed reconstructions and the normalized input. The
/// input side is detached so this term only trains the decoding path.
pub fn reconstruction_loss<B: Backend>(
    decoded: Tensor<B, 2>,
    normalized_input: Tensor<B, 2>,
) -> Tensor<B, 1> {
    MseLoss::new().forward(decoded, normalized_input.detach(), Reduction::Mean)
}

/// Combine a forward pass and its targets into the weighted batch loss.
pub fn compose_loss<B: Backend>(
    output: TabNetOutput<B>,
    targets: TargetBatch<B>,
    weights: LossWeights,
) -> CompositeLoss<B> {
    let target = target_loss(output.output, targets).mul_scalar(weights.target);
    let sparsity = sparsity_loss(output.attention_entropy).mul_scalar(weights.sparsity);
    let reconstruction = reconstruction_loss(output.decoded, output.normalized_input)
        .mul_scalar(weights.reconstruction);

    CompositeLoss {
        total: target.clone() + sparsity.clone() + reconstruction.clone(),
        target,
        sparsity,
        reconstruction,
    }
}
