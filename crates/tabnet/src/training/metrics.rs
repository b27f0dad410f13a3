use std::fmt;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::model::bridge::tensor_to_f64;
use crate::training::loss::CompositeLoss;

/// Weighted loss components of one batch (or an average over batches).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LossBreakdown {
    pub total: f64,
    pub target: f64,
    pub sparsity: f64,
    pub reconstruction: f64,
}

impl LossBreakdown {
    /// Read the scalar values out of a composed loss.
    pub fn from_loss<B: Backend>(loss: &CompositeLoss<B>) -> Self {
        Self {
            total: tensor_to_f64(loss.total.clone()),
            target: tensor_to_f64(loss.target.clone()),
            sparsity: tensor_to_f64(loss.sparsity.clone()),
            reconstruction: tensor_to_f64(loss.reconstruction.clone()),
        }
    }

    /// Warnings for values that indicate a diverging run.
    pub fn health_check(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (name, value) in [
            ("total", self.total),
            ("target", self.target),
            ("sparsity", self.sparsity),
            ("reconstruction", self.reconstruction),
        ] {
            if !value.is_finite() {
                warnings.push(format!("{name} loss is {value}"));
            }
        }
        if self.sparsity < 0.0 {
            warnings.push(format!("sparsity loss is negative ({:.4})", self.sparsity));
        }
        warnings
    }
}

impl fmt::Display for LossBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loss={:.4} target={:.4} sparsity={:.5} recon={:.4}",
            self.total, self.target, self.sparsity, self.reconstruction
        )
    }
}

/// Running average of loss breakdowns over a reporting window.
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: LossBreakdown,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, batch: &LossBreakdown) {
        self.sum.total += batch.total;
        self.sum.target += batch.target;
        self.sum.sparsity += batch.sparsity;
        self.sum.reconstruction += batch.reconstruction;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<LossBreakdown> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(LossBreakdown {
            total: self.sum.total / n,
            target: self.sum.target / n,
            sparsity: self.sum.sparsity / n,
            reconstruction: self.sum.reconstruction / n,
        })
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
