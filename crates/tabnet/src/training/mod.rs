//! Training pipeline: loss composition, loss metrics with health checks, and
//! the Adam training loop.

pub mod loss;
pub mod metrics;
pub mod trainer;
