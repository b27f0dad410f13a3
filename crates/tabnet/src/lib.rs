//! TabNet for tabular classification and regression.
//!
//! Provides the attentive TabNet network (ghost batch normalization, GLU
//! feature transformers, sparsemax attention, per-step decoders) over a
//! categorical embedding table, the loss composition and Adam training loop,
//! single-file model persistence, and batched prediction with evaluation
//! metrics and attention output.

pub mod checkpoint;
pub mod evaluation;
pub mod inference;
pub mod model;
pub mod training;

pub use checkpoint::{load_model, save_model, SavedModel};
pub use evaluation::{evaluate, write_attention, write_predictions, EvaluationReport};
pub use inference::{Prediction, Predictor};
pub use model::{ConfigError, InputError, TabNet, TabNetConfig, TabNetOutput, TabularNetwork};
pub use training::loss::{LossWeights, Objective};
pub use training::trainer::{init_network, train, TrainingConfig, TrainingSummary};
