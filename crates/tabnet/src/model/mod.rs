//! TabNet model components: ghost batch normalization, sparsemax, GLU
//! feature transformers, attentive transformers, reconstruction decoders,
//! the decision-step core, categorical embeddings, and the tensor bridge
//! between encoded records and burn tensors.

pub mod attention;
pub mod bridge;
pub mod decoder;
pub mod embedding;
pub mod feature_transformer;
pub mod network;
pub mod normalization;
pub mod sparsemax;
pub mod tabnet;

pub use network::{InputError, TabularNetwork};
pub use tabnet::{ConfigError, TabNet, TabNetConfig, TabNetOutput};
