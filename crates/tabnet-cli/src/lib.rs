//! Library half of the `tabnet` binary: config loading, the train/test/describe
//! pipelines and their result types. Exposed so the pipelines can be driven
//! from integration tests.

pub mod config;
pub mod pipeline;
pub mod results;
