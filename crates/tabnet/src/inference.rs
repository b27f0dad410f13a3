//! Batched inference for trained networks.
//!
//! `Predictor<B>` runs inference-mode forward passes over a [`Dataset`] and
//! returns, per record, the raw output row and the attention masks mapped
//! back onto feature columns.

use burn::prelude::*;
use tabular::{DataRecord, Dataset, Metadata};

use crate::checkpoint::SavedModel;
use crate::model::bridge::{records_to_input, tensor_to_rows};
use crate::model::network::TabularNetwork;

/// Output of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Physical file line of the source row.
    pub line: u64,
    /// Logits (classification) or the standardized prediction (regression).
    pub output: Vec<f32>,
    /// One entry per mask-producing decision step, each with one weight per
    /// feature column in [`Metadata::feature_names`] order.
    pub masks: Vec<Vec<f32>>,
}

/// Runs a trained network over encoded records.
///
/// Masks are only recorded on a backend without autodiff; use the inner
/// backend of a trained network (`AutodiffModule::valid`).
pub struct Predictor<B: Backend> {
    network: TabularNetwork<B>,
    metadata: Metadata,
    embedding_dimension: usize,
    batch_size: usize,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(
        network: TabularNetwork<B>,
        metadata: Metadata,
        embedding_dimension: usize,
        device: B::Device,
    ) -> Self {
        Self {
            network,
            metadata,
            embedding_dimension,
            batch_size: 256,
            device,
        }
    }

    pub fn from_saved(saved: SavedModel<B>, device: B::Device) -> Self {
        Self::new(
            saved.network,
            saved.metadata,
            saved.config.categorical_embedding_dimension,
            device,
        )
    }

    /// Records per forward pass. Inference normalization uses running
    /// statistics, so this only bounds memory.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Predict every record of `dataset` in its insertion order.
    pub fn predict(&self, dataset: &Dataset) -> anyhow::Result<Vec<Prediction>> {
        let records: Vec<&DataRecord> = dataset.iter().collect();
        let mut predictions = Vec::with_capacity(records.len());
        for chunk in records.chunks(self.batch_size) {
            predictions.extend(self.predict_batch(chunk)?);
        }
        tracing::debug!(records = predictions.len(), "Predicted dataset");
        Ok(predictions)
    }

    /// Predict one batch of records.
    pub fn predict_batch(&self, records: &[&DataRecord]) -> anyhow::Result<Vec<Prediction>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let output = self
            .network
            .forward(records_to_input::<B>(records, &self.device))?;

        let rows = tensor_to_rows(output.output);
        let step_masks: Vec<Vec<Vec<f32>>> = output
            .attention_masks
            .into_iter()
            .map(tensor_to_rows)
            .collect();

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| Prediction {
                line: records[i].line,
                output: row,
                masks: step_masks
                    .iter()
                    .map(|mask| {
                        aggregate_mask(
                            &mask[i],
                            self.metadata.num_continuous(),
                            self.metadata.num_categorical(),
                            self.embedding_dimension,
                        )
                    })
                    .collect(),
            })
            .collect())
    }
}

/// Map one mask row over input slots back onto feature columns.
///
/// Continuous columns own one slot each; every categorical column owns
/// `embedding_dimension` consecutive slots and reports their sum.
pub fn aggregate_mask(
    mask: &[f32],
    num_continuous: usize,
    num_categorical: usize,
    embedding_dimension: usize,
) -> Vec<f32> {
    debug_assert_eq!(mask.len(), num_continuous + num_categorical * embedding_dimension);
    let (continuous, categorical) = mask.split_at(num_continuous.min(mask.len()));
    continuous
        .iter()
        .copied()
        .chain(
            categorical
                .chunks(embedding_dimension.max(1))
                .take(num_categorical)
                .map(|slots| slots.iter().sum()),
        )
        .collect()
}
