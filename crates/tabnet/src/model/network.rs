use burn::prelude::*;
use thiserror::Error;

use crate::model::bridge::InputBatch;
use crate::model::embedding::{CategoricalEmbedding, CategoricalEmbeddingConfig};
use crate::model::tabnet::{TabNet, TabNetConfig, TabNetOutput};

/// Categorical embedding table plus TabNet core: the unit that is trained,
/// saved and loaded.
///
/// ```text
/// continuous (batch, n_cont) ─┐
///                             ├─ cat → (batch, num_columns) → TabNet
/// categorical (batch, n_cat) ─┘  via Embedding → (batch, n_cat · d_emb)
/// ```
/// An input batch that does not fit the network's input layout.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("batch has categorical features but the network has no embedding table")]
    MissingEmbedding,
    #[error("batch has neither continuous nor categorical features")]
    NoFeatures,
}

#[derive(Module, Debug)]
pub struct TabularNetwork<B: Backend> {
    /// Absent when the data has no categorical columns.
    embedding: Option<CategoricalEmbedding<B>>,
    tabnet: TabNet<B>,
}

impl<B: Backend> TabularNetwork<B> {
    /// Build a fresh network from a backfilled config.
    pub fn init(config: &TabNetConfig, device: &B::Device) -> Self {
        let embedding = (config.num_categorical_embeddings > 0).then(|| {
            CategoricalEmbeddingConfig::new(
                config.num_categorical_embeddings,
                config.categorical_embedding_dimension,
            )
            .init(device)
        });
        Self {
            embedding,
            tabnet: config.init(device),
        }
    }

    /// Concatenate the continuous segment with the flattened categorical
    /// embeddings. Empty segments are left out.
    pub fn encode_input(&self, batch: InputBatch<B>) -> Result<Tensor<B, 2>, InputError> {
        let mut parts = Vec::with_capacity(2);
        if let Some(continuous) = batch.continuous {
            parts.push(continuous);
        }
        if let Some(indices) = batch.categorical {
            let embedding = self.embedding.as_ref().ok_or(InputError::MissingEmbedding)?;
            parts.push(embedding.forward(indices));
        }
        match parts.len() {
            0 => Err(InputError::NoFeatures),
            1 => Ok(parts.remove(0)),
            _ => Ok(Tensor::cat(parts, 1)),
        }
    }

    /// Run TabNet on an already encoded input.
    pub fn forward_encoded(&self, input: Tensor<B, 2>) -> TabNetOutput<B> {
        self.tabnet.forward(input)
    }

    pub fn forward(&self, batch: InputBatch<B>) -> Result<TabNetOutput<B>, InputError> {
        Ok(self.forward_encoded(self.encode_input(batch)?))
    }

    pub fn tabnet(&self) -> &TabNet<B> {
        &self.tabnet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bridge::records_to_input;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use tabular::DataRecord;

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn config(num_embeddings: usize) -> TabNetConfig {
        TabNetConfig::new()
            .with_num_decision_steps(2)
            .with_feature_dimension(4)
            .with_output_dimension(2)
            .with_categorical_embedding_dimension(3)
            .with_num_categorical_embeddings(num_embeddings)
    }

    fn record(continuous: Vec<f64>, categorical: Vec<usize>) -> DataRecord {
        DataRecord {
            line: 2,
            continuous,
            categorical,
            target: 0.0,
        }
    }

    #[test]
    fn test_mixed_input_width() {
        let device = Default::default();
        let network = TabularNetwork::<TestAutodiffBackend>::init(
            &config(5).with_num_columns(2 + 2 * 3),
            &device,
        );
        let a = record(vec![0.1, 0.2], vec![0, 4]);
        let b = record(vec![0.3, 0.4], vec![1, 2]);
        let input = network.encode_input(records_to_input(&[&a, &b], &device)).unwrap();
        assert_eq!(input.dims(), [2, 8]);
        assert_eq!(network.forward_encoded(input).output.dims(), [2, 2]);
    }

    #[test]
    fn test_continuous_only_has_no_embedding() {
        let device = Default::default();
        let network =
            TabularNetwork::<TestAutodiffBackend>::init(&config(0).with_num_columns(3), &device);
        assert!(network.embedding.is_none());
        let a = record(vec![0.1, 0.2, 0.3], vec![]);
        let out = network.forward(records_to_input(&[&a, &a], &device)).unwrap();
        assert_eq!(out.decoded.dims(), [2, 3]);
    }

    #[test]
    fn test_categorical_only_input() {
        let device = Default::default();
        let network =
            TabularNetwork::<TestAutodiffBackend>::init(&config(4).with_num_columns(3), &device);
        let a = record(vec![], vec![2]);
        let b = record(vec![], vec![3]);
        let input = network.encode_input(records_to_input(&[&a, &b], &device)).unwrap();
        assert_eq!(input.dims(), [2, 3]);
    }

    #[test]
    fn test_categorical_without_embedding_is_an_error() {
        let device = Default::default();
        let network =
            TabularNetwork::<TestAutodiffBackend>::init(&config(0).with_num_columns(2), &device);
        let a = record(vec![0.1], vec![0]);
        let err = network.encode_input(records_to_input(&[&a], &device)).unwrap_err();
        assert_eq!(err, InputError::MissingEmbedding);
    }

    #[test]
    fn test_featureless_batch_is_an_error() {
        let device = Default::default();
        let network =
            TabularNetwork::<TestAutodiffBackend>::init(&config(4).with_num_columns(3), &device);
        let a = record(vec![], vec![]);
        let err = network.forward(records_to_input(&[&a, &a], &device)).unwrap_err();
        assert_eq!(err, InputError::NoFeatures);
    }
}
