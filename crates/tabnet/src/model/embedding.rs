use burn::nn::{Embedding, EmbeddingConfig};
use burn::prelude::*;

/// Configuration for the global categorical embedding table.
#[derive(Config, Debug)]
pub struct CategoricalEmbeddingConfig {
    /// Rows in the table: one per (column, value) pair seen in training.
    pub num_embeddings: usize,
    /// Width of every embedding row.
    pub d_embedding: usize,
}

/// One table shared by every categorical column, indexed by the global
/// (column, value) index assigned during encoding.
#[derive(Module, Debug)]
pub struct CategoricalEmbedding<B: Backend> {
    table: Embedding<B>,
    d_embedding: usize,
}

impl CategoricalEmbeddingConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CategoricalEmbedding<B> {
        CategoricalEmbedding {
            table: EmbeddingConfig::new(self.num_embeddings, self.d_embedding).init(device),
            d_embedding: self.d_embedding,
        }
    }
}

impl<B: Backend> CategoricalEmbedding<B> {
    /// `(batch, num_categorical)` indices → `(batch, num_categorical · d_embedding)`,
    /// one embedding row per column in column order.
    pub fn forward(&self, indices: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch, columns] = indices.dims();
        self.table
            .forward(indices)
            .reshape([batch, columns * self.d_embedding])
    }

    pub fn d_embedding(&self) -> usize {
        self.d_embedding
    }
}
