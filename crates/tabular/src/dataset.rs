//! In-memory record collection with ordered or seeded-random batching.

use crate::error::DataError;
use crate::types::DataRecord;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Iteration order for [`Dataset::reset_order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetOrder {
    /// Insertion order.
    Original,
    /// A fresh permutation drawn from the dataset's seeded generator.
    Random,
}

/// A view over a shared, immutable list of encoded records.
///
/// Splits produced by [`Dataset::random_split`] share the backing records
/// and own disjoint index sets. Each view has its own cursor and generator.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Arc<Vec<DataRecord>>,
    /// Record indices belonging to this view, in insertion order.
    indices: Vec<usize>,
    /// Current iteration order.
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
    standardized: bool,
}

impl Dataset {
    /// Wrap `records`; `seed` drives every random reset and split.
    pub fn new(records: Vec<DataRecord>, seed: u64) -> Self {
        let indices: Vec<usize> = (0..records.len()).collect();
        Self {
            records: Arc::new(records),
            order: indices.clone(),
            indices,
            cursor: 0,
            rng: StdRng::seed_from_u64(seed),
            standardized: false,
        }
    }

    fn view(&self, indices: Vec<usize>, seed: u64) -> Self {
        Self {
            records: Arc::clone(&self.records),
            order: indices.clone(),
            indices,
            cursor: 0,
            rng: StdRng::seed_from_u64(seed),
            standardized: self.standardized,
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Indices into the backing records owned by this view.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Current iteration order as backing-record indices.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Records of this view in insertion order, ignoring the cursor.
    pub fn iter(&self) -> impl Iterator<Item = &DataRecord> + '_ {
        self.indices.iter().map(move |&i| &self.records[i])
    }

    pub fn is_standardized(&self) -> bool {
        self.standardized
    }

    /// Restart iteration, in insertion order or in a new random permutation.
    pub fn reset_order(&mut self, order: DatasetOrder) {
        self.order.clear();
        self.order.extend_from_slice(&self.indices);
        if order == DatasetOrder::Random {
            self.order.shuffle(&mut self.rng);
        }
        self.cursor = 0;
    }

    /// Replace the generator, e.g. to reproduce a run from a known seed.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Up to `batch_size` records from the cursor onward. An empty batch
    /// marks the end of the pass.
    pub fn next_batch(&mut self, batch_size: usize) -> Vec<&DataRecord> {
        let end = (self.cursor + batch_size).min(self.order.len());
        let batch = self.order[self.cursor..end]
            .iter()
            .map(|&i| &self.records[i])
            .collect();
        self.cursor = end;
        batch
    }

    /// Shuffle once and cut consecutive groups of the requested sizes.
    ///
    /// Fails when the sizes add up to more than the dataset holds. When they
    /// add up to less, the leftover records belong to no split.
    pub fn random_split(&mut self, sizes: &[usize]) -> Result<Vec<Dataset>, DataError> {
        let requested: usize = sizes.iter().sum();
        if requested > self.len() {
            return Err(DataError::SplitTooLarge {
                requested,
                available: self.len(),
            });
        }
        if requested < self.len() {
            tracing::debug!(
                requested,
                available = self.len(),
                "Split sizes leave records unassigned"
            );
        }

        let mut shuffled = self.indices.clone();
        shuffled.shuffle(&mut self.rng);

        let mut splits = Vec::with_capacity(sizes.len());
        let mut start = 0;
        for &size in sizes {
            let seed = self.rng.gen();
            splits.push(self.view(shuffled[start..start + size].to_vec(), seed));
            start += size;
        }
        Ok(splits)
    }

    /// Apply `f` to every record of this view, at most once per dataset.
    ///
    /// The backing records are copied first if another view shares them.
    pub(crate) fn standardize_records<F>(&mut self, f: F) -> Result<(), DataError>
    where
        F: Fn(&mut DataRecord),
    {
        if self.standardized {
            return Err(DataError::AlreadyStandardized);
        }
        let records = Arc::make_mut(&mut self.records);
        for &i in &self.indices {
            f(&mut records[i]);
        }
        self.standardized = true;
        Ok(())
    }
}
