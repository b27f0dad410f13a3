//! Tensor bridge: converts batches of encoded [`DataRecord`]s into burn
//! tensors and model outputs back into plain vectors.

use burn::prelude::*;
use burn::tensor::TensorData;
use tabular::{DataRecord, TargetKind};

/// Model inputs for one batch. A segment is `None` when the data has no
/// columns of that kind.
#[derive(Debug, Clone)]
pub struct InputBatch<B: Backend> {
    /// `(batch, num_continuous)` standardized values.
    pub continuous: Option<Tensor<B, 2>>,
    /// `(batch, num_categorical)` global embedding indices.
    pub categorical: Option<Tensor<B, 2, Int>>,
}

/// Targets for one batch, shaped for the matching objective.
#[derive(Debug, Clone)]
pub enum TargetBatch<B: Backend> {
    /// Class indices, `(batch,)`.
    Classes(Tensor<B, 1, Int>),
    /// Standardized values, `(batch, 1)`.
    Values(Tensor<B, 2>),
}

/// Build the input tensors for `records`.
///
/// # Panics
/// Panics if `records` is empty.
pub fn records_to_input<B: Backend>(records: &[&DataRecord], device: &B::Device) -> InputBatch<B> {
    assert!(!records.is_empty(), "batch must not be empty");
    let batch = records.len();
    let num_continuous = records[0].continuous.len();
    let num_categorical = records[0].categorical.len();

    let continuous = (num_continuous > 0).then(|| {
        let flat: Vec<f32> = records
            .iter()
            .flat_map(|r| r.continuous.iter().map(|&v| v as f32))
            .collect();
        Tensor::from_data(TensorData::new(flat, [batch, num_continuous]), device)
    });
    let categorical = (num_categorical > 0).then(|| {
        let flat: Vec<i64> = records
            .iter()
            .flat_map(|r| r.categorical.iter().map(|&i| i as i64))
            .collect();
        Tensor::from_data(TensorData::new(flat, [batch, num_categorical]), device)
    });

    InputBatch {
        continuous,
        categorical,
    }
}

/// Build the target tensor for `records`.
pub fn records_to_target<B: Backend>(
    records: &[&DataRecord],
    kind: TargetKind,
    device: &B::Device,
) -> TargetBatch<B> {
    let batch = records.len();
    match kind {
        TargetKind::Categorical => {
            let classes: Vec<i64> = records.iter().map(|r| r.target_class() as i64).collect();
            TargetBatch::Classes(Tensor::from_data(TensorData::new(classes, [batch]), device))
        }
        TargetKind::Continuous => {
            let values: Vec<f32> = records.iter().map(|r| r.target as f32).collect();
            TargetBatch::Values(Tensor::from_data(TensorData::new(values, [batch, 1]), device))
        }
    }
}

/// Split a `(rows, cols)` tensor into one `Vec<f32>` per row.
pub fn tensor_to_rows<B: Backend>(tensor: Tensor<B, 2>) -> Vec<Vec<f32>> {
    let [_, cols] = tensor.dims();
    let flat: Vec<f32> = tensor.into_data().iter::<f32>().collect();
    if cols == 0 {
        return Vec::new();
    }
    flat.chunks(cols).map(<[f32]>::to_vec).collect()
}

/// Extract the values of a 1D tensor as `f64`.
pub fn tensor_to_vec<B: Backend>(tensor: Tensor<B, 1>) -> Vec<f64> {
    tensor.into_data().iter::<f32>().map(f64::from).collect()
}

/// Extract a single scalar as `f64`.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    let value: f32 = tensor.into_scalar().elem();
    value as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn record(continuous: Vec<f64>, categorical: Vec<usize>, target: f64) -> DataRecord {
        DataRecord {
            line: 2,
            continuous,
            categorical,
            target,
        }
    }

    #[test]
    fn test_mixed_input_shapes() {
        let device = Default::default();
        let a = record(vec![0.5, -1.0], vec![3], 1.0);
        let b = record(vec![2.0, 0.0], vec![0], 0.0);
        let input = records_to_input::<TestBackend>(&[&a, &b], &device);

        let continuous = input.continuous.expect("continuous segment");
        assert_eq!(continuous.dims(), [2, 2]);
        assert_eq!(
            continuous.into_data().to_vec::<f32>().unwrap(),
            vec![0.5, -1.0, 2.0, 0.0]
        );
        let categorical = input.categorical.expect("categorical segment");
        assert_eq!(categorical.dims(), [2, 1]);
    }

    #[test]
    fn test_empty_segments_are_none() {
        let device = Default::default();
        let a = record(vec![], vec![1, 2], 0.0);
        let input = records_to_input::<TestBackend>(&[&a], &device);
        assert!(input.continuous.is_none());
        assert!(input.categorical.is_some());

        let b = record(vec![1.0], vec![], 0.0);
        let input = records_to_input::<TestBackend>(&[&b], &device);
        assert!(input.categorical.is_none());
    }

    #[test]
    fn test_targets_by_kind() {
        let device = Default::default();
        let a = record(vec![1.0], vec![], 2.0);
        let b = record(vec![1.0], vec![], 0.0);

        match records_to_target::<TestBackend>(&[&a, &b], TargetKind::Categorical, &device) {
            TargetBatch::Classes(t) => assert_eq!(t.dims(), [2]),
            TargetBatch::Values(_) => panic!("expected class targets"),
        }
        match records_to_target::<TestBackend>(&[&a, &b], TargetKind::Continuous, &device) {
            TargetBatch::Values(t) => assert_eq!(t.dims(), [2, 1]),
            TargetBatch::Classes(_) => panic!("expected value targets"),
        }
    }

    #[test]
    fn test_tensor_to_rows() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], [3, 2]),
            &device,
        );
        let rows = tensor_to_rows(tensor);
        assert_eq!(rows, vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]);
    }

    #[test]
    fn test_tensor_to_vec_and_scalar() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 1>::from_data(TensorData::new(vec![0.5f32, 1.5], [2]), &device);
        assert_eq!(tensor_to_vec(tensor), vec![0.5, 1.5]);

        let scalar = Tensor::<TestBackend, 1>::from_data(TensorData::new(vec![2.5f32], [1]), &device);
        assert!((tensor_to_f64(scalar) - 2.5).abs() < 1e-9);
    }
}
