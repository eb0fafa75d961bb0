//! Tensor bridge: conversions between plain nested `f64` lists and burn tensors.
//!
//! Persisted records and datasets store numbers as `f64` regardless of the
//! model dtype; `f32 → f64 → f32` is exact, so a save/load cycle is lossless.

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::DrbmError;

/// Build a 1D tensor from `values`, checking the declared length.
pub fn vector_to_tensor<B: Backend>(
    name: &str,
    values: &[f64],
    len: usize,
    device: &B::Device,
) -> Result<Tensor<B, 1>, DrbmError> {
    if values.len() != len {
        return Err(DrbmError::ShapeMismatch {
            param: name.to_string(),
            expected: vec![len],
            found: vec![values.len()],
        });
    }
    Ok(Tensor::from_data(
        TensorData::new(values.to_vec(), [len]).convert::<B::FloatElem>(),
        device,
    ))
}

/// Build a 2D tensor from row-major nested lists, checking the declared shape.
///
/// Ragged input is reported with the length of the first offending row.
pub fn matrix_to_tensor<B: Backend>(
    name: &str,
    rows: &[Vec<f64>],
    shape: [usize; 2],
    device: &B::Device,
) -> Result<Tensor<B, 2>, DrbmError> {
    let [n_rows, n_cols] = shape;
    let mismatch = |found: Vec<usize>| DrbmError::ShapeMismatch {
        param: name.to_string(),
        expected: vec![n_rows, n_cols],
        found,
    };

    if rows.len() != n_rows {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        return Err(mismatch(vec![rows.len(), width]));
    }
    if let Some(row) = rows.iter().find(|row| row.len() != n_cols) {
        return Err(mismatch(vec![rows.len(), row.len()]));
    }

    let flat: Vec<f64> = rows.iter().flat_map(|row| row.iter().copied()).collect();
    Ok(Tensor::from_data(
        TensorData::new(flat, shape).convert::<B::FloatElem>(),
        device,
    ))
}

/// Build an `(n, dim)` tensor from a flat row-major buffer.
pub fn flat_to_tensor<B: Backend>(flat: Vec<f64>, shape: [usize; 2], device: &B::Device) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(flat, shape).convert::<B::FloatElem>(), device)
}

/// One-hot encode class indices into an `(n, classes)` float tensor.
pub fn one_hot<B: Backend>(labels: &[usize], classes: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut flat = vec![0.0_f64; labels.len() * classes];
    for (row, &label) in labels.iter().enumerate() {
        flat[row * classes + label] = 1.0;
    }
    flat_to_tensor(flat, [labels.len(), classes], device)
}

/// Extract `f64` values from a 1D float tensor.
pub fn tensor_to_vec<B: Backend>(tensor: Tensor<B, 1>) -> Vec<f64> {
    tensor.into_data().iter::<f64>().collect()
}

/// Extract row-major nested lists from a 2D float tensor.
pub fn tensor_to_rows<B: Backend>(tensor: Tensor<B, 2>) -> Vec<Vec<f64>> {
    let [_, n_cols] = tensor.dims();
    let flat: Vec<f64> = tensor.into_data().iter::<f64>().collect();
    if n_cols == 0 {
        return Vec::new();
    }
    flat.chunks(n_cols).map(<[f64]>::to_vec).collect()
}

/// Extract class indices from a 1D int tensor.
pub fn int_tensor_to_vec<B: Backend>(tensor: Tensor<B, 1, Int>) -> Vec<usize> {
    tensor
        .into_data()
        .iter::<i64>()
        .map(|v| v as usize)
        .collect()
}

/// Extract a single `f64` scalar from a one-element tensor.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_matrix_round_trip() {
        let device = Default::default();
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.5]];
        let tensor = matrix_to_tensor::<TestBackend>("w1", &rows, [2, 3], &device).unwrap();
        assert_eq!(tensor.dims(), [2, 3]);
        assert_eq!(tensor_to_rows(tensor), rows);
    }

    #[test]
    fn test_matrix_shape_errors() {
        let device = Default::default();

        let short = vec![vec![1.0, 2.0]];
        let err = matrix_to_tensor::<TestBackend>("w2", &short, [2, 2], &device).unwrap_err();
        match err {
            DrbmError::ShapeMismatch { param, expected, found } => {
                assert_eq!(param, "w2");
                assert_eq!(expected, vec![2, 2]);
                assert_eq!(found, vec![1, 2]);
            }
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }

        let ragged = vec![vec![1.0, 2.0], vec![3.0]];
        let err = matrix_to_tensor::<TestBackend>("w2", &ragged, [2, 2], &device).unwrap_err();
        assert!(matches!(err, DrbmError::ShapeMismatch { ref found, .. } if found == &vec![2, 1]));
    }

    #[test]
    fn test_vector_length_checked() {
        let device = Default::default();
        let ok = vector_to_tensor::<TestBackend>("b1", &[0.5, -0.25], 2, &device).unwrap();
        assert_eq!(tensor_to_vec(ok), vec![0.5, -0.25]);
        assert!(vector_to_tensor::<TestBackend>("b1", &[0.5], 2, &device).is_err());
    }

    #[test]
    fn test_one_hot_rows() {
        let device = Default::default();
        let labels = one_hot::<TestBackend>(&[2, 0, 1], 3, &device);
        assert_eq!(
            tensor_to_rows(labels),
            vec![
                vec![0.0, 0.0, 1.0],
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
            ]
        );
    }

    #[test]
    fn test_scalar_extraction() {
        let device = Default::default();
        let t = Tensor::<TestBackend, 1>::from_data(TensorData::from([42.0_f32]), &device);
        assert!((tensor_to_f64(t) - 42.0).abs() < 1e-6);
    }
}
