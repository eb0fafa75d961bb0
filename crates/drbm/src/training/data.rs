//! In-memory labelled datasets and mini-batching.
//!
//! Examples are kept as plain `f64` rows and turned into tensors of the
//! model's backend one batch at a time. Labels are stored as class indices
//! and expanded to one-hot targets per batch.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::DrbmError;
use crate::model::bridge::{flat_to_tensor, int_tensor_to_vec, one_hot, tensor_to_rows};
use crate::model::Drbm;

/// Labelled examples: `inputs[n]` has length `input_num`, `labels[n] < output_num`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub input_num: usize,
    pub output_num: usize,
    pub inputs: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

/// One mini-batch on a concrete backend.
#[derive(Debug, Clone)]
pub struct Batch<B: Backend> {
    /// Shape `(n, I)`.
    pub inputs: Tensor<B, 2>,
    /// One-hot targets, shape `(n, K)`.
    pub targets: Tensor<B, 2>,
    /// Class indices, length `n`.
    pub labels: Vec<usize>,
}

impl Dataset {
    /// Build a dataset, validating row widths and label range.
    pub fn new(
        input_num: usize,
        output_num: usize,
        inputs: Vec<Vec<f64>>,
        labels: Vec<usize>,
    ) -> Result<Self, DrbmError> {
        let dataset = Self {
            input_num,
            output_num,
            inputs,
            labels,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Synthesise `n` labelled examples by stick-breaking `generator`.
    pub fn from_generator<B: Backend, R: Rng + ?Sized>(generator: &Drbm<B>, n: usize, rng: &mut R) -> Self {
        let (data, category) = generator.stick_break(n, rng);
        Self {
            input_num: generator.input_num(),
            output_num: generator.output_num(),
            inputs: tensor_to_rows(data),
            labels: int_tensor_to_vec(category),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Batches in storage order; the final batch may be short.
    ///
    /// # Panics
    /// If `minibatch_size` is zero. [`TrainingConfig::validate`] rejects that
    /// before any loop reaches here.
    ///
    /// [`TrainingConfig::validate`]: crate::training::TrainingConfig::validate
    pub fn batches<'a, B: Backend>(
        &'a self,
        minibatch_size: usize,
        device: &'a B::Device,
    ) -> impl Iterator<Item = Batch<B>> + 'a {
        let order: Vec<usize> = (0..self.len()).collect();
        self.batches_in(order, minibatch_size, device)
    }

    /// Batches over a fresh random permutation of the examples.
    ///
    /// # Panics
    /// If `minibatch_size` is zero.
    pub fn shuffled_batches<'a, B: Backend>(
        &'a self,
        minibatch_size: usize,
        rng: &mut dyn RngCore,
        device: &'a B::Device,
    ) -> impl Iterator<Item = Batch<B>> + 'a {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        self.batches_in(order, minibatch_size, device)
    }

    fn batches_in<'a, B: Backend>(
        &'a self,
        order: Vec<usize>,
        minibatch_size: usize,
        device: &'a B::Device,
    ) -> impl Iterator<Item = Batch<B>> + 'a {
        let chunks: Vec<Vec<usize>> = order.chunks(minibatch_size).map(<[usize]>::to_vec).collect();
        chunks.into_iter().map(move |indices| self.batch(&indices, device))
    }

    fn batch<B: Backend>(&self, indices: &[usize], device: &B::Device) -> Batch<B> {
        let flat: Vec<f64> = indices
            .iter()
            .flat_map(|&i| self.inputs[i].iter().copied())
            .collect();
        let labels: Vec<usize> = indices.iter().map(|&i| self.labels[i]).collect();
        Batch {
            inputs: flat_to_tensor(flat, [indices.len(), self.input_num], device),
            targets: one_hot(&labels, self.output_num, device),
            labels,
        }
    }

    fn validate(&self) -> Result<(), DrbmError> {
        if self.inputs.len() != self.labels.len() {
            return Err(DrbmError::MalformedRecord(format!(
                "dataset has {} inputs but {} labels",
                self.inputs.len(),
                self.labels.len()
            )));
        }
        if let Some((n, row)) = self
            .inputs
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != self.input_num)
        {
            return Err(DrbmError::ShapeMismatch {
                param: format!("inputs[{n}]"),
                expected: vec![self.input_num],
                found: vec![row.len()],
            });
        }
        if let Some((n, label)) = self
            .labels
            .iter()
            .enumerate()
            .find(|(_, label)| **label >= self.output_num)
        {
            return Err(DrbmError::MalformedRecord(format!(
                "label {label} at index {n} is outside 0..{}",
                self.output_num
            )));
        }
        Ok(())
    }

    /// Read a dataset from a JSON file.
    pub fn load(path: &Path) -> Result<Self, DrbmError> {
        let reader = BufReader::new(File::open(path)?);
        let dataset: Self = serde_json::from_reader(reader)?;
        dataset.validate()?;
        tracing::info!(path = %path.display(), examples = dataset.len(), "Loaded dataset");
        Ok(dataset)
    }

    /// Write the dataset as JSON.
    pub fn save(&self, path: &Path) -> Result<(), DrbmError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        tracing::info!(path = %path.display(), examples = self.len(), "Saved dataset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    use crate::model::DrbmConfig;

    type TestBackend = NdArray<f32>;

    fn toy() -> Dataset {
        let inputs = (0..10).map(|n| vec![n as f64, -(n as f64)]).collect();
        let labels = (0..10).map(|n| n % 3).collect();
        Dataset::new(2, 3, inputs, labels).unwrap()
    }

    #[test]
    fn test_batches_cover_dataset_in_order() {
        let device = Default::default();
        let data = toy();
        let batches: Vec<Batch<TestBackend>> = data.batches(4, &device).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].inputs.dims(), [4, 2]);
        assert_eq!(batches[2].inputs.dims(), [2, 2]);
        assert_eq!(batches[2].targets.dims(), [2, 3]);

        let labels: Vec<usize> = batches.iter().flat_map(|b| b.labels.clone()).collect();
        assert_eq!(labels, data.labels);
    }

    #[test]
    fn test_shuffled_batches_are_a_permutation() {
        let device = Default::default();
        let data = toy();
        let mut rng = StdRng::seed_from_u64(11);
        let mut firsts: Vec<f64> = data
            .shuffled_batches::<TestBackend>(3, &mut rng, &device)
            .flat_map(|b| tensor_to_rows(b.inputs).into_iter().map(|row| row[0]))
            .collect();
        assert_eq!(firsts.len(), 10);
        firsts.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let expected: Vec<f64> = (0..10).map(|n| n as f64).collect();
        assert_eq!(firsts, expected);
    }

    #[test]
    fn test_targets_are_one_hot_of_labels() {
        let device = Default::default();
        let data = toy();
        let batch: Batch<TestBackend> = data.batches(10, &device).next().unwrap();
        for (row, label) in tensor_to_rows(batch.targets).iter().zip(&batch.labels) {
            assert_eq!(row.iter().sum::<f64>(), 1.0);
            assert_eq!(row[*label], 1.0);
        }
    }

    #[test]
    fn test_validation_rejects_bad_data() {
        assert!(matches!(
            Dataset::new(2, 3, vec![vec![0.0, 1.0]], vec![0, 1]),
            Err(DrbmError::MalformedRecord(_))
        ));
        assert!(matches!(
            Dataset::new(2, 3, vec![vec![0.0]], vec![0]),
            Err(DrbmError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            Dataset::new(2, 3, vec![vec![0.0, 1.0]], vec![3]),
            Err(DrbmError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_from_generator() {
        let device = Default::default();
        let generator = DrbmConfig::new(5, 4, 3)
            .with_random_bias(true)
            .init::<TestBackend>(&device)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let data = Dataset::from_generator(&generator, 40, &mut rng);
        assert_eq!(data.len(), 40);
        assert_eq!(data.input_num, 5);
        assert!(data.inputs.iter().all(|row| row.len() == 5));
        assert!(data.labels.iter().all(|&l| l < 3));
    }

    #[test]
    fn test_json_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.json");
        let data = toy();
        data.save(&path).unwrap();
        assert_eq!(Dataset::load(&path).unwrap(), data);
    }
}
