//! DRBM training loops: categorical (labelled data) and generative
//! (self-distillation against a generator model).
//!
//! Both loops take the model by value and return it, because the optimizer
//! consumes the parameter module and hands back an updated one. Evaluation
//! passes run on the inner backend through [`Drbm::valid`].

use burn::optim::Optimizer;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::Rng;

use crate::error::DrbmError;
use crate::model::bridge::{int_tensor_to_vec, tensor_to_f64};
use crate::model::{Drbm, DrbmParams};
use crate::training::data::{Batch, Dataset};
use crate::training::log::LearningLog;
use crate::training::metrics::{RunningAccuracy, RunningMean};

/// Configuration for DRBM training.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Number of passes over the training stream.
    pub epochs: usize,
    /// Examples per optimizer step.
    #[config(default = 100)]
    pub minibatch_size: usize,
    /// Learning rate handed to the optimizer each step.
    #[config(default = 0.002)]
    pub learning_rate: f64,
    /// Generator samples drawn for the end-of-epoch KL estimate.
    #[config(default = 1000)]
    pub kl_sample_size: usize,
}

impl TrainingConfig {
    /// Reject settings no loop can run with.
    pub fn validate(&self) -> Result<(), DrbmError> {
        if self.minibatch_size == 0 {
            return Err(DrbmError::InvalidConfig("minibatch_size must be at least 1".into()));
        }
        if self.kl_sample_size == 0 {
            return Err(DrbmError::InvalidConfig("kl_sample_size must be at least 1".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(DrbmError::InvalidConfig(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Metrics reported after one categorical epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoricalEpoch {
    pub epoch: usize,
    /// Optimizer steps taken.
    pub batches: usize,
    pub train_error: f64,
    pub train_nll: f64,
    pub test_error: f64,
    pub test_nll: f64,
}

impl CategoricalEpoch {
    /// Append this epoch's four scalars to `log`.
    pub fn record(&self, log: &mut LearningLog) {
        log.make_log(self.epoch, "train-error", self.train_error);
        log.make_log(self.epoch, "train-nloglikelihood", self.train_nll);
        log.make_log(self.epoch, "test-error", self.test_error);
        log.make_log(self.epoch, "test-nloglikelihood", self.test_nll);
    }
}

/// Metrics reported after one generative epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerativeEpoch {
    pub epoch: usize,
    pub batches: usize,
    pub kl_divergence: f64,
    pub nll: f64,
}

impl GenerativeEpoch {
    pub fn record(&self, log: &mut LearningLog) {
        log.make_log(self.epoch, "kl-divergence", self.kl_divergence);
        log.make_log(self.epoch, "nloglikelihood", self.nll);
    }
}

/// Reject a dataset whose dimensions disagree with the model topology.
fn check_dataset<B: Backend>(model: &Drbm<B>, data: &Dataset, name: &str) -> Result<(), DrbmError> {
    if data.input_num != model.input_num() || data.output_num != model.output_num() {
        return Err(DrbmError::ShapeMismatch {
            param: name.to_string(),
            expected: vec![model.input_num(), model.output_num()],
            found: vec![data.input_num, data.output_num],
        });
    }
    Ok(())
}

/// Forward pass, NLL, backward pass, and optimizer step on one batch.
///
/// Returns the updated model, the batch loss, and the predicted classes
/// (computed before the update).
fn train_step<B, O>(
    model: Drbm<B>,
    optimizer: &mut O,
    learning_rate: f64,
    batch: Batch<B>,
) -> (Drbm<B>, f64, Vec<usize>)
where
    B: AutodiffBackend,
    O: Optimizer<DrbmParams<B>, B>,
{
    let predicted = int_tensor_to_vec(model.valid().predict(batch.inputs.clone().inner()));
    let probs = model.probability(batch.inputs);
    let loss = model.negative_log_likelihood(probs, batch.targets);
    let loss_val = tensor_to_f64(loss.clone());

    let model = model.optimize(optimizer, learning_rate, loss);
    (model, loss_val, predicted)
}

/// One shuffled pass over `train`, accumulating batch losses and accuracy.
fn train_epoch<B, O, R>(
    config: &TrainingConfig,
    mut model: Drbm<B>,
    optimizer: &mut O,
    train: &Dataset,
    epoch: usize,
    loss: &mut RunningMean,
    accuracy: &mut RunningAccuracy,
    rng: &mut R,
    device: &B::Device,
) -> Drbm<B>
where
    B: AutodiffBackend,
    O: Optimizer<DrbmParams<B>, B>,
    R: Rng,
{
    for (step, batch) in train
        .shuffled_batches::<B>(config.minibatch_size, rng, device)
        .enumerate()
    {
        let labels = batch.labels.clone();
        let (updated, loss_val, predicted) = train_step(model, optimizer, config.learning_rate, batch);
        model = updated;

        if !loss_val.is_finite() {
            tracing::warn!(epoch, step, loss = loss_val, "Non-finite training loss");
        }
        loss.update(loss_val);
        accuracy.update(&predicted, &labels);
    }
    model
}

/// Run one categorical epoch: a shuffled training pass with updates, then an
/// in-order evaluation pass over `test` without updates.
pub fn categorical_epoch<B, O, R>(
    config: &TrainingConfig,
    model: Drbm<B>,
    optimizer: &mut O,
    train: &Dataset,
    test: &Dataset,
    epoch: usize,
    rng: &mut R,
    device: &B::Device,
) -> Result<(Drbm<B>, CategoricalEpoch), DrbmError>
where
    B: AutodiffBackend,
    O: Optimizer<DrbmParams<B>, B>,
    R: Rng,
{
    config.validate()?;
    check_dataset(&model, train, "train dataset")?;
    check_dataset(&model, test, "test dataset")?;

    let mut train_loss = RunningMean::new();
    let mut train_accuracy = RunningAccuracy::new();
    let model = train_epoch(
        config,
        model,
        optimizer,
        train,
        epoch,
        &mut train_loss,
        &mut train_accuracy,
        rng,
        device,
    );

    let mut test_loss = RunningMean::new();
    let mut test_accuracy = RunningAccuracy::new();
    let eval_model = model.valid();
    for batch in test.batches::<B::InnerBackend>(config.minibatch_size, device) {
        let predicted = int_tensor_to_vec(eval_model.predict(batch.inputs.clone()));
        let probs = eval_model.probability(batch.inputs);
        let loss = eval_model.negative_log_likelihood(probs, batch.targets);
        test_loss.update(tensor_to_f64(loss));
        test_accuracy.update(&predicted, &batch.labels);
    }

    let summary = CategoricalEpoch {
        epoch,
        batches: train_loss.count(),
        train_error: train_accuracy.error(),
        train_nll: train_loss.result(),
        test_error: test_accuracy.error(),
        test_nll: test_loss.result(),
    };

    tracing::info!(
        epoch = epoch + 1,
        batches = summary.batches,
        train_nll = summary.train_nll,
        train_accuracy = train_accuracy.result() * 100.0,
        test_nll = summary.test_nll,
        test_accuracy = test_accuracy.result() * 100.0,
        "Categorical epoch"
    );

    Ok((model, summary))
}

/// Run one generative epoch: a shuffled training pass on data synthesised by
/// `generator`, then a sampled KL estimate against it.
///
/// The generator lives on the inner backend, so its parameters can never
/// receive gradients from the trainee's optimizer.
pub fn generative_epoch<B, O, R>(
    config: &TrainingConfig,
    model: Drbm<B>,
    optimizer: &mut O,
    train: &Dataset,
    generator: &Drbm<B::InnerBackend>,
    epoch: usize,
    rng: &mut R,
    device: &B::Device,
) -> Result<(Drbm<B>, GenerativeEpoch), DrbmError>
where
    B: AutodiffBackend,
    O: Optimizer<DrbmParams<B>, B>,
    R: Rng,
{
    config.validate()?;
    check_dataset(&model, train, "train dataset")?;
    check_dataset(generator, train, "generator")?;

    let mut train_loss = RunningMean::new();
    let mut train_accuracy = RunningAccuracy::new();
    let model = train_epoch(
        config,
        model,
        optimizer,
        train,
        epoch,
        &mut train_loss,
        &mut train_accuracy,
        rng,
        device,
    );

    let kl = model.valid().kl_divergence(generator, config.kl_sample_size);
    let summary = GenerativeEpoch {
        epoch,
        batches: train_loss.count(),
        kl_divergence: tensor_to_f64(kl),
        nll: train_loss.result(),
    };

    tracing::info!(
        epoch = epoch + 1,
        batches = summary.batches,
        nll = summary.nll,
        kl_divergence = summary.kl_divergence,
        "Generative epoch"
    );

    Ok((model, summary))
}

/// Train on labelled data for `config.epochs` epochs, logging
/// `train-error`, `train-nloglikelihood`, `test-error` and
/// `test-nloglikelihood` per epoch.
pub fn fit_categorical<B, O, R>(
    config: &TrainingConfig,
    mut model: Drbm<B>,
    optimizer: &mut O,
    train: &Dataset,
    test: &Dataset,
    log: &mut LearningLog,
    rng: &mut R,
    device: &B::Device,
) -> Result<Drbm<B>, DrbmError>
where
    B: AutodiffBackend,
    O: Optimizer<DrbmParams<B>, B>,
    R: Rng,
{
    for epoch in 0..config.epochs {
        let (updated, summary) = categorical_epoch(config, model, optimizer, train, test, epoch, rng, device)?;
        model = updated;
        summary.record(log);
    }
    Ok(model)
}

/// Train against `generator` for `config.epochs` epochs, logging
/// `kl-divergence` and `nloglikelihood` per epoch.
pub fn fit_generative<B, O, R>(
    config: &TrainingConfig,
    mut model: Drbm<B>,
    optimizer: &mut O,
    train: &Dataset,
    generator: &Drbm<B::InnerBackend>,
    log: &mut LearningLog,
    rng: &mut R,
    device: &B::Device,
) -> Result<Drbm<B>, DrbmError>
where
    B: AutodiffBackend,
    O: Optimizer<DrbmParams<B>, B>,
    R: Rng,
{
    for epoch in 0..config.epochs {
        let (updated, summary) =
            generative_epoch(config, model, optimizer, train, generator, epoch, rng, device)?;
        model = updated;
        summary.record(log);
    }
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::optim::AdamConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::model::bridge::tensor_to_rows;
    use crate::model::DrbmConfig;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    /// Two well-separated clusters in 4 dimensions.
    fn clusters(n: usize) -> Dataset {
        let inputs = (0..n)
            .map(|i| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                (0..4).map(|j| sign * (1.0 + 0.1 * j as f64)).collect()
            })
            .collect();
        let labels = (0..n).map(|i| i % 2).collect();
        Dataset::new(4, 2, inputs, labels).unwrap()
    }

    #[test]
    fn test_categorical_epoch_learns_separable_data() {
        TestAutodiffBackend::seed(17);
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(17);
        let model = DrbmConfig::new(4, 3, 2)
            .init::<TestAutodiffBackend>(&device)
            .unwrap();
        let config = TrainingConfig::new(30).with_minibatch_size(4).with_learning_rate(0.05);
        let mut optim = AdamConfig::new().init();
        let data = clusters(20);

        let mut log = LearningLog::default();
        let model = fit_categorical(&config, model, &mut optim, &data, &data, &mut log, &mut rng, &device).unwrap();

        assert_eq!(log.epochs(), 30);
        let first = log.get("train-nloglikelihood", 0).unwrap();
        let last = log.get("test-nloglikelihood", 29).unwrap();
        assert!(last < first, "NLL should fall: first={first}, last={last}");
        assert_eq!(log.get("test-error", 29), Some(0.0));

        let probs = tensor_to_rows(model.valid().probability(
            Tensor::<TestBackend, 2>::from_data([[1.0_f32, 1.1, 1.2, 1.3]], &device),
        ));
        assert!(probs[0][0] > 0.9, "class 0 should dominate, got {:?}", probs[0]);
    }

    #[test]
    fn test_generative_epoch_logs_kl() {
        TestAutodiffBackend::seed(3);
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(3);
        let generator = DrbmConfig::new(4, 3, 2)
            .with_random_bias(true)
            .init::<TestBackend>(&device)
            .unwrap();
        let data = Dataset::from_generator(&generator, 40, &mut rng);

        let model = DrbmConfig::new(4, 5, 2)
            .with_activation("sparse_continuous".into())
            .with_initial_sparse(1.0)
            .init::<TestAutodiffBackend>(&device)
            .unwrap();
        let config = TrainingConfig::new(2).with_minibatch_size(8).with_kl_sample_size(64);
        let mut optim = AdamConfig::new().init();
        let mut log = LearningLog::default();

        let _model = fit_generative(&config, model, &mut optim, &data, &generator, &mut log, &mut rng, &device).unwrap();

        for epoch in 0..2 {
            let kl = log.get("kl-divergence", epoch).unwrap();
            let nll = log.get("nloglikelihood", epoch).unwrap();
            assert!(kl.is_finite() && kl >= -1e-6, "epoch {epoch}: kl={kl}");
            assert!(nll.is_finite() && nll > 0.0, "epoch {epoch}: nll={nll}");
        }
    }

    #[test]
    fn test_epoch_errors_agree_with_predict() {
        TestAutodiffBackend::seed(8);
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(8);
        let model = DrbmConfig::new(4, 3, 2)
            .with_activation("double".into())
            .with_random_bias(true)
            .init::<TestAutodiffBackend>(&device)
            .unwrap();
        let config = TrainingConfig::new(1).with_minibatch_size(3);
        let mut optim = AdamConfig::new().init();
        let train = clusters(10);
        // Labels flipped on half the test set so the error is not trivially 0 or 1.
        let mut test = clusters(8);
        for label in test.labels.iter_mut().take(4) {
            *label = 1 - *label;
        }

        let (model, summary) =
            categorical_epoch(&config, model, &mut optim, &train, &test, 0, &mut rng, &device).unwrap();
        assert_eq!(summary.batches, 4, "10 examples in batches of 3");

        let batch = test.batches::<TestBackend>(test.len(), &device).next().unwrap();
        let predicted = int_tensor_to_vec(model.valid().predict(batch.inputs));
        let wrong = predicted.iter().zip(&test.labels).filter(|(p, l)| p != l).count();
        let expected = wrong as f64 / test.len() as f64;
        assert!(
            (summary.test_error - expected).abs() < 1e-12,
            "test error {} disagrees with predict ({expected})",
            summary.test_error
        );
    }

    #[test]
    fn test_invalid_training_config_rejected() {
        assert!(TrainingConfig::new(1).validate().is_ok());
        for config in [
            TrainingConfig::new(1).with_minibatch_size(0),
            TrainingConfig::new(1).with_kl_sample_size(0),
            TrainingConfig::new(1).with_learning_rate(0.0),
            TrainingConfig::new(1).with_learning_rate(f64::NAN),
        ] {
            assert!(
                matches!(config.validate(), Err(DrbmError::InvalidConfig(_))),
                "{config:?} should be rejected"
            );
        }

        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(1);
        let model = DrbmConfig::new(4, 3, 2)
            .init::<TestAutodiffBackend>(&device)
            .unwrap();
        let mut optim = AdamConfig::new().init();
        let data = clusters(4);
        let config = TrainingConfig::new(1).with_minibatch_size(0);
        let err = categorical_epoch(&config, model, &mut optim, &data, &data, 0, &mut rng, &device).unwrap_err();
        assert!(matches!(err, DrbmError::InvalidConfig(_)), "{err:?}");
    }

    #[test]
    fn test_dataset_dimension_mismatch_rejected() {
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(0);
        let model = DrbmConfig::new(3, 2, 2)
            .init::<TestAutodiffBackend>(&device)
            .unwrap();
        let config = TrainingConfig::new(1);
        let mut optim = AdamConfig::new().init();
        let data = clusters(4);

        let err = categorical_epoch(&config, model, &mut optim, &data, &data, 0, &mut rng, &device).unwrap_err();
        assert!(matches!(err, DrbmError::ShapeMismatch { .. }));
    }
}
