//! JSON experiment config for the DRBM CLI.
//!
//! Keys follow the experiment files used by the training scripts:
//!
//! ```json
//! {
//!   "dtype": "float32",
//!   "minibatch-size": 100,
//!   "generative-layers": [20, 50, 10],
//!   "generative-args": { "activation": "double", "random_bias": true },
//!   "training-layers": [20, 10, 10],
//!   "training-args": { "activation": "sparse_continuous", "initial_sparse": 1.0 }
//! }
//! ```

use std::path::Path;

use anyhow::Context;
use drbm::training::TrainingConfig;
use drbm::DrbmConfig;
use serde::{Deserialize, Serialize};

fn default_learning_rate() -> f64 {
    0.002
}

fn default_data_size() -> usize {
    1000
}

/// Top-level experiment description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExperimentConfig {
    /// `"float32"` or `"float64"`; selects the backend precision.
    pub dtype: String,
    pub minibatch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// `[I, H, K]` of the generator; only needed for generative training.
    #[serde(default)]
    pub generative_layers: Option<[usize; 3]>,
    #[serde(default)]
    pub generative_args: Option<ModelArgs>,
    /// `[I, H, K]` of the model being trained.
    pub training_layers: [usize; 3],
    pub training_args: ModelArgs,
    /// Seeds both the backend RNG and the shuffling/sampling RNG.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Number of examples synthesised from the generator.
    #[serde(default = "default_data_size")]
    pub data_size: usize,
    #[serde(default)]
    pub kl_sample_size: Option<usize>,
}

/// Per-model constructor arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArgs {
    pub activation: String,
    #[serde(default)]
    pub initial_sparse: Option<f64>,
    #[serde(default)]
    pub random_bias: Option<bool>,
}

impl ExperimentConfig {
    /// Config of the model being trained.
    pub fn training_model(&self) -> DrbmConfig {
        self.model_config(self.training_layers, &self.training_args)
    }

    /// Config of the generator; fails if the generative section is absent.
    pub fn generator_model(&self) -> anyhow::Result<DrbmConfig> {
        let layers = self
            .generative_layers
            .context("experiment config has no \"generative-layers\"")?;
        let args = self
            .generative_args
            .as_ref()
            .context("experiment config has no \"generative-args\"")?;
        Ok(self.model_config(layers, args))
    }

    fn model_config(&self, [input, hidden, output]: [usize; 3], args: &ModelArgs) -> DrbmConfig {
        let mut config = DrbmConfig::new(input, hidden, output)
            .with_activation(args.activation.clone())
            .with_dtype(self.dtype.clone());
        if let Some(sparse) = args.initial_sparse {
            config = config.with_initial_sparse(sparse);
        }
        if let Some(random_bias) = args.random_bias {
            config = config.with_random_bias(random_bias);
        }
        config
    }

    /// Loop settings for `epochs` passes.
    pub fn training(&self, epochs: usize) -> TrainingConfig {
        let config = TrainingConfig::new(epochs)
            .with_minibatch_size(self.minibatch_size)
            .with_learning_rate(self.learning_rate);
        match self.kl_sample_size {
            Some(n) => config.with_kl_sample_size(n),
            None => config,
        }
    }
}

/// Load an experiment config, returning it together with the raw JSON that
/// gets embedded in the learning log.
pub fn load_experiment(path: &Path) -> anyhow::Result<(ExperimentConfig, serde_json::Value)> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read experiment config {}", path.display()))?;
    let raw: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let config: ExperimentConfig = serde_json::from_value(raw.clone())
        .with_context(|| format!("invalid experiment config {}", path.display()))?;
    config
        .training(0)
        .validate()
        .with_context(|| format!("invalid experiment config {}", path.display()))?;
    tracing::info!(path = %path.display(), dtype = %config.dtype, "Loaded experiment config");
    Ok((config, raw))
}
