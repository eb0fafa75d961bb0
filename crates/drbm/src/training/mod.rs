//! DRBM training pipeline: datasets and mini-batching, loss functions,
//! running metrics, the per-epoch learning log, and the two training loops.

pub mod data;
pub mod log;
pub mod loss;
pub mod metrics;
pub mod trainer;

pub use data::{Batch, Dataset};
pub use log::LearningLog;
pub use trainer::{
    categorical_epoch, fit_categorical, fit_generative, generative_epoch, CategoricalEpoch,
    GenerativeEpoch, TrainingConfig,
};
