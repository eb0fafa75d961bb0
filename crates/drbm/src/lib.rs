//! Discriminative Restricted Boltzmann Machine (DRBM).
//!
//! A shallow probabilistic classifier whose hidden layer is marginalized in
//! closed form rather than sampled. Class probabilities are a softmax over
//! `b2 + Σ_h f(energy)`, where `f` is one of the policies in [`marginalize`].
//! Gradients flow through the closed forms via burn's autodiff, and the
//! [`training`] loops fit a model either to labelled data or to a second
//! DRBM acting as a data generator.

pub mod error;
pub mod marginalize;
pub mod model;
pub mod persist;
pub mod training;

pub use error::DrbmError;
pub use marginalize::Marginalization;
pub use model::{Drbm, DrbmConfig, DrbmParams};
