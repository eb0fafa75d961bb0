use burn::module::{AutodiffModule, Param};
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{DType, Distribution, TensorData};
use rand::Rng;

use crate::error::DrbmError;
use crate::marginalize::Marginalization;
use crate::training::loss::{negative_log_likelihood, sampled_kl_divergence};

/// Topology and initialization settings for a [`Drbm`].
///
/// ```text
/// input (N, I) ──w1, b1──▶ hidden signal (N, H)
///                               │ + w2 (H, K), broadcast per class
///                               ▼
///                         energy (N, H, K) ── marginalize ── Σ_h ──+ b2──▶ softmax (N, K)
/// ```
#[derive(Config, Debug)]
pub struct DrbmConfig {
    /// Input dimensionality I.
    pub input_num: usize,
    /// Number of hidden units H.
    pub hidden_num: usize,
    /// Number of classes K.
    pub output_num: usize,
    /// Marginalization policy name, see [`Marginalization`].
    #[config(default = "String::from(\"continuous\")")]
    pub activation: String,
    /// Numeric precision tag; must match the backend float element.
    #[config(default = "String::from(\"float32\")")]
    pub dtype: String,
    /// Initial value of every sparse threshold (sparse policies only).
    #[config(default = 10.0)]
    pub initial_sparse: f64,
    /// Draw biases from N(0, 1) instead of zero-initializing them.
    #[config(default = false)]
    pub random_bias: bool,
}

/// The trainable parameter set, in fixed order `b1, b2, w1, w2, sparse`.
///
/// This is the unit handed to the optimizer each step.
#[derive(Module, Debug)]
pub struct DrbmParams<B: Backend> {
    /// Hidden bias, shape (H,).
    pub b1: Param<Tensor<B, 1>>,
    /// Output bias, shape (K,).
    pub b2: Param<Tensor<B, 1>>,
    /// Input → hidden weights, shape (I, H).
    pub w1: Param<Tensor<B, 2>>,
    /// Hidden → output weights, shape (H, K).
    pub w2: Param<Tensor<B, 2>>,
    /// Per-hidden-unit threshold, shape (H,). Present iff the policy is sparse.
    pub sparse: Option<Param<Tensor<B, 1>>>,
}

/// Discriminative RBM with analytically marginalized hidden units.
///
/// Topology and policy are fixed at construction; only parameter values
/// change afterwards.
#[derive(Debug, Clone)]
pub struct Drbm<B: Backend> {
    config: DrbmConfig,
    policy: Marginalization,
    params: DrbmParams<B>,
}

/// Name used for a float element type in configs and persisted records.
pub fn dtype_name(dtype: DType) -> String {
    match dtype {
        DType::F64 => "float64".to_string(),
        DType::F32 => "float32".to_string(),
        DType::F16 => "float16".to_string(),
        DType::BF16 => "bfloat16".to_string(),
        other => format!("{other:?}").to_lowercase(),
    }
}

/// The dtype tag of backend `B`'s float tensors.
pub fn backend_dtype<B: Backend>(device: &B::Device) -> String {
    dtype_name(Tensor::<B, 1>::zeros([1], device).into_data().dtype)
}

/// Glorot/Xavier uniform: U(-l, l) with `l = sqrt(6 / (fan_in + fan_out))`.
fn glorot_uniform<B: Backend>(shape: [usize; 2], device: &B::Device) -> Tensor<B, 2> {
    let limit = (6.0 / (shape[0] + shape[1]) as f64).sqrt();
    Tensor::random(shape, Distribution::Uniform(-limit, limit), device)
}

impl DrbmConfig {
    /// Initialize a DRBM with fresh random weights.
    ///
    /// Fails if the activation name is not registered or the dtype tag does
    /// not match backend `B`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Drbm<B>, DrbmError> {
        let policy = Marginalization::from_name(&self.activation)?;

        let backend = backend_dtype::<B>(device);
        if backend != self.dtype {
            return Err(DrbmError::DtypeMismatch {
                declared: self.dtype.clone(),
                backend,
            });
        }

        let (i, h, k) = (self.input_num, self.hidden_num, self.output_num);
        let (b1, b2) = if self.random_bias {
            (
                Tensor::random([h], Distribution::Normal(0.0, 1.0), device),
                Tensor::random([k], Distribution::Normal(0.0, 1.0), device),
            )
        } else {
            (Tensor::zeros([h], device), Tensor::zeros([k], device))
        };

        let sparse = policy
            .is_sparse()
            .then(|| Param::from_tensor(Tensor::full([h], self.initial_sparse, device)));

        tracing::debug!(
            input_num = i,
            hidden_num = h,
            output_num = k,
            activation = %policy,
            dtype = %self.dtype,
            "Initialized DRBM"
        );

        Ok(Drbm {
            config: self.clone(),
            policy,
            params: DrbmParams {
                b1: Param::from_tensor(b1),
                b2: Param::from_tensor(b2),
                w1: Param::from_tensor(glorot_uniform([i, h], device)),
                w2: Param::from_tensor(glorot_uniform([h, k], device)),
                sparse,
            },
        })
    }
}

impl<B: Backend> Drbm<B> {
    pub fn config(&self) -> &DrbmConfig {
        &self.config
    }

    pub fn input_num(&self) -> usize {
        self.config.input_num
    }

    pub fn hidden_num(&self) -> usize {
        self.config.hidden_num
    }

    pub fn output_num(&self) -> usize {
        self.config.output_num
    }

    pub fn dtype(&self) -> &str {
        &self.config.dtype
    }

    pub fn activation(&self) -> Marginalization {
        self.policy
    }

    pub fn enable_sparse(&self) -> bool {
        self.params.sparse.is_some()
    }

    pub fn params(&self) -> &DrbmParams<B> {
        &self.params
    }

    /// Parameter names in optimizer/serialization order.
    pub fn param_names(&self) -> Vec<&'static str> {
        let mut names = vec!["b1", "b2", "w1", "w2"];
        if self.enable_sparse() {
            names.push("sparse");
        }
        names
    }

    /// Total number of scalar parameters.
    pub fn num_params(&self) -> usize {
        self.params.num_params()
    }

    /// Pre-marginalization energy for every (example, hidden unit, class).
    ///
    /// `energy[n, h, k] = (input · w1 + b1)[n, h] + w2[h, k]`
    ///
    /// Input shape: `(N, I)`. Output shape: `(N, H, K)`.
    pub fn signal_all(&self, input: Tensor<B, 2>) -> Tensor<B, 3> {
        let hidden = input.matmul(self.params.w1.val()) + self.params.b1.val().unsqueeze::<2>();
        hidden.unsqueeze_dim::<3>(2) + self.params.w2.val().unsqueeze::<3>()
    }

    /// Class probabilities, shape `(N, K)`. Rows sum to one.
    pub fn probability(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let energy = self.signal_all(input);
        let threshold = self.params.sparse.as_ref().map(Param::val);
        let act = self.policy.apply(energy, threshold);

        let class_energy: Tensor<B, 2> =
            act.sum_dim(1).squeeze::<2>(1) + self.params.b2.val().unsqueeze::<2>();

        // Shift by the row max before exponentiating.
        let shifted = class_energy.clone() - class_energy.detach().max_dim(1);
        let unnormalized = shifted.exp();
        unnormalized.clone() / unnormalized.sum_dim(1)
    }

    /// Most probable class per example, shape `(N,)`.
    pub fn predict(&self, input: Tensor<B, 2>) -> Tensor<B, 1, Int> {
        self.probability(input).argmax(1).squeeze::<1>(1)
    }

    /// Mean negative log-likelihood of one-hot `labels` under `probs`.
    ///
    /// A true-class probability of exactly zero yields `+inf`; this is
    /// reported as-is.
    pub fn negative_log_likelihood(&self, probs: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1> {
        negative_log_likelihood(probs, labels)
    }

    /// Monte-Carlo KL estimate of `generator` against `self` on
    /// `sample_size` inputs drawn by the generator.
    ///
    /// Reduced as a single mean over the full `(N, K)` tensor, so the value
    /// is the per-example KL divided by K.
    pub fn kl_divergence(&self, generator: &Drbm<B>, sample_size: usize) -> Tensor<B, 1> {
        let (gen_data, gen_probs) = generator.sampling(sample_size);
        let probs = self.probability(gen_data);
        sampled_kl_divergence(gen_probs, probs)
    }

    /// Draw `n` inputs from N(0, 1) and return them with their class probabilities.
    pub fn sampling(&self, n: usize) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let device = self.params.w1.device();
        let data = Tensor::random([n, self.input_num()], Distribution::Normal(0.0, 1.0), &device);
        let probs = self.probability(data.clone());
        (data, probs)
    }

    /// Draw `n` inputs and one categorical label per input from the model's
    /// class distribution.
    ///
    /// Returns `data` of shape `(n, I)` and `category` of shape `(n,)`.
    pub fn stick_break<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> (Tensor<B, 2>, Tensor<B, 1, Int>) {
        let device = self.params.w1.device();
        let (data, probs) = self.sampling(n);

        let k = self.output_num();
        let flat: Vec<f64> = probs.into_data().iter::<f64>().collect();
        let categories: Vec<i64> = flat
            .chunks(k.max(1))
            .map(|row| draw_category(row, rng) as i64)
            .collect();

        let category = Tensor::from_data(TensorData::new(categories, [n]), &device);
        (data, category)
    }

    /// Copy of the model on the inner backend, detached from autodiff.
    pub fn valid(&self) -> Drbm<B::InnerBackend>
    where
        B: AutodiffBackend,
    {
        Drbm {
            config: self.config.clone(),
            policy: self.policy,
            params: self.params.valid(),
        }
    }

    /// Backpropagate `loss` and let `optimizer` update the parameter set.
    pub fn optimize<O>(self, optimizer: &mut O, lr: f64, loss: Tensor<B, 1>) -> Self
    where
        B: AutodiffBackend,
        O: Optimizer<DrbmParams<B>, B>,
    {
        let grads = GradientsParams::from_grads(loss.backward(), &self.params);
        let params = optimizer.step(lr, self.params, grads);
        Self {
            config: self.config,
            policy: self.policy,
            params,
        }
    }

    /// Overwrite the parameter set, keeping topology and policy.
    ///
    /// Used by the loader after every array has been shape-checked.
    pub(crate) fn with_params(self, params: DrbmParams<B>) -> Self {
        Self { params, ..self }
    }
}

/// Inverse-CDF draw from one row of class probabilities.
fn draw_category<R: Rng + ?Sized>(row: &[f64], rng: &mut R) -> usize {
    let total: f64 = row.iter().sum();
    let target = rng.gen::<f64>() * total;
    let mut acc = 0.0;
    for (class, &p) in row.iter().enumerate() {
        acc += p;
        if target < acc {
            return class;
        }
    }
    row.len().saturating_sub(1)
}
