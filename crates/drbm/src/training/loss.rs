//! Negative log-likelihood and sampled KL-divergence for DRBM training.
//!
//! Both functions are generic over `B: Backend` and leave NaN/inf results
//! untouched.

use burn::prelude::*;

/// Mean negative log-likelihood of the true class.
///
/// `-mean_n ln(Σ_k probs[n, k] · labels[n, k])`
///
/// # Arguments
/// - `probs`: shape `(N, K)`, predicted class probabilities
/// - `labels`: shape `(N, K)`, one-hot targets
///
/// # Returns
/// Scalar loss tensor of shape `(1,)`. `+inf` if any true-class probability
/// is exactly zero.
pub fn negative_log_likelihood<B: Backend>(probs: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1> {
    let true_class = (probs * labels).sum_dim(1);
    true_class.log().mean().neg()
}

/// KL estimate over a sampled support.
///
/// `mean(gen_probs · ln(gen_probs / probs))` taken over all `N × K` entries
/// at once, i.e. the per-example divergence divided by K.
///
/// # Arguments
/// - `gen_probs`: shape `(N, K)`, reference distribution (generator)
/// - `probs`: shape `(N, K)`, model distribution on the same inputs
pub fn sampled_kl_divergence<B: Backend>(gen_probs: Tensor<B, 2>, probs: Tensor<B, 2>) -> Tensor<B, 1> {
    let ratio = gen_probs.clone() / probs;
    (gen_probs * ratio.log()).mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem()
    }

    #[test]
    fn test_nll_uniform_prediction() {
        let device = Default::default();
        let probs = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[0.25_f32, 0.25, 0.25, 0.25], [0.25, 0.25, 0.25, 0.25]]),
            &device,
        );
        let labels = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[1.0_f32, 0.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]]),
            &device,
        );
        let loss = scalar(negative_log_likelihood(probs, labels));
        let expected = 4.0_f32.ln();
        assert!((loss - expected).abs() < 1e-6, "expected ln 4 = {expected}, got {loss}");
    }

    #[test]
    fn test_nll_averages_over_examples() {
        let device = Default::default();
        let probs = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[0.5_f32, 0.5], [0.1, 0.9]]),
            &device,
        );
        let labels = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[1.0_f32, 0.0], [0.0, 1.0]]),
            &device,
        );
        let loss = scalar(negative_log_likelihood(probs, labels));
        let expected = -(0.5_f32.ln() + 0.9_f32.ln()) / 2.0;
        assert!((loss - expected).abs() < 1e-6, "expected {expected}, got {loss}");
    }

    #[test]
    fn test_nll_zero_probability_is_infinite() {
        let device = Default::default();
        let probs = Tensor::<TestBackend, 2>::from_data(TensorData::from([[0.0_f32, 1.0]]), &device);
        let labels = Tensor::<TestBackend, 2>::from_data(TensorData::from([[1.0_f32, 0.0]]), &device);
        let loss = scalar(negative_log_likelihood(probs, labels));
        assert!(loss.is_infinite() && loss > 0.0, "expected +inf, got {loss}");
    }

    #[test]
    fn test_nll_gradient_pushes_true_class_up() {
        let device = Default::default();
        let probs = Tensor::<TestAutodiffBackend, 2>::from_data(
            TensorData::from([[0.4_f32, 0.6]]),
            &device,
        )
        .require_grad();
        let labels = Tensor::<TestAutodiffBackend, 2>::from_data(TensorData::from([[1.0_f32, 0.0]]), &device);

        let grads = negative_log_likelihood(probs.clone(), labels).backward();
        let g: Vec<f32> = probs.grad(&grads).unwrap().into_data().to_vec().unwrap();

        // d/dp0 of -ln p0 = -1/p0; the other class receives no gradient.
        assert!((g[0] + 2.5).abs() < 1e-5, "expected -2.5, got {}", g[0]);
        assert_eq!(g[1], 0.0);
    }

    #[test]
    fn test_kl_identical_distributions() {
        let device = Default::default();
        let p = Tensor::<TestBackend, 2>::from_data(TensorData::from([[0.3_f32, 0.7], [0.9, 0.1]]), &device);
        let kl = scalar(sampled_kl_divergence(p.clone(), p));
        assert!(kl.abs() < 1e-7, "KL(p || p) should be 0, got {kl}");
    }

    #[test]
    fn test_kl_reduces_over_full_tensor() {
        let device = Default::default();
        let gen = Tensor::<TestBackend, 2>::from_data(TensorData::from([[0.5_f32, 0.5]]), &device);
        let model = Tensor::<TestBackend, 2>::from_data(TensorData::from([[0.25_f32, 0.75]]), &device);
        let kl = scalar(sampled_kl_divergence(gen, model));

        // Per-example KL divided by K = 2.
        let per_example = 0.5 * (0.5_f32 / 0.25).ln() + 0.5 * (0.5_f32 / 0.75).ln();
        assert!(
            (kl - per_example / 2.0).abs() < 1e-6,
            "expected {}, got {kl}",
            per_example / 2.0
        );
    }

    #[test]
    fn test_kl_zero_model_probability_is_infinite() {
        let device = Default::default();
        let gen = Tensor::<TestBackend, 2>::from_data(TensorData::from([[0.5_f32, 0.5]]), &device);
        let model = Tensor::<TestBackend, 2>::from_data(TensorData::from([[1.0_f32, 0.0]]), &device);
        let kl = scalar(sampled_kl_divergence(gen, model));
        assert!(kl.is_infinite(), "division by zero must propagate, got {kl}");
    }
}
