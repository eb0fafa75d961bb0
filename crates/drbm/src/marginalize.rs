//! Closed-form hidden-unit marginalization policies.
//!
//! Each policy maps the pre-activation energy `x` of one hidden unit (for one
//! example and one candidate class) to `ln Σ_h exp(x·h - cost(h))`, the log of
//! the hidden unit's partition function under its prior. Summing these over the
//! hidden layer yields the class energy without ever sampling hidden states.
//!
//! ```text
//! original           h ∈ {0, 1}                 ln(1 + e^x)
//! double             h ∈ {-1, +1}               ln(2 cosh x)
//! continuous         h ∈ [-1, 1]                ln(2 sinh(x) / x)
//! sparse_double      h ∈ {-1, 0, +1}, cost r|h| ln(1 + e^(x-r) + e^(-x-r))
//! sparse_continuous  h ∈ [-1, 1],     cost r|h| ln(φ(x-r) + φ(-x-r)),  φ(a) = (e^a - 1)/a
//! ```
//!
//! Every form is evaluated through an algebraically identical rewrite that
//! never exponentiates a positive argument, so large energies cannot overflow.

use std::f64::consts::LN_2;
use std::fmt;
use std::str::FromStr;

use burn::prelude::*;

use crate::error::DrbmError;

/// Below this magnitude the removable singularities of `continuous` and
/// `sparse_continuous` are evaluated by truncated Taylor series.
const TAYLOR_RADIUS: f64 = 0.1;

/// Registry of marginalization policies, selected by exact name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marginalization {
    /// Binary {0, 1} hidden units.
    Original,
    /// Bipolar {-1, +1} hidden units.
    Double,
    /// Continuous hidden units, uniform on [-1, 1].
    Continuous,
    /// Ternary {-1, 0, +1} hidden units with a learned L1 threshold.
    SparseDouble,
    /// Continuous [-1, 1] hidden units with a learned L1 threshold.
    SparseContinuous,
}

impl Marginalization {
    /// All registered policies, in registry order.
    pub const ALL: [Marginalization; 5] = [
        Self::Original,
        Self::Double,
        Self::Continuous,
        Self::SparseDouble,
        Self::SparseContinuous,
    ];

    /// Look up a policy by its registry name.
    pub fn from_name(name: &str) -> Result<Self, DrbmError> {
        Self::ALL
            .into_iter()
            .find(|policy| policy.name() == name)
            .ok_or_else(|| DrbmError::UnknownActivation(name.to_string()))
    }

    /// Registry name, as written to persisted records.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Double => "double",
            Self::Continuous => "continuous",
            Self::SparseDouble => "sparse_double",
            Self::SparseContinuous => "sparse_continuous",
        }
    }

    /// Whether the policy consumes a per-hidden-unit threshold parameter.
    pub fn is_sparse(&self) -> bool {
        self.name().contains("sparse")
    }

    /// Apply the policy to an energy tensor of shape `(N, H, K)`.
    ///
    /// `threshold` has shape `(H,)` and is broadcast along the example and
    /// class axes. Non-sparse policies ignore it; a sparse policy given no
    /// threshold evaluates with `r = 0`.
    pub fn apply<B: Backend>(
        &self,
        energy: Tensor<B, 3>,
        threshold: Option<Tensor<B, 1>>,
    ) -> Tensor<B, 3> {
        match self {
            Self::Original => softplus(energy),
            Self::Double => log_two_cosh(energy),
            Self::Continuous => log_two_sinhc(energy),
            Self::SparseDouble => match threshold {
                Some(r) => sparse_double(energy, broadcast_threshold(r)),
                None => {
                    let [_, h, _] = energy.dims();
                    let zero = Tensor::zeros([1, h, 1], &energy.device());
                    sparse_double(energy, zero)
                }
            },
            Self::SparseContinuous => match threshold {
                Some(r) => sparse_continuous(energy, broadcast_threshold(r)),
                None => {
                    let [_, h, _] = energy.dims();
                    let zero = Tensor::zeros([1, h, 1], &energy.device());
                    sparse_continuous(energy, zero)
                }
            },
        }
    }
}

impl fmt::Display for Marginalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Marginalization {
    type Err = DrbmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// `(H,)` → `(1, H, 1)`.
fn broadcast_threshold<B: Backend>(threshold: Tensor<B, 1>) -> Tensor<B, 3> {
    let [h] = threshold.dims();
    threshold.reshape([1, h, 1])
}

/// `ln(1 + e^x) = max(x, 0) + ln(1 + e^-|x|)`
fn softplus<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 3> {
    x.clone().clamp_min(0.0) + x.abs().neg().exp().log1p()
}

/// `ln(2 cosh x) = |x| + ln(1 + e^-2|x|)`
fn log_two_cosh<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 3> {
    let abs = x.abs();
    abs.clone() + abs.mul_scalar(-2.0).exp().log1p()
}

/// `ln(2 sinh(x) / x) = |x| + ln(1 - e^-2|x|) - ln|x|`, with limit `ln 2` at 0.
fn log_two_sinhc<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 3> {
    let small = x.clone().abs().lower_elem(TAYLOR_RADIUS);

    // Masked entries are replaced before the singular expression sees them so
    // their (zero) upstream gradient never meets an infinite local derivative.
    let safe = x.clone().abs().mask_fill(small.clone(), 1.0);
    let exact = safe.clone() + safe.clone().mul_scalar(-2.0).exp().neg().log1p() - safe.log();

    let x2 = x.clone() * x;
    let x4 = x2.clone() * x2.clone();
    let series = x2.div_scalar(6.0) - x4.div_scalar(180.0);
    let series = series.add_scalar(LN_2);

    exact.mask_where(small, series)
}

/// `ln φ(a)` with `φ(a) = (e^a - 1)/a`, i.e. `ln ∫₀¹ e^(a·t) dt`.
fn log_phi<B: Backend>(a: Tensor<B, 3>) -> Tensor<B, 3> {
    let small = a.clone().abs().lower_elem(TAYLOR_RADIUS);

    let safe = a.clone().mask_fill(small.clone(), 1.0);
    let exact = safe.clone().clamp_min(0.0) + safe.clone().abs().neg().exp().neg().log1p()
        - safe.abs().log();

    let a2 = a.clone() * a.clone();
    let a4 = a2.clone() * a2.clone();
    let series = a.div_scalar(2.0) + a2.div_scalar(24.0) - a4.div_scalar(2880.0);

    exact.mask_where(small, series)
}

/// `ln(e^u + e^v)` without overflow.
fn log_add_exp<B: Backend>(u: Tensor<B, 3>, v: Tensor<B, 3>) -> Tensor<B, 3> {
    let gap = (u.clone() - v.clone()).abs();
    u.max_pair(v) + gap.neg().exp().log1p()
}

fn sparse_double<B: Backend>(x: Tensor<B, 3>, r: Tensor<B, 3>) -> Tensor<B, 3> {
    let up = x.clone() - r.clone();
    let down = x.clone().neg() - r.clone();
    // Largest of the three exponents {0, x-r, -x-r}.
    let peak = (x.abs() - r).clamp_min(0.0);

    let sum = peak.clone().neg().exp() + (up - peak.clone()).exp() + (down - peak.clone()).exp();
    peak + sum.log()
}

fn sparse_continuous<B: Backend>(x: Tensor<B, 3>, r: Tensor<B, 3>) -> Tensor<B, 3> {
    let up = x.clone() - r.clone();
    let down = x.neg() - r;
    log_add_exp(log_phi(up), log_phi(down))
}
