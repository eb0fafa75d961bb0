//! Running metrics accumulated over an epoch and reset at its boundary.

/// Unweighted running mean of per-batch scalars.
///
/// Matches a streaming `Mean` metric: each batch loss counts once regardless
/// of batch size.
#[derive(Debug, Clone, Default)]
pub struct RunningMean {
    sum: f64,
    count: usize,
}

impl RunningMean {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// Mean of all updates since the last reset; `NaN` when empty.
    pub fn result(&self) -> f64 {
        if self.count == 0 {
            return f64::NAN;
        }
        self.sum / self.count as f64
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Fraction of examples whose predicted class equals the label.
#[derive(Debug, Clone, Default)]
pub struct RunningAccuracy {
    correct: usize,
    total: usize,
}

impl RunningAccuracy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count matches between predicted and true class indices.
    pub fn update(&mut self, predicted: &[usize], labels: &[usize]) {
        debug_assert_eq!(predicted.len(), labels.len());
        self.correct += predicted.iter().zip(labels).filter(|(p, l)| p == l).count();
        self.total += labels.len();
    }

    /// Accuracy since the last reset; `NaN` when empty.
    pub fn result(&self) -> f64 {
        if self.total == 0 {
            return f64::NAN;
        }
        self.correct as f64 / self.total as f64
    }

    /// `1 - accuracy`.
    pub fn error(&self) -> f64 {
        1.0 - self.result()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_mean_is_unweighted() {
        let mut mean = RunningMean::new();
        mean.update(1.0);
        mean.update(2.0);
        mean.update(6.0);
        assert_eq!(mean.count(), 3);
        assert!((mean.result() - 3.0).abs() < 1e-12);

        mean.reset();
        assert_eq!(mean.count(), 0);
        assert!(mean.result().is_nan());
    }

    #[test]
    fn test_running_mean_propagates_infinity() {
        let mut mean = RunningMean::new();
        mean.update(0.5);
        mean.update(f64::INFINITY);
        assert!(mean.result().is_infinite());
    }

    #[test]
    fn test_running_accuracy_counts_examples() {
        let mut acc = RunningAccuracy::new();
        acc.update(&[0, 1, 1], &[0, 1, 0]);
        acc.update(&[2], &[2]);
        assert!((acc.result() - 0.75).abs() < 1e-12);
        assert!((acc.error() - 0.25).abs() < 1e-12);

        acc.reset();
        assert!(acc.result().is_nan());
    }
}
