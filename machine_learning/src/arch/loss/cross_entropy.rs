use ndarray::{Array2, ArrayView2};

use super::LossFn;

const EPSILON: f32 = 1e-7;

/// Cross-entropy between predicted class probabilities and integer labels.
///
/// Probabilities are clipped to `[EPSILON, 1 - EPSILON]` so the loss stays finite.
#[derive(Default, Clone, Copy, Debug)]
pub struct SparseCategoricalCrossEntropy;

impl SparseCategoricalCrossEntropy {
    /// Returns a new `SparseCategoricalCrossEntropy`.
    pub fn new() -> Self {
        Self
    }
}

fn clip(p: f32) -> f32 {
    p.clamp(EPSILON, 1. - EPSILON)
}

impl LossFn for SparseCategoricalCrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: &[usize]) -> f32 {
        if y.is_empty() {
            return 0.;
        }

        let total: f32 = y
            .iter()
            .enumerate()
            .map(|(i, &label)| -clip(y_pred[[i, label]]).ln())
            .sum();

        total / y.len() as f32
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: &[usize]) -> Array2<f32> {
        let mut d = Array2::zeros(y_pred.raw_dim());
        let n = y.len().max(1) as f32;

        for (i, &label) in y.iter().enumerate() {
            let p = y_pred[[i, label]];
            if p > EPSILON && p < 1. - EPSILON {
                d[[i, label]] = -1. / (p * n);
            }
        }

        d
    }
}
