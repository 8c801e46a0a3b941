use ndarray::{Array2, ArrayView2};

/// A loss over class probabilities and integer class labels.
pub trait LossFn {
    /// The mean loss of the batch.
    fn loss(&self, y_pred: ArrayView2<f32>, y: &[usize]) -> f32;

    /// The derivative of `loss` with respect to `y_pred`.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: &[usize]) -> Array2<f32>;
}
