use ndarray::{Array2, ArrayView2};

/// A loss over a batch of predictions and their targets, both shaped `(batch, outputs)`.
pub trait LossFn {
    /// Returns the mean loss of the batch.
    fn loss(&self, preds: ArrayView2<f32>, target: ArrayView2<f32>) -> f32;

    /// Returns the derivative of `loss` with respect to `preds`.
    fn loss_prime(&self, preds: ArrayView2<f32>, target: ArrayView2<f32>) -> Array2<f32>;
}
