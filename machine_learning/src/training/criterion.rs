use ndarray::{Array1, Array2, ArrayView2};

use crate::{
    Result,
    arch::loss::{CrossEntropy, LossFn, Mse},
    data::Batch,
};

/// The supervised classification criterion: a labelled pair of loss terms over the raw model
/// outputs, `mse` against the one-hot targets and softmax `ce`. The total is their sum.
#[derive(Default, Clone, Copy)]
pub struct Criterion {
    mse: Mse,
    ce: CrossEntropy,
}

impl Criterion {
    pub const TERMS: [&'static str; 2] = ["mse", "ce"];

    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates the criterion on one batch.
    ///
    /// # Arguments
    /// * `preds` - Raw model outputs for the batch.
    /// * `batch` - The batch the outputs were computed from.
    ///
    /// # Returns
    /// The total loss and the per-term loss vector, ordered as `TERMS`.
    pub fn loss(&self, preds: ArrayView2<f32>, batch: &Batch) -> Result<(f32, Array1<f32>)> {
        let y = batch.one_hot(preds.ncols())?;
        let items = Array1::from(vec![
            self.mse.loss(preds, y.view()),
            self.ce.loss(preds, y.view()),
        ]);
        Ok((items.sum(), items))
    }

    /// Returns the derivative of the total loss with respect to `preds`.
    pub fn loss_prime(&self, preds: ArrayView2<f32>, batch: &Batch) -> Result<Array2<f32>> {
        let y = batch.one_hot(preds.ncols())?;
        Ok(self.mse.loss_prime(preds, y.view()) + self.ce.loss_prime(preds, y.view()))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn total_is_sum_of_terms() {
        let batch = Batch {
            img: array![[0.]],
            cls: vec![1],
            ids: vec![0],
        };
        let preds = array![[0., 0.]];

        let (total, items) = Criterion::new().loss(preds.view(), &batch).unwrap();

        assert_eq!(items.len(), Criterion::TERMS.len());
        assert!((items[0] - 0.5).abs() < 1e-6);
        assert!((items[1] - 2f32.ln()).abs() < 1e-6);
        assert!((total - items.sum()).abs() < 1e-6);
    }
}
