use ndarray::{Array2, ArrayView2};

use super::LossFn;

/// Mean squared error over every element of the batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mse;

impl Mse {
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for Mse {
    fn loss(&self, preds: ArrayView2<f32>, target: ArrayView2<f32>) -> f32 {
        let n = preds.len();
        if n == 0 {
            return 0.;
        }

        let sum: f32 = preds
            .iter()
            .zip(target.iter())
            .map(|(p, t)| (p - t) * (p - t))
            .sum();
        sum / n as f32
    }

    fn loss_prime(&self, preds: ArrayView2<f32>, target: ArrayView2<f32>) -> Array2<f32> {
        let scale = 2. / preds.len().max(1) as f32;
        (&preds - &target).mapv_into(|d| d * scale)
    }
}
