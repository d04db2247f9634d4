use ndarray::{Array2, ArrayView2, Axis};

use super::LossFn;

/// Row-wise numerically stable softmax.
pub fn softmax(z: ArrayView2<f32>) -> Array2<f32> {
    let mut out = z.to_owned();

    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0. {
            row.mapv_inplace(|v| v / sum);
        }
    }

    out
}

/// Softmax cross entropy over raw model outputs, averaged over the samples of the batch.
#[derive(Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let n = y_pred.nrows();
        if n == 0 {
            return 0.;
        }

        let p = softmax(y_pred);
        let total: f32 = p
            .iter()
            .zip(y.iter())
            .map(|(&p, &y)| -y * p.max(f32::MIN_POSITIVE).ln())
            .sum();

        total / n as f32
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = y_pred.nrows().max(1) as f32;
        (softmax(y_pred) - &y) / n
    }
}
