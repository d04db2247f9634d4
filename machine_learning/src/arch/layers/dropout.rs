use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::grad;

/// Inverted dropout. Only active while the owning model is in training mode.
#[derive(Clone, Debug)]
pub struct Dropout {
    p: f32,
    mask: Option<Array2<f32>>,
}

impl Dropout {
    /// Creates a new `Dropout` dropping each activation with probability `p`.
    pub fn new(p: f32) -> Self {
        Self { p, mask: None }
    }

    pub fn p(&self) -> f32 {
        self.p
    }

    pub fn forward(&mut self, x: ArrayView2<f32>, training: bool) -> Array2<f32> {
        if !training || self.p == 0. {
            self.mask = None;
            return x.to_owned();
        }

        let keep = 1. - self.p;
        let mut rng = rand::rng();
        let mask = x.mapv(|_| if rng.random::<f32>() < keep { 1. / keep } else { 0. });
        let y = &x * &mask;

        self.mask = grad::is_grad_enabled().then_some(mask);
        y
    }

    pub fn backward(&mut self, d: Array2<f32>) -> Array2<f32> {
        match self.mask.take() {
            Some(mask) => d * mask,
            None => d,
        }
    }
}
