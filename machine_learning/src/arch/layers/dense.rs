use ndarray::prelude::*;

use crate::{
    MlErr, Result,
    arch::{Precision, activations::ActFn},
    grad,
};

/// A fully connected layer with an optional activation. Parameters are not owned by the layer,
/// they are laid out as `[w (n x m) | b (m)]` in the slice handed to each pass.
#[derive(Clone, Debug)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata, only recorded while gradients are enabled.
    cache: Option<(Array2<f32>, Array2<f32>)>,
}

impl Dense {
    /// Creates a new `Dense`.
    ///
    /// # Arguments
    /// * `dim` - The `(input, output)` widths.
    /// * `act_fn` - The activation applied to the affine output, if any.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            cache: None,
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn act_fn(&self) -> Option<&ActFn> {
        self.act_fn.as_ref()
    }

    /// Computes `act(x . w + b)`, rounding the result to `precision`.
    ///
    /// # Arguments
    /// * `params` - This layer's parameter slice.
    /// * `x` - The input, one sample per row.
    /// * `precision` - The precision the computation is carried in.
    ///
    /// # Returns
    /// The layer output or a size mismatch error.
    pub fn forward(
        &mut self,
        params: &[f32],
        x: ArrayView2<f32>,
        precision: Precision,
    ) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense input features",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let mut z = x.dot(&w) + &b;
        precision.cast(&mut z);

        let a = match &self.act_fn {
            Some(act_fn) => {
                let mut a = z.mapv(|z| act_fn.f(z));
                precision.cast(&mut a);
                a
            }
            None => z.clone(),
        };

        self.cache = grad::is_grad_enabled().then(|| (x.to_owned(), z));
        Ok(a)
    }

    /// Backpropagates `d` through this layer, writing the parameter gradient into `grad`.
    ///
    /// # Arguments
    /// * `params` - This layer's parameter slice.
    /// * `grad` - This layer's gradient slice, overwritten.
    /// * `d` - The loss derivative with respect to this layer's output.
    ///
    /// # Returns
    /// The loss derivative with respect to this layer's input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        let (x, z) = self.cache.take().ok_or(MlErr::MissingForwardCache)?;

        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        dw.assign(&x.t().dot(&d));
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("dense gradient", grad.len())?;

        let (dw_raw, db_raw) = grad.split_at_mut(self.size - self.dim.1);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).map_err(|_| self.mismatch())?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw).map_err(|_| self.mismatch())?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("dense parameters", params.len())?;

        let (w_raw, b_raw) = params.split_at(self.size - self.dim.1);
        let w = ArrayView2::from_shape(self.dim, w_raw).map_err(|_| self.mismatch())?;
        let b = ArrayView1::from_shape(self.dim.1, b_raw).map_err(|_| self.mismatch())?;
        Ok((w, b))
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected: self.size,
            });
        }
        Ok(())
    }

    fn mismatch(&self) -> MlErr {
        MlErr::SizeMismatch {
            what: "dense shape",
            got: self.size,
            expected: (self.dim.0 + 1) * self.dim.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    // w = [[1, 2], [3, 4]], b = [0.5, -0.5]
    const PARAMS: [f32; 6] = [1., 2., 3., 4., 0.5, -0.5];

    #[test]
    fn forward_computes_affine_map() {
        let mut dense = Dense::new((2, 2), None);
        let x = array![[1., 1.], [0., 2.]];

        let y = dense.forward(&PARAMS, x.view(), Precision::Full).unwrap();

        assert_eq!(y, array![[4.5, 5.5], [6.5, 7.5]]);
    }

    #[test]
    fn forward_rejects_wrong_width() {
        let mut dense = Dense::new((2, 2), None);
        let x = array![[1., 1., 1.]];

        let err = dense.forward(&PARAMS, x.view(), Precision::Full).unwrap_err();
        assert!(matches!(err, MlErr::SizeMismatch { got: 3, expected: 2, .. }));
    }

    #[test]
    fn backward_writes_gradient() {
        let mut dense = Dense::new((2, 2), None);
        let x = array![[1., 2.]];
        dense.forward(&PARAMS, x.view(), Precision::Full).unwrap();

        let mut grad = [0.; 6];
        let dx = dense
            .backward(&PARAMS, &mut grad, array![[1., 0.]])
            .unwrap();

        assert_eq!(grad, [1., 0., 2., 0., 1., 0.]);
        assert_eq!(dx, array![[1., 3.]]);
    }

    #[test]
    fn no_cache_is_kept_without_gradients() {
        let mut dense = Dense::new((2, 2), None);
        let x = array![[1., 2.]];
        {
            let _guard = grad::no_grad();
            dense.forward(&PARAMS, x.view(), Precision::Full).unwrap();
        }

        let mut grad = [0.; 6];
        let err = dense.backward(&PARAMS, &mut grad, array![[1., 0.]]);
        assert!(matches!(err, Err(MlErr::MissingForwardCache)));
    }
}
