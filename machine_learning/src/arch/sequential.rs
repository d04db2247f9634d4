use std::{borrow::Cow, path::Path};

use log::debug;
use ndarray::{Array2, ArrayView2};
use rand::Rng;

use super::{LayerSpec, ModelArtifact, ModelSpec, Precision, layers::Layer};
use crate::{MlErr, Result};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers. The model owns one flat parameter buffer that is
/// sliced in layer order.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Layer>,
    params: Vec<f32>,
    stride: usize,
    dims: (usize, usize),
    training: bool,
    precision: Precision,
}

impl Sequential {
    /// Creates a new `Sequential` from a spec and its parameters.
    ///
    /// # Arguments
    /// * `spec` - The model specification.
    /// * `params` - The flat parameter buffer, in layer order.
    ///
    /// # Returns
    /// A new `Sequential` in evaluation mode and full precision, or an error if the spec is
    /// invalid or the buffer doesn't match it.
    pub fn new(spec: &ModelSpec, params: Vec<f32>) -> Result<Self> {
        let dims = spec.validate()?;
        let layers: Vec<Layer> = spec.layers.iter().copied().map(Layer::from).collect();

        let size = layers.iter().map(Layer::size).sum();
        if params.len() != size {
            return Err(MlErr::SizeMismatch {
                what: "model parameters",
                got: params.len(),
                expected: size,
            });
        }

        Ok(Self {
            layers,
            params,
            stride: spec.stride,
            dims,
            training: false,
            precision: Precision::Full,
        })
    }

    /// Creates a new `Sequential` with Xavier uniform initialized weights and zero biases.
    ///
    /// # Arguments
    /// * `spec` - The model specification.
    /// * `rng` - A random number generator.
    pub fn init<R: Rng>(spec: &ModelSpec, rng: &mut R) -> Result<Self> {
        spec.validate()?;

        let mut params = Vec::new();
        for layer in &spec.layers {
            if let LayerSpec::Dense { dim: (n, m), .. } = *layer {
                let range = (6. / (n + m) as f32).sqrt();
                params.extend((0..n * m).map(|_| rng.random_range(-range..range)));
                params.extend(std::iter::repeat_n(0., m));
            }
        }

        Self::new(spec, params)
    }

    /// Loads a model from a native JSON artifact.
    pub fn load(path: &Path) -> Result<Self> {
        let artifact = ModelArtifact::read(path)?;
        debug!("loaded model artifact {}", path.display());
        Self::new(&artifact.spec, artifact.params)
    }

    /// Saves this model as a native JSON artifact.
    pub fn save(&self, path: &Path) -> Result<()> {
        let artifact = ModelArtifact {
            spec: self.spec(),
            params: self.params.clone(),
        };
        artifact.write(path)
    }

    /// Returns the specification this model can be rebuilt from.
    pub fn spec(&self) -> ModelSpec {
        ModelSpec {
            layers: self.layers.iter().map(Layer::spec).collect(),
            stride: self.stride,
        }
    }

    /// Returns the amount of parameters in the model.
    pub fn size(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn input_dim(&self) -> usize {
        self.dims.0
    }

    pub fn output_dim(&self) -> usize {
        self.dims.1
    }

    /// Enables training-only behaviour (dropout).
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Disables training-only behaviour.
    pub fn eval(&mut self) {
        self.training = false;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Runs subsequent passes in half precision.
    pub fn half(&mut self) {
        self.precision = Precision::Half;
    }

    /// Runs subsequent passes in full precision.
    pub fn float(&mut self) {
        self.precision = Precision::Full;
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `x` - The input data, one sample per row.
    ///
    /// # Returns
    /// The prediction for the given input or an error if occurred.
    pub fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let precision = self.precision;
        let params: Cow<[f32]> = match precision {
            Precision::Full => Cow::Borrowed(&self.params),
            Precision::Half => Cow::Owned(self.params.iter().map(|&w| precision.round(w)).collect()),
        };

        let mut offset = 0;
        let mut out = x.to_owned();
        precision.cast(&mut out);

        for layer in self.layers.iter_mut() {
            let size = layer.size();
            let slice = &params[offset..offset + size];
            out = layer.forward(slice, out.view(), precision, self.training)?;
            offset += size;
        }

        Ok(out)
    }

    /// Backpropagates the loss derivative of the last forward pass.
    ///
    /// # Arguments
    /// * `d` - The loss derivative with respect to the model output.
    /// * `grad` - A buffer of `size()` elements the gradient is written to.
    pub fn backward(&mut self, mut d: Array2<f32>, grad: &mut [f32]) -> Result<()> {
        if grad.len() != self.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "gradient buffer",
                got: grad.len(),
                expected: self.params.len(),
            });
        }

        let mut end = self.params.len();
        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&self.params[start..end], &mut grad[start..end], d)?;
            end = start;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::arch::ActFnSpec;

    fn identity_spec() -> ModelSpec {
        ModelSpec {
            layers: vec![LayerSpec::Dense {
                dim: (2, 2),
                act_fn: None,
            }],
            stride: 32,
        }
    }

    #[test]
    fn new_rejects_wrong_param_count() {
        let err = Sequential::new(&identity_spec(), vec![0.; 5]).unwrap_err();
        assert!(matches!(err, MlErr::SizeMismatch { got: 5, expected: 6, .. }));
    }

    #[test]
    fn forward_through_identity() {
        let mut model = Sequential::new(&identity_spec(), vec![1., 0., 0., 1., 0., 0.]).unwrap();
        let y = model.forward(array![[3., 4.]].view()).unwrap();
        assert_eq!(y, array![[3., 4.]]);
    }

    #[test]
    fn half_precision_rounds_outputs() {
        let mut model = Sequential::new(&identity_spec(), vec![1., 0., 0., 1., 0., 0.]).unwrap();
        model.half();
        let y = model.forward(array![[0.1, 0.2]].view()).unwrap();
        assert_ne!(y[[0, 0]], 0.1);

        model.float();
        let y = model.forward(array![[0.1, 0.2]].view()).unwrap();
        assert_eq!(y[[0, 0]], 0.1);
    }

    #[test]
    fn save_and_load_preserve_outputs() {
        let spec = ModelSpec::mlp(&[3, 4, 2], ActFnSpec::Sigmoid { amp: 1. });
        let mut model = Sequential::init(&spec, &mut StdRng::seed_from_u64(7)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        model.save(&path).unwrap();
        let mut loaded = Sequential::load(&path).unwrap();

        let x = array![[0.5, -1., 2.]];
        assert_eq!(model.forward(x.view()).unwrap(), loaded.forward(x.view()).unwrap());
        assert_eq!(loaded.spec(), spec);
    }

    #[test]
    fn backward_matches_finite_difference() {
        let spec = ModelSpec::mlp(&[2, 3, 1], ActFnSpec::Sigmoid { amp: 1. });
        let mut model = Sequential::init(&spec, &mut StdRng::seed_from_u64(1)).unwrap();
        let x = array![[0.3, -0.7]];

        // loss = sum(y)
        let y = model.forward(x.view()).unwrap();
        let mut grad = vec![0.; model.size()];
        model.backward(Array2::ones(y.raw_dim()), &mut grad).unwrap();

        let eps = 1e-3;
        for i in 0..model.size() {
            let w = model.params()[i];
            model.params_mut()[i] = w + eps;
            let up = model.forward(x.view()).unwrap().sum();
            model.params_mut()[i] = w - eps;
            let down = model.forward(x.view()).unwrap().sum();
            model.params_mut()[i] = w;

            let numeric = (up - down) / (2. * eps);
            assert!((numeric - grad[i]).abs() < 1e-2, "param {i}: {numeric} vs {}", grad[i]);
        }
    }
}
