use ndarray::{Array2, ArrayView2};

use super::{Dense, Dropout};
use crate::{
    Result,
    arch::{LayerSpec, Precision},
};

#[derive(Clone, Debug)]
pub enum Layer {
    Dense(Dense),
    Dropout(Dropout),
}
use Layer::*;

impl Layer {
    /// Returns the amount of parameters this layer reads from the model's parameter buffer.
    pub fn size(&self) -> usize {
        match self {
            Dense(l) => l.size(),
            Dropout(_) => 0,
        }
    }

    pub fn forward(
        &mut self,
        params: &[f32],
        x: ArrayView2<f32>,
        precision: Precision,
        training: bool,
    ) -> Result<Array2<f32>> {
        match self {
            Dense(l) => l.forward(params, x, precision),
            Dropout(l) => Ok(l.forward(x, training)),
        }
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        match self {
            Dense(l) => l.backward(params, grad, d),
            Dropout(l) => Ok(l.backward(d)),
        }
    }

    pub fn spec(&self) -> LayerSpec {
        match self {
            Dense(l) => LayerSpec::Dense {
                dim: l.dim(),
                act_fn: l.act_fn().map(|f| f.spec()),
            },
            Dropout(l) => LayerSpec::Dropout { p: l.p() },
        }
    }
}

impl From<LayerSpec> for Layer {
    fn from(spec: LayerSpec) -> Self {
        match spec {
            LayerSpec::Dense { dim, act_fn } => Dense(super::Dense::new(dim, act_fn.map(Into::into))),
            LayerSpec::Dropout { p } => Dropout(super::Dropout::new(p)),
        }
    }
}
