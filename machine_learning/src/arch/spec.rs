use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{MlErr, Result};

const DEFAULT_STRIDE: usize = 32;

fn default_stride() -> usize {
    DEFAULT_STRIDE
}

/// The specification for the `ActFn` enum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFnSpec {
    Sigmoid { amp: f32 },
    Relu,
}

/// The specification for the `Layer` enum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerSpec {
    Dense {
        dim: (usize, usize),
        act_fn: Option<ActFnSpec>,
    },
    Dropout {
        p: f32,
    },
}

/// The specification for a `Sequential` model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub layers: Vec<LayerSpec>,
    /// Input resolution granularity reported to evaluation backends.
    #[serde(default = "default_stride")]
    pub stride: usize,
}

impl ModelSpec {
    /// Builds a multilayer perceptron spec with `act_fn` on every hidden layer and raw outputs.
    ///
    /// # Arguments
    /// * `dims` - The width of every layer, input first.
    /// * `act_fn` - The hidden activation.
    pub fn mlp(dims: &[usize], act_fn: ActFnSpec) -> Self {
        let n = dims.len().saturating_sub(1);
        let layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, w)| LayerSpec::Dense {
                dim: (w[0], w[1]),
                act_fn: (i + 1 < n).then_some(act_fn),
            })
            .collect();

        Self {
            layers,
            stride: DEFAULT_STRIDE,
        }
    }

    /// Checks that the spec describes a buildable model.
    ///
    /// # Returns
    /// The `(input, output)` widths of the model.
    pub fn validate(&self) -> Result<(usize, usize)> {
        if self.stride == 0 {
            return Err(MlErr::InvalidSpec("stride must be greater than 0".into()));
        }

        let mut dims = None::<(usize, usize)>;

        for (i, layer) in self.layers.iter().enumerate() {
            match *layer {
                LayerSpec::Dense { dim: (n, m), .. } => {
                    if n == 0 || m == 0 {
                        return Err(MlErr::InvalidSpec(format!("layer {i}: zero sized dense")));
                    }
                    if let Some((_, prev_m)) = dims {
                        if prev_m != n {
                            return Err(MlErr::InvalidSpec(format!(
                                "layer {i}: input size ({n}) does not match previous layer output size ({prev_m})"
                            )));
                        }
                    }
                    dims = Some((dims.map_or(n, |(input, _)| input), m));
                }
                LayerSpec::Dropout { p } => {
                    if !(0.0..1.0).contains(&p) {
                        return Err(MlErr::InvalidSpec(format!(
                            "layer {i}: dropout probability {p} outside [0, 1)"
                        )));
                    }
                }
            }
        }

        dims.ok_or_else(|| MlErr::InvalidSpec("model must have at least one dense layer".into()))
    }
}

/// A model serialized in the native artifact format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub spec: ModelSpec,
    pub params: Vec<f32>,
}

impl ModelArtifact {
    /// Reads an artifact from a JSON file.
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes the artifact as a JSON file.
    pub fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mlp_spec_only_activates_hidden_layers() {
        let spec = ModelSpec::mlp(&[4, 8, 3], ActFnSpec::Relu);
        assert_eq!(
            spec.layers,
            vec![
                LayerSpec::Dense {
                    dim: (4, 8),
                    act_fn: Some(ActFnSpec::Relu)
                },
                LayerSpec::Dense {
                    dim: (8, 3),
                    act_fn: None
                },
            ]
        );
        assert_eq!(spec.validate().unwrap(), (4, 3));
    }

    #[test]
    fn rejects_mismatched_layers() {
        let spec = ModelSpec {
            layers: vec![
                LayerSpec::Dense {
                    dim: (2, 3),
                    act_fn: None,
                },
                LayerSpec::Dropout { p: 0.1 },
                LayerSpec::Dense {
                    dim: (4, 1),
                    act_fn: None,
                },
            ],
            stride: 32,
        };
        assert!(matches!(spec.validate(), Err(MlErr::InvalidSpec(_))));
    }

    #[test]
    fn rejects_models_without_dense_layers() {
        let spec = ModelSpec {
            layers: vec![LayerSpec::Dropout { p: 0.5 }],
            stride: 32,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn stride_defaults_when_missing() {
        let spec: ModelSpec =
            serde_json::from_str(r#"{"layers":[{"dense":{"dim":[2,1],"act_fn":null}}]}"#).unwrap();
        assert_eq!(spec.stride, 32);
    }
}
