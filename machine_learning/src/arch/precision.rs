use half::f16;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Numeric precision a model runs with.
///
/// `Half` keeps `f32` storage but rounds every weight and activation through `f16`, which is
/// what a half precision kernel would observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    #[default]
    Full,
    Half,
}

impl Precision {
    /// Returns the precision matching a `half` flag.
    pub fn from_half(half: bool) -> Self {
        if half { Precision::Half } else { Precision::Full }
    }

    pub fn is_half(self) -> bool {
        self == Precision::Half
    }

    /// Rounds a single value to this precision.
    #[inline]
    pub fn round(self, x: f32) -> f32 {
        match self {
            Precision::Full => x,
            Precision::Half => f16::from_f32(x).to_f32(),
        }
    }

    /// Rounds every element of `a` to this precision in place.
    pub fn cast(self, a: &mut Array2<f32>) {
        if self.is_half() {
            a.mapv_inplace(|x| self.round(x));
        }
    }
}
