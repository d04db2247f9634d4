use ndarray::Array2;

use crate::{MlErr, Result};

/// One unit of evaluation input: a row per sample plus its ground truth.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Model input, one sample per row.
    pub img: Array2<f32>,
    /// Ground truth class of every sample.
    pub cls: Vec<usize>,
    /// Position of every sample in its dataset.
    pub ids: Vec<usize>,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.cls.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cls.is_empty()
    }

    /// Encodes the ground truth as one-hot rows.
    ///
    /// # Arguments
    /// * `nc` - The number of classes.
    ///
    /// # Returns
    /// A `(len, nc)` matrix, or an error if a label is out of range.
    pub fn one_hot(&self, nc: usize) -> Result<Array2<f32>> {
        let mut y = Array2::zeros((self.len(), nc));

        for (row, &c) in self.cls.iter().enumerate() {
            if c >= nc {
                return Err(MlErr::SizeMismatch {
                    what: "class label",
                    got: c,
                    expected: nc,
                });
            }
            y[[row, c]] = 1.;
        }

        Ok(y)
    }
}
