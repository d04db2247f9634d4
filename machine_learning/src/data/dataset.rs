use std::{fs, ops::Range, path::Path};

use ndarray::{Array2, Axis};
use rand::{Rng, seq::SliceRandom};

use super::Batch;
use crate::{MlErr, Result};

/// An in-memory labelled dataset, one sample per row.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    x: Array2<f32>,
    cls: Vec<usize>,
}

impl InMemoryDataset {
    /// Creates a new dataset from owned buffers.
    ///
    /// # Returns
    /// The dataset, or an error if `x` and `cls` disagree on the sample count.
    pub fn new(x: Array2<f32>, cls: Vec<usize>) -> Result<Self> {
        if x.nrows() != cls.len() {
            return Err(MlErr::SizeMismatch {
                what: "dataset labels",
                got: cls.len(),
                expected: x.nrows(),
            });
        }
        Ok(Self { x, cls })
    }

    /// Reads a CSV split: one sample per line as `label,f1,f2,...`. Empty lines and lines
    /// starting with `#` are skipped.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let parse_err = |line, msg: String| MlErr::Parse {
            path: path.to_path_buf(),
            line,
            msg,
        };

        let mut features = Vec::new();
        let mut cls = Vec::new();
        let mut width = None;

        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split(',').map(str::trim);
            let label = fields.next().unwrap_or_default();
            let label = label
                .parse()
                .map_err(|_| parse_err(i + 1, format!("invalid label '{label}'")))?;

            let row = fields
                .map(|v| {
                    v.parse::<f32>()
                        .map_err(|_| parse_err(i + 1, format!("invalid feature '{v}'")))
                })
                .collect::<Result<Vec<_>>>()?;

            match width {
                None => width = Some(row.len()),
                Some(w) if w != row.len() => {
                    return Err(parse_err(
                        i + 1,
                        format!("expected {w} features, got {}", row.len()),
                    ));
                }
                Some(_) => {}
            }

            cls.push(label);
            features.extend(row);
        }

        let x = Array2::from_shape_vec((cls.len(), width.unwrap_or(0)), features)
            .map_err(|e| parse_err(0, e.to_string()))?;
        Self::new(x, cls)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cls.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cls.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.x.ncols()
    }

    /// Copies the samples in `range` into a `Batch`.
    pub fn batch(&self, range: Range<usize>) -> Batch {
        Batch {
            img: self.x.slice(ndarray::s![range.clone(), ..]).to_owned(),
            cls: self.cls[range.clone()].to_vec(),
            ids: range.collect(),
        }
    }

    /// Shuffles the samples in place.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);

        self.x = self.x.select(Axis(0), &order);
        self.cls = order.iter().map(|&i| self.cls[i]).collect();
    }
}
