use std::num::NonZeroUsize;

use super::{Batch, InMemoryDataset};

/// Ordered, synchronous loader over an in-memory dataset. The last batch may be short.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: InMemoryDataset,
    batch_size: NonZeroUsize,
}

impl DataLoader {
    pub fn new(dataset: InMemoryDataset, batch_size: NonZeroUsize) -> Self {
        Self {
            dataset,
            batch_size,
        }
    }

    /// Returns the number of batches a full pass yields.
    #[inline]
    pub fn len(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size.get())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    pub fn dataset(&self) -> &InMemoryDataset {
        &self.dataset
    }

    pub fn dataset_mut(&mut self) -> &mut InMemoryDataset {
        &mut self.dataset
    }

    /// Iterates the dataset once, in order.
    pub fn iter(&self) -> Batches<'_> {
        Batches {
            loader: self,
            cursor: 0,
        }
    }
}

impl<'a> IntoIterator for &'a DataLoader {
    type Item = Batch;
    type IntoIter = Batches<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the batches of a `DataLoader`.
pub struct Batches<'a> {
    loader: &'a DataLoader,
    cursor: usize,
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let total = self.loader.dataset.len();
        if self.cursor >= total {
            return None;
        }

        let end = (self.cursor + self.loader.batch_size()).min(total);
        let batch = self.loader.dataset.batch(self.cursor..end);
        self.cursor = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.loader.len() - self.cursor.div_ceil(self.loader.batch_size());
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Batches<'_> {}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;

    fn loader(samples: usize, batch_size: usize) -> DataLoader {
        let x = Array2::from_shape_fn((samples, 1), |(i, _)| i as f32);
        let ds = InMemoryDataset::new(x, vec![0; samples]).unwrap();
        DataLoader::new(ds, NonZeroUsize::new(batch_size).unwrap())
    }

    #[test]
    fn batches_respect_order_and_size() {
        let dl = loader(5, 2);
        assert_eq!(dl.len(), 3);

        let ids: Vec<Vec<usize>> = dl.iter().map(|b| b.ids).collect();
        assert_eq!(ids, vec![vec![0, 1], vec![2, 3], vec![4]]);
        assert_eq!(dl.iter().len(), 3);
    }

    #[test]
    fn empty_loader_yields_nothing() {
        let dl = loader(0, 4);
        assert_eq!(dl.len(), 0);
        assert!(dl.iter().next().is_none());
    }
}
