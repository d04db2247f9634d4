use machine_learning::{
    Device,
    data::{Batch, DatasetDescriptor},
    training::{Criterion, ModelTrainer},
};
use ndarray::{Array1, ArrayView2};

use crate::{
    backend::Predictor,
    metrics::{Stat, StatsMap},
};

/// A loss with named terms, evaluated on raw predictions.
pub trait LossCriterion {
    /// Returns the per-term loss vector for one batch.
    fn loss_items(
        &self,
        preds: ArrayView2<f32>,
        batch: &Batch,
    ) -> machine_learning::Result<Array1<f32>>;
}

impl LossCriterion for Criterion {
    fn loss_items(
        &self,
        preds: ArrayView2<f32>,
        batch: &Batch,
    ) -> machine_learning::Result<Array1<f32>> {
        self.loss(preds, batch).map(|(_, items)| items)
    }
}

/// The model and criterion of a trainer, borrowed together for a validation pass.
pub struct TrainerParts<'a> {
    pub model: &'a mut dyn Predictor,
    pub criterion: &'a dyn LossCriterion,
}

/// What an embedded validation run needs from the training loop that owns it.
pub trait TrainerHandle {
    fn device(&self) -> Device;

    /// Whether the trainer runs in half precision.
    fn half(&self) -> bool;

    /// The dataset the trainer was set up from, if any.
    fn data(&self) -> Option<&DatasetDescriptor>;

    /// The current epoch, counted from zero.
    fn epoch(&self) -> usize;

    fn epochs(&self) -> usize;

    /// Names of the loss terms, in the order the criterion reports them.
    fn loss_names(&self) -> Vec<String>;

    /// Borrows the model to validate and the criterion to score it with.
    fn parts(&mut self) -> TrainerParts<'_>;

    /// Labels a loss vector as `<prefix>/<term>` statistics.
    fn label_loss_items(&self, items: &Array1<f32>, prefix: &str) -> StatsMap {
        self.loss_names()
            .into_iter()
            .zip(items.iter())
            .map(|(name, &v)| (format!("{prefix}/{name}"), Stat::from(v)))
            .collect()
    }
}

impl TrainerHandle for ModelTrainer {
    fn device(&self) -> Device {
        ModelTrainer::device(self)
    }

    fn half(&self) -> bool {
        ModelTrainer::half(self)
    }

    fn data(&self) -> Option<&DatasetDescriptor> {
        ModelTrainer::data(self)
    }

    fn epoch(&self) -> usize {
        ModelTrainer::epoch(self)
    }

    fn epochs(&self) -> usize {
        ModelTrainer::epochs(self)
    }

    fn loss_names(&self) -> Vec<String> {
        Criterion::TERMS.iter().map(|t| t.to_string()).collect()
    }

    fn parts(&mut self) -> TrainerParts<'_> {
        let (model, criterion) = self.eval_parts();
        TrainerParts { model, criterion }
    }
}
