use log::error;
use machine_learning::{MlErr, data::Batch, grad};
use ndarray::Array1;
use serde_json::Value;

use crate::{
    backend::Predictor,
    error::{Result, Stage, ValError},
    metrics::MetricsAccumulator,
    profile::StageTimers,
    trainer::LossCriterion,
};

/// Batches below this index get their samples and predictions plotted.
const PLOTTED_BATCHES: usize = 3;

/// The criterion of an embedded run and the loss summed over its batches.
pub(crate) struct LossTracker<'a> {
    pub criterion: &'a dyn LossCriterion,
    pub total: &'a mut Array1<f32>,
}

/// Drives single batches through preprocess, inference, loss, postprocess and metrics.
pub(crate) struct BatchPipeline<'a> {
    pub accumulator: &'a mut dyn MetricsAccumulator,
    pub model: &'a mut dyn Predictor,
    pub loss: Option<LossTracker<'a>>,
    pub timers: &'a mut StageTimers,
    pub plots: bool,
    /// Collects exportable records when JSON export was asked for.
    pub jdict: Option<&'a mut Vec<Value>>,
}

impl BatchPipeline<'_> {
    /// Runs one batch, failing with the stage and batch index that raised.
    pub fn run(&mut self, batch_i: usize, batch: Batch) -> Result<()> {
        self.step(batch_i, batch).inspect_err(|e| error!("{e}"))
    }

    fn step(&mut self, batch_i: usize, batch: Batch) -> Result<()> {
        let accumulator = &mut *self.accumulator;
        let model = &mut *self.model;

        let batch = self
            .timers
            .preprocess
            .time(|| accumulator.preprocess(batch))
            .map_err(|e| ValError::stage(Stage::Preprocess, batch_i, e))?;

        let preds = self
            .timers
            .inference
            .time(|| {
                let _guard = grad::no_grad();
                model.forward(batch.img.view())
            })
            .map_err(|e| ValError::stage(Stage::Inference, batch_i, e))?;

        if let Some(loss) = &mut self.loss {
            self.timers
                .loss
                .time(|| -> machine_learning::Result<()> {
                    let items = loss.criterion.loss_items(preds.view(), &batch)?;
                    if items.len() != loss.total.len() {
                        return Err(MlErr::SizeMismatch {
                            what: "loss items",
                            got: items.len(),
                            expected: loss.total.len(),
                        });
                    }

                    *loss.total += &items;
                    Ok(())
                })
                .map_err(|e| ValError::stage(Stage::Loss, batch_i, e))?;
        }

        let preds = self
            .timers
            .postprocess
            .time(|| accumulator.postprocess(preds))
            .map_err(|e| ValError::stage(Stage::Postprocess, batch_i, e))?;

        accumulator
            .update_metrics(&preds, &batch)
            .map_err(|e| ValError::stage(Stage::UpdateMetrics, batch_i, e))?;

        if let Some(jdict) = &mut self.jdict {
            accumulator.pred_to_json(&preds, &batch, jdict);
        }

        if self.plots && batch_i < PLOTTED_BATCHES {
            accumulator.plot_val_samples(&batch, batch_i);
            accumulator.plot_predictions(&batch, &preds, batch_i);
        }

        Ok(())
    }
}
