use std::{collections::BTreeMap, path::Path};

use machine_learning::{
    Device,
    arch::Precision,
    data::{Batch, DataLoader, DatasetDescriptor},
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    backend::Predictor,
    error::{Result, ValError},
};

/// A single reported statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stat {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Stat {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Stat::Scalar(v) => Some(*v),
            Stat::Vector(_) => None,
        }
    }
}

impl From<f64> for Stat {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<f32> for Stat {
    fn from(value: f32) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<usize> for Stat {
    fn from(value: usize) -> Self {
        Self::Scalar(value as f64)
    }
}

impl From<Vec<f64>> for Stat {
    fn from(value: Vec<f64>) -> Self {
        Self::Vector(value)
    }
}

/// Statistics keyed by name, e.g. `metrics/accuracy_top1` or `val/ce`.
pub type StatsMap = BTreeMap<String, Stat>;

/// What an accumulator is told about the run it is about to observe.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub data: Option<&'a DatasetDescriptor>,
    pub device: Device,
    pub precision: Precision,
    /// Whether the run is embedded in a training loop.
    pub training: bool,
    pub save_dir: &'a Path,
}

/// The task specific half of a validation run.
///
/// Every hook has a neutral default so a task only overrides what it needs. The accumulator
/// lives across runs, `init_metrics` is called at the start of each one.
pub trait MetricsAccumulator {
    /// Builds a loader over the given split.
    ///
    /// # Arguments
    /// * `split` - The split file to load.
    /// * `batch_size` - The number of samples per batch.
    /// * `imgsz` - The checked input size.
    fn get_dataloader(&self, split: &Path, batch_size: usize, imgsz: usize) -> Result<DataLoader> {
        let _ = (split, batch_size, imgsz);
        Err(ValError::Configuration(
            "get_dataloader is not implemented for this task".into(),
        ))
    }

    fn preprocess(&mut self, batch: Batch) -> Result<Batch> {
        Ok(batch)
    }

    /// Turns raw model outputs into final predictions.
    fn postprocess(&mut self, preds: Array2<f32>) -> Result<Array2<f32>> {
        Ok(preds)
    }

    /// Resets the accumulated state for a new run.
    fn init_metrics(&mut self, model: &dyn Predictor, ctx: &RunContext<'_>) {
        let _ = (model, ctx);
    }

    fn update_metrics(&mut self, preds: &Array2<f32>, batch: &Batch) -> Result<()> {
        let _ = (preds, batch);
        Ok(())
    }

    fn get_stats(&mut self) -> StatsMap {
        StatsMap::new()
    }

    /// Inspects the final statistics, warning about anything suspicious.
    fn check_stats(&self, stats: &StatsMap) {
        let _ = stats;
    }

    fn print_results(&self) {}

    /// The header line shown above the progress of a run.
    fn get_desc(&self) -> String {
        String::new()
    }

    /// The metric keys `get_stats` reports.
    fn metric_keys(&self) -> Vec<String> {
        Vec::new()
    }

    fn plot_val_samples(&mut self, batch: &Batch, batch_i: usize) {
        let _ = (batch, batch_i);
    }

    fn plot_predictions(&mut self, batch: &Batch, preds: &Array2<f32>, batch_i: usize) {
        let _ = (batch, preds, batch_i);
    }

    /// Appends one exportable record per prediction to `jdict`.
    fn pred_to_json(&self, preds: &Array2<f32>, batch: &Batch, jdict: &mut Vec<Value>) {
        let _ = (preds, batch, jdict);
    }

    /// Scores an exported predictions file, returning the augmented statistics.
    fn eval_json(&mut self, stats: StatsMap, predictions: &Path) -> Result<StatsMap> {
        let _ = predictions;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_serialize_untagged() {
        let mut stats = StatsMap::new();
        stats.insert("fitness".into(), Stat::from(0.5));
        stats.insert("per_class".into(), Stat::from(vec![1.0, 0.0]));

        let json = serde_json::to_string(&stats).unwrap();
        assert_eq!(json, r#"{"fitness":0.5,"per_class":[1.0,0.0]}"#);
    }

    #[test]
    fn default_dataloader_is_not_implemented() {
        struct Bare;
        impl MetricsAccumulator for Bare {}

        let err = Bare.get_dataloader(Path::new("val.csv"), 4, 32).unwrap_err();
        assert!(matches!(err, ValError::Configuration(_)));
    }
}
