use std::{fs, num::NonZeroUsize, path::Path};

use log::{info, warn};
use machine_learning::{
    MlErr,
    arch::{Precision, loss::softmax},
    data::{Batch, DataLoader, InMemoryDataset},
};
use ndarray::{Array2, ArrayView1};
use serde_json::{Value, json};

use crate::{
    backend::Predictor,
    error::{Result, ValError},
    metrics::{MetricsAccumulator, RunContext, Stat, StatsMap},
};

const TOP1: &str = "metrics/accuracy_top1";
const TOP5: &str = "metrics/accuracy_top5";
const FITNESS: &str = "fitness";
const JSON_RECORDS: &str = "metrics/json_records";

/// Top-1 and top-5 accuracy over class probability rows.
#[derive(Debug, Default)]
pub struct ClassificationMetrics {
    names: Vec<String>,
    nc: usize,
    precision: Precision,
    seen: usize,
    top1: usize,
    top5: usize,
}

impl ClassificationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn accuracies(&self) -> (f64, f64) {
        if self.seen == 0 {
            return (0., 0.);
        }

        let seen = self.seen as f64;
        (self.top1 as f64 / seen, self.top5 as f64 / seen)
    }
}

/// Position of `target` when the row is sorted by descending probability, ties broken by
/// class index.
fn rank_of(row: ArrayView1<f32>, target: usize) -> usize {
    let pt = row[target];
    row.iter()
        .enumerate()
        .filter(|&(j, &p)| p > pt || (p == pt && j < target))
        .count()
}

fn argmax(row: ArrayView1<f32>) -> (usize, f32) {
    row.iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (j, p)| if p > best.1 { (j, p) } else { best })
}

impl MetricsAccumulator for ClassificationMetrics {
    fn get_dataloader(&self, split: &Path, batch_size: usize, _imgsz: usize) -> Result<DataLoader> {
        let dataset = InMemoryDataset::from_csv(split)
            .map_err(|e| ValError::dataset(split.display().to_string(), e))?;
        let batch_size = NonZeroUsize::new(batch_size)
            .ok_or_else(|| ValError::Configuration("batch_size must be positive".into()))?;

        Ok(DataLoader::new(dataset, batch_size))
    }

    fn preprocess(&mut self, mut batch: Batch) -> Result<Batch> {
        self.precision.cast(&mut batch.img);
        Ok(batch)
    }

    fn postprocess(&mut self, preds: Array2<f32>) -> Result<Array2<f32>> {
        Ok(softmax(preds.view()))
    }

    fn init_metrics(&mut self, model: &dyn Predictor, ctx: &RunContext<'_>) {
        self.names = ctx.data.map(|d| d.names.clone()).unwrap_or_default();
        self.nc = model.output_dim().unwrap_or(self.names.len());
        self.precision = ctx.precision;
        self.seen = 0;
        self.top1 = 0;
        self.top5 = 0;
    }

    fn update_metrics(&mut self, preds: &Array2<f32>, batch: &Batch) -> Result<()> {
        if preds.nrows() != batch.len() {
            return Err(MlErr::SizeMismatch {
                what: "prediction rows",
                got: preds.nrows(),
                expected: batch.len(),
            }
            .into());
        }

        if self.nc > 0 && preds.ncols() != self.nc {
            return Err(MlErr::SizeMismatch {
                what: "prediction columns",
                got: preds.ncols(),
                expected: self.nc,
            }
            .into());
        }

        for (row, &target) in preds.rows().into_iter().zip(&batch.cls) {
            if target >= row.len() {
                return Err(MlErr::SizeMismatch {
                    what: "class label",
                    got: target,
                    expected: row.len(),
                }
                .into());
            }

            let rank = rank_of(row, target);
            self.top1 += usize::from(rank == 0);
            self.top5 += usize::from(rank < 5);
            self.seen += 1;
        }

        Ok(())
    }

    fn get_stats(&mut self) -> StatsMap {
        let (top1, top5) = self.accuracies();

        StatsMap::from([
            (TOP1.to_string(), Stat::from(top1)),
            (TOP5.to_string(), Stat::from(top5)),
            (FITNESS.to_string(), Stat::from((top1 + top5) / 2.)),
        ])
    }

    fn check_stats(&self, stats: &StatsMap) {
        for (key, stat) in stats {
            if let Some(v) = stat.as_scalar() {
                if !(0. ..=1.).contains(&v) {
                    warn!("{key} = {v} is outside [0, 1]");
                }
            }
        }

        if self.seen == 0 {
            warn!("no samples were seen, accuracies are reported as 0");
        }
    }

    fn print_results(&self) {
        let (top1, top5) = self.accuracies();
        info!("{:>22}{:>11.3}{:>11.3}", "all", top1, top5);
    }

    fn get_desc(&self) -> String {
        format!("{:>22}{:>11}{:>11}", "classes", "top1_acc", "top5_acc")
    }

    fn metric_keys(&self) -> Vec<String> {
        vec![TOP1.to_string(), TOP5.to_string()]
    }

    fn pred_to_json(&self, preds: &Array2<f32>, batch: &Batch, jdict: &mut Vec<Value>) {
        for (row, &sample_id) in preds.rows().into_iter().zip(&batch.ids) {
            let (category_id, score) = argmax(row);
            let mut record = json!({
                "sample_id": sample_id,
                "category_id": category_id,
                "score": score,
            });

            if let Some(name) = self.names.get(category_id) {
                record["category_name"] = Value::from(name.as_str());
            }

            jdict.push(record);
        }
    }

    fn eval_json(&mut self, mut stats: StatsMap, predictions: &Path) -> Result<StatsMap> {
        let records: Vec<Value> = serde_json::from_str(&fs::read_to_string(predictions)?)?;
        info!(
            "{} holds {} records for {} samples",
            predictions.display(),
            records.len(),
            self.seen
        );

        stats.insert(JSON_RECORDS.to_string(), Stat::from(records.len()));
        Ok(stats)
    }
}
