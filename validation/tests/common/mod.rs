#![allow(dead_code)]

use std::{
    cell::RefCell,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    rc::Rc,
};

use machine_learning::{
    Device,
    arch::Precision,
    data::{Batch, DataLoader, DatasetDescriptor, InMemoryDataset},
    grad,
};
use ndarray::{Array1, Array2, ArrayView2};
use serde_json::{Value, json};
use validation::{
    Backend, BackendLoader, DatasetResolver, Formats, LossCriterion, MetricsAccumulator,
    ModelSource, Predictor, Result, RunConfig, RunContext, Stat, StatsMap, TrainerHandle,
    TrainerParts, ValError, backend::BackendOptions,
};

pub fn loader(samples: usize, batch_size: usize) -> DataLoader {
    let x = Array2::from_shape_fn((samples, 2), |(i, j)| (i * 2 + j) as f32);
    let cls = (0..samples).map(|i| i % 2).collect();
    let dataset = InMemoryDataset::new(x, cls).unwrap();
    DataLoader::new(dataset, NonZeroUsize::new(batch_size).unwrap())
}

pub fn config(save_dir: &Path) -> RunConfig {
    RunConfig {
        project: Some(save_dir.to_path_buf()),
        ..RunConfig::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Init { training: bool, precision: Precision },
    Preprocess { first_id: usize },
    Postprocess,
    Update { first_id: usize },
    PlotSamples(usize),
    PlotPredictions(usize),
    Stats,
    Check,
    Print,
    EvalJson(PathBuf),
}

/// Shared view into what a `Recorder` saw.
#[derive(Default)]
pub struct Record {
    pub events: Vec<Event>,
    /// `(split, batch_size)` of every `get_dataloader` call.
    pub loader_requests: Vec<(PathBuf, usize)>,
}

/// An accumulator that records every hook call.
pub struct Recorder {
    pub record: Rc<RefCell<Record>>,
    /// Samples in the loaders it builds.
    pub samples: usize,
    pub emit_json: bool,
    /// Fail `postprocess` on this call.
    pub fail_postprocess_at: Option<usize>,
    postprocess_calls: usize,
}

impl Recorder {
    pub fn new() -> (Self, Rc<RefCell<Record>>) {
        let record = Rc::new(RefCell::new(Record::default()));
        let recorder = Self {
            record: record.clone(),
            samples: 6,
            emit_json: true,
            fail_postprocess_at: None,
            postprocess_calls: 0,
        };
        (recorder, record)
    }

    fn push(&self, event: Event) {
        self.record.borrow_mut().events.push(event);
    }
}

impl MetricsAccumulator for Recorder {
    fn get_dataloader(&self, split: &Path, batch_size: usize, _imgsz: usize) -> Result<DataLoader> {
        self.record
            .borrow_mut()
            .loader_requests
            .push((split.to_path_buf(), batch_size));
        Ok(loader(self.samples, batch_size))
    }

    fn preprocess(&mut self, batch: Batch) -> Result<Batch> {
        self.push(Event::Preprocess {
            first_id: batch.ids[0],
        });
        Ok(batch)
    }

    fn postprocess(&mut self, preds: Array2<f32>) -> Result<Array2<f32>> {
        let call = self.postprocess_calls;
        self.postprocess_calls += 1;
        self.push(Event::Postprocess);

        if self.fail_postprocess_at == Some(call) {
            return Err(ValError::Configuration("postprocess exploded".into()));
        }
        Ok(preds)
    }

    fn init_metrics(&mut self, _model: &dyn Predictor, ctx: &RunContext<'_>) {
        self.push(Event::Init {
            training: ctx.training,
            precision: ctx.precision,
        });
    }

    fn update_metrics(&mut self, _preds: &Array2<f32>, batch: &Batch) -> Result<()> {
        self.push(Event::Update {
            first_id: batch.ids[0],
        });
        Ok(())
    }

    fn get_stats(&mut self) -> StatsMap {
        self.push(Event::Stats);
        StatsMap::from([("fitness".to_string(), Stat::from(0.25))])
    }

    fn check_stats(&self, _stats: &StatsMap) {
        self.push(Event::Check);
    }

    fn print_results(&self) {
        self.push(Event::Print);
    }

    fn plot_val_samples(&mut self, _batch: &Batch, batch_i: usize) {
        self.push(Event::PlotSamples(batch_i));
    }

    fn plot_predictions(&mut self, _batch: &Batch, _preds: &Array2<f32>, batch_i: usize) {
        self.push(Event::PlotPredictions(batch_i));
    }

    fn pred_to_json(&self, _preds: &Array2<f32>, batch: &Batch, jdict: &mut Vec<Value>) {
        if self.emit_json {
            jdict.extend(batch.ids.iter().map(|id| json!({ "sample_id": id })));
        }
    }

    fn eval_json(&mut self, mut stats: StatsMap, predictions: &Path) -> Result<StatsMap> {
        self.push(Event::EvalJson(predictions.to_path_buf()));
        stats.insert("json".to_string(), Stat::from(1.0));
        Ok(stats)
    }
}

/// A model that outputs zeros and records the state it was called in.
#[derive(Default)]
pub struct FakeModel {
    pub grad_during_forward: Rc<RefCell<Vec<bool>>>,
    pub precisions: Rc<RefCell<Vec<Precision>>>,
    pub evals: Rc<RefCell<usize>>,
}

impl Predictor for FakeModel {
    fn forward(&mut self, img: ArrayView2<f32>) -> machine_learning::Result<Array2<f32>> {
        self.grad_during_forward
            .borrow_mut()
            .push(grad::is_grad_enabled());
        Ok(Array2::zeros((img.nrows(), 2)))
    }

    fn eval(&mut self) {
        *self.evals.borrow_mut() += 1;
    }

    fn set_precision(&mut self, precision: Precision) {
        self.precisions.borrow_mut().push(precision);
    }
}

pub struct FakeBackend {
    pub model: FakeModel,
    pub formats: Formats,
    pub batch_size: Option<usize>,
    pub device: Device,
}

impl Predictor for FakeBackend {
    fn forward(&mut self, img: ArrayView2<f32>) -> machine_learning::Result<Array2<f32>> {
        self.model.forward(img)
    }

    fn eval(&mut self) {
        self.model.eval();
    }

    fn set_precision(&mut self, precision: Precision) {
        self.model.set_precision(precision);
    }
}

impl Backend for FakeBackend {
    fn stride(&self) -> usize {
        32
    }

    fn formats(&self) -> Formats {
        self.formats
    }

    fn device(&self) -> Device {
        self.device
    }

    fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }
}

/// Hands out `FakeBackend`s and remembers how it was asked to.
pub struct FakeLoader {
    pub formats: Formats,
    pub batch_size: Option<usize>,
    pub grad_during_forward: Rc<RefCell<Vec<bool>>>,
    pub opts: Rc<RefCell<Vec<BackendOptions>>>,
}

impl FakeLoader {
    pub fn new(formats: Formats) -> Self {
        Self {
            formats,
            batch_size: None,
            grad_during_forward: Rc::default(),
            opts: Rc::default(),
        }
    }
}

impl BackendLoader for FakeLoader {
    fn load(&self, _source: ModelSource, opts: &BackendOptions) -> Result<Box<dyn Backend>> {
        self.opts.borrow_mut().push(*opts);
        Ok(Box::new(FakeBackend {
            model: FakeModel {
                grad_during_forward: self.grad_during_forward.clone(),
                ..FakeModel::default()
            },
            formats: self.formats,
            batch_size: self.batch_size,
            device: opts.device,
        }))
    }
}

pub fn native() -> Formats {
    Formats {
        native: true,
        ..Formats::default()
    }
}

/// Resolves every locator to the same descriptor.
pub struct StaticResolver(pub DatasetDescriptor);

impl StaticResolver {
    pub fn with_val() -> Self {
        Self(DatasetDescriptor {
            val: Some("val.csv".into()),
            names: vec!["a".into(), "b".into()],
            ..DatasetDescriptor::default()
        })
    }
}

impl DatasetResolver for StaticResolver {
    fn resolve(&self, _locator: &str) -> Result<DatasetDescriptor> {
        Ok(self.0.clone())
    }
}

/// A criterion reporting the same terms for every batch.
pub struct ConstLoss(pub Vec<f32>);

impl LossCriterion for ConstLoss {
    fn loss_items(
        &self,
        _preds: ArrayView2<f32>,
        _batch: &Batch,
    ) -> machine_learning::Result<Array1<f32>> {
        Ok(Array1::from(self.0.clone()))
    }
}

pub struct FakeTrainer {
    pub model: FakeModel,
    pub criterion: ConstLoss,
    pub device: Device,
    pub half: bool,
    pub epoch: usize,
    pub epochs: usize,
    pub data: Option<DatasetDescriptor>,
}

impl FakeTrainer {
    pub fn new() -> Self {
        Self {
            model: FakeModel::default(),
            criterion: ConstLoss(vec![1., 2.]),
            device: Device::Cpu,
            half: false,
            epoch: 0,
            epochs: 3,
            data: None,
        }
    }
}

impl TrainerHandle for FakeTrainer {
    fn device(&self) -> Device {
        self.device
    }

    fn half(&self) -> bool {
        self.half
    }

    fn data(&self) -> Option<&DatasetDescriptor> {
        self.data.as_ref()
    }

    fn epoch(&self) -> usize {
        self.epoch
    }

    fn epochs(&self) -> usize {
        self.epochs
    }

    fn loss_names(&self) -> Vec<String> {
        vec!["box".into(), "cls".into()]
    }

    fn parts(&mut self) -> TrainerParts<'_> {
        TrainerParts {
            model: &mut self.model,
            criterion: &self.criterion,
        }
    }
}
