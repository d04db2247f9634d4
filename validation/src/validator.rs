use std::{borrow::Cow, fs, path::Path, path::PathBuf};

use log::{debug, info};
use machine_learning::{arch::Precision, data::DataLoader};
use serde_json::Value;

use crate::{
    backend::{AutoBackend, BackendLoader, ModelSource},
    config::RunConfig,
    dataset::{DatasetResolver, DefaultResolver},
    error::Result,
    metrics::{MetricsAccumulator, RunContext, StatsMap},
    mode::{self, Collaborators, Resolved, RunMode, RunTarget},
    paths,
    pipeline::BatchPipeline,
    profile::{SpeedProfile, StageTimers},
    progress::Progress,
    tasks,
    trainer::TrainerHandle,
};

/// Name of the exported predictions file inside the run directory.
pub const PREDICTIONS_FILE: &str = "predictions.json";

/// Runs evaluation passes and reports their statistics.
///
/// A validator is built once and may be run many times, e.g. once per training epoch. Each
/// run works on its own copy of the configuration, so per-run adjustments never leak into
/// the next one.
pub struct Validator {
    args: RunConfig,
    save_dir: PathBuf,
    dataloader: Option<DataLoader>,
    /// The loader built for the trainer's dataset by the first embedded run.
    trainer_loader: Option<DataLoader>,
    accumulator: Box<dyn MetricsAccumulator>,
    backends: Box<dyn BackendLoader>,
    resolver: Box<dyn DatasetResolver>,
    speed: Option<SpeedProfile>,
}

impl Validator {
    /// Returns a validator for `args` with the default collaborators.
    pub fn new(args: RunConfig) -> Result<Self> {
        Self::builder().config(args).build()
    }

    pub fn builder() -> ValidatorBuilder {
        ValidatorBuilder::default()
    }

    pub fn args(&self) -> &RunConfig {
        &self.args
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// The per-sample stage timings of the last run, `None` before the first run or when it
    /// saw no samples.
    pub fn speed(&self) -> Option<SpeedProfile> {
        self.speed
    }

    pub fn metric_keys(&self) -> Vec<String> {
        self.accumulator.metric_keys()
    }

    /// Validates whichever of the two handles is given.
    ///
    /// # Errors
    /// A configuration error if both or neither are given, otherwise whatever the run fails
    /// with.
    pub fn call(
        &mut self,
        trainer: Option<&mut dyn TrainerHandle>,
        model: Option<ModelSource>,
    ) -> Result<StatsMap> {
        let target = RunTarget::from_handles(trainer, model)?;
        self.run(target)
    }

    /// Runs one full evaluation pass.
    ///
    /// # Arguments
    /// * `target` - The training loop or standalone model to evaluate.
    ///
    /// # Returns
    /// The task statistics. Embedded runs add the mean validation loss as `val/<term>`.
    pub fn run(&mut self, target: RunTarget<'_>) -> Result<StatsMap> {
        self.speed = None;

        let supplied = match &target {
            RunTarget::Trainer(_) => self.dataloader.as_ref().or(self.trainer_loader.as_ref()),
            RunTarget::Model(_) => self.dataloader.as_ref(),
        };
        let deps = Collaborators {
            backends: self.backends.as_ref(),
            resolver: self.resolver.as_ref(),
            accumulator: self.accumulator.as_ref(),
        };
        let Resolved {
            mut mode,
            args,
            device,
            precision,
            data,
            loader,
        } = mode::resolve(target, &self.args, supplied, &deps)?;

        debug!(
            "validating on {device} with {} batches of {}",
            loader.len(),
            loader.batch_size()
        );

        mode.model().eval();
        let ctx = RunContext {
            data: data.as_ref(),
            device,
            precision,
            training: mode.is_embedded(),
            save_dir: &self.save_dir,
        };
        self.accumulator.init_metrics(mode.model(), &ctx);

        let mut timers = StageTimers::default();
        let mut jdict = Vec::new();
        let export = args.save_json && !mode.is_embedded();
        let progress = Progress::new(&self.accumulator.get_desc(), loader.len());

        {
            let (model, loss) = mode.pipeline_parts();
            let mut pipeline = BatchPipeline {
                accumulator: self.accumulator.as_mut(),
                model,
                loss,
                timers: &mut timers,
                plots: args.plots,
                jdict: export.then_some(&mut jdict),
            };

            for (batch_i, batch) in loader.iter().enumerate() {
                pipeline.run(batch_i, batch)?;
                progress.update(batch_i);
            }
        }

        let mut stats = self.accumulator.get_stats();
        self.accumulator.check_stats(&stats);
        self.accumulator.print_results();
        self.speed = SpeedProfile::from_timers(&timers, loader.dataset().len());

        match mode {
            RunMode::Embedded { trainer, loss } => {
                trainer.parts().model.set_precision(Precision::Full);

                let mean = loss / loader.len().max(1) as f32;
                stats.extend(trainer.label_loss_items(&mean, "val"));

                if let Cow::Owned(loader) = loader {
                    self.trainer_loader = Some(loader);
                }
                Ok(stats)
            }
            RunMode::Standalone { .. } => {
                match &self.speed {
                    Some(speed) => info!("Speed: {speed}"),
                    None => info!("Speed: n/a, no samples were evaluated"),
                }

                if export && !jdict.is_empty() {
                    stats = export_predictions(
                        self.accumulator.as_mut(),
                        &self.save_dir,
                        stats,
                        &jdict,
                    )?;
                }

                Ok(stats)
            }
        }
    }
}

/// Writes the collected records to the run directory and lets the accumulator score them.
fn export_predictions(
    accumulator: &mut dyn MetricsAccumulator,
    save_dir: &Path,
    stats: StatsMap,
    jdict: &[Value],
) -> Result<StatsMap> {
    let path = save_dir.join(PREDICTIONS_FILE);
    info!("saving {}...", path.display());

    let file = fs::File::create(&path)?;
    serde_json::to_writer(file, jdict)?;
    accumulator.eval_json(stats, &path)
}

/// Assembles a [`Validator`], defaulting every collaborator that is not given.
#[derive(Default)]
pub struct ValidatorBuilder {
    args: Option<RunConfig>,
    save_dir: Option<PathBuf>,
    dataloader: Option<DataLoader>,
    accumulator: Option<Box<dyn MetricsAccumulator>>,
    backends: Option<Box<dyn BackendLoader>>,
    resolver: Option<Box<dyn DatasetResolver>>,
}

impl ValidatorBuilder {
    pub fn config(mut self, args: RunConfig) -> Self {
        self.args = Some(args);
        self
    }

    /// Writes artifacts to `save_dir` instead of an incremented run directory.
    pub fn save_dir(mut self, save_dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(save_dir.into());
        self
    }

    /// Evaluates on `dataloader` instead of building one from the dataset.
    pub fn dataloader(mut self, dataloader: DataLoader) -> Self {
        self.dataloader = Some(dataloader);
        self
    }

    pub fn accumulator(mut self, accumulator: Box<dyn MetricsAccumulator>) -> Self {
        self.accumulator = Some(accumulator);
        self
    }

    pub fn backends(mut self, backends: Box<dyn BackendLoader>) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn resolver(mut self, resolver: Box<dyn DatasetResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Validates the configuration and creates the run directory.
    pub fn build(self) -> Result<Validator> {
        let args = self.args.unwrap_or_default();
        args.validate()?;

        let accumulator = match self.accumulator {
            Some(accumulator) => accumulator,
            None => tasks::accumulator_for(args.task)?,
        };
        let save_dir = paths::prepare_save_dir(&args, self.save_dir)?;

        Ok(Validator {
            args,
            save_dir,
            dataloader: self.dataloader,
            trainer_loader: None,
            accumulator,
            backends: self.backends.unwrap_or_else(|| Box::new(AutoBackend)),
            resolver: self.resolver.unwrap_or_else(|| Box::new(DefaultResolver)),
            speed: None,
        })
    }
}
