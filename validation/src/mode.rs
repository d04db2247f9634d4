use std::borrow::Cow;

use log::info;
use machine_learning::{
    Device,
    arch::Precision,
    data::{DataLoader, DatasetDescriptor},
    device::select_device,
};
use ndarray::Array1;

use crate::{
    backend::{Backend, BackendLoader, BackendOptions, ModelSource, Predictor, check_imgsz},
    config::RunConfig,
    dataset::DatasetResolver,
    error::{Result, ValError},
    metrics::MetricsAccumulator,
    pipeline::LossTracker,
    trainer::TrainerHandle,
};

/// What a run evaluates: a live training loop or a standalone model.
pub enum RunTarget<'a> {
    Trainer(&'a mut dyn TrainerHandle),
    Model(ModelSource),
}

impl<'a> RunTarget<'a> {
    /// Picks the target from the two optional handles, exactly one of which must be present.
    pub fn from_handles(
        trainer: Option<&'a mut dyn TrainerHandle>,
        model: Option<ModelSource>,
    ) -> Result<Self> {
        match (trainer, model) {
            (Some(trainer), None) => Ok(Self::Trainer(trainer)),
            (None, Some(model)) => Ok(Self::Model(model)),
            (Some(_), Some(_)) => Err(ValError::Configuration(
                "either a trainer or a model must be supplied, not both".into(),
            )),
            (None, None) => Err(ValError::Configuration(
                "either a trainer or a model is needed for validation".into(),
            )),
        }
    }
}

impl<'a> From<&'a mut dyn TrainerHandle> for RunTarget<'a> {
    fn from(value: &'a mut dyn TrainerHandle) -> Self {
        Self::Trainer(value)
    }
}

impl From<ModelSource> for RunTarget<'_> {
    fn from(value: ModelSource) -> Self {
        Self::Model(value)
    }
}

/// A resolved run, holding the handles each mode owns or borrows.
pub(crate) enum RunMode<'t> {
    Embedded {
        trainer: &'t mut dyn TrainerHandle,
        /// Per-term loss summed over the batches of the run.
        loss: Array1<f32>,
    },
    Standalone {
        backend: Box<dyn Backend>,
    },
}

impl RunMode<'_> {
    pub(crate) fn is_embedded(&self) -> bool {
        matches!(self, RunMode::Embedded { .. })
    }

    pub(crate) fn model(&mut self) -> &mut dyn Predictor {
        match self {
            RunMode::Embedded { trainer, .. } => trainer.parts().model,
            RunMode::Standalone { backend } => backend as &mut dyn Predictor,
        }
    }

    /// Splits the mode into the model to run and, when embedded, the loss to track.
    pub(crate) fn pipeline_parts(&mut self) -> (&mut dyn Predictor, Option<LossTracker<'_>>) {
        match self {
            RunMode::Embedded { trainer, loss } => {
                let parts = trainer.parts();
                let tracker = LossTracker {
                    criterion: parts.criterion,
                    total: loss,
                };
                (parts.model, Some(tracker))
            }
            RunMode::Standalone { backend } => (backend as &mut dyn Predictor, None),
        }
    }
}

/// The collaborators mode resolution draws on.
pub(crate) struct Collaborators<'c> {
    pub backends: &'c dyn BackendLoader,
    pub resolver: &'c dyn DatasetResolver,
    pub accumulator: &'c dyn MetricsAccumulator,
}

/// Everything the rest of a run needs once the mode is known.
pub(crate) struct Resolved<'t, 'l> {
    pub mode: RunMode<'t>,
    /// The effective configuration of this run.
    pub args: RunConfig,
    pub device: Device,
    pub precision: Precision,
    pub data: Option<DatasetDescriptor>,
    pub loader: Cow<'l, DataLoader>,
}

/// Resolves the target into a runnable mode.
///
/// # Arguments
/// * `target` - What to evaluate.
/// * `args` - The validator's configuration, copied and adjusted for this run.
/// * `supplied` - A dataloader handed to the validator up front.
/// * `deps` - Loaders for models, datasets and splits.
pub(crate) fn resolve<'t, 'l>(
    target: RunTarget<'t>,
    args: &RunConfig,
    supplied: Option<&'l DataLoader>,
    deps: &Collaborators<'_>,
) -> Result<Resolved<'t, 'l>> {
    match target {
        RunTarget::Trainer(trainer) => resolve_embedded(trainer, args, supplied, deps),
        RunTarget::Model(source) => resolve_standalone(source, args, supplied, deps),
    }
}

fn resolve_embedded<'t, 'l>(
    trainer: &'t mut dyn TrainerHandle,
    args: &RunConfig,
    supplied: Option<&'l DataLoader>,
    deps: &Collaborators<'_>,
) -> Result<Resolved<'t, 'l>> {
    let mut args = args.clone();
    let device = trainer.device();
    args.half = trainer.half() && device.supports_half();
    args.plots = trainer.epoch() + 1 == trainer.epochs();

    let data = trainer.data().cloned();
    let loader = match supplied {
        Some(loader) => Cow::Borrowed(loader),
        None => {
            let split = data.as_ref().and_then(DatasetDescriptor::eval_split).ok_or_else(|| {
                ValError::Configuration(
                    "embedded validation needs a dataloader or a trainer dataset with a val or test split"
                        .into(),
                )
            })?;
            Cow::Owned(deps.accumulator.get_dataloader(split, args.batch_size, args.imgsz)?)
        }
    };

    // Last, so a failed resolve leaves the model untouched.
    let precision = Precision::from_half(args.half);
    trainer.parts().model.set_precision(precision);

    let loss = Array1::zeros(trainer.loss_names().len());
    Ok(Resolved {
        mode: RunMode::Embedded { trainer, loss },
        args,
        device,
        precision,
        data,
        loader,
    })
}

fn resolve_standalone<'t, 'l>(
    source: ModelSource,
    args: &RunConfig,
    supplied: Option<&'l DataLoader>,
    deps: &Collaborators<'_>,
) -> Result<Resolved<'t, 'l>> {
    let mut args = args.clone();
    let requested = select_device(&args.device, args.batch_size)
        .map_err(|e| ValError::Configuration(e.to_string()))?;
    args.half &= requested.supports_half();

    let opts = BackendOptions {
        device: requested,
        dnn: args.dnn,
        half: args.half,
    };
    let backend = deps.backends.load(source, &opts)?;
    let formats = backend.formats();
    args.imgsz = check_imgsz(args.imgsz, backend.stride());

    let device = if formats.engine {
        if let Some(batch_size) = backend.batch_size() {
            args.batch_size = batch_size;
        }
        requested
    } else {
        if !formats.native && !formats.scripted {
            args.batch_size = 1;
            info!(
                "forcing batch=1 square inference (1,{0},{0}) for non-native models",
                args.imgsz
            );
        }
        backend.device()
    };

    let data = match &args.data {
        Some(locator) => Some(deps.resolver.resolve(locator)?),
        None => None,
    };

    let loader = match supplied {
        Some(loader) => Cow::Borrowed(loader),
        None => {
            let Some(data) = &data else {
                return Err(ValError::Configuration(
                    "standalone validation needs a dataloader or a dataset locator".into(),
                ));
            };
            let locator = args.data.as_deref().unwrap_or_default();
            let split = data
                .eval_split()
                .ok_or_else(|| ValError::dataset(locator, "no 'val' or 'test' split"))?;
            Cow::Owned(deps.accumulator.get_dataloader(split, args.batch_size, args.imgsz)?)
        }
    };

    Ok(Resolved {
        mode: RunMode::Standalone { backend },
        precision: Precision::from_half(args.half),
        args,
        device,
        data,
        loader,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_handle_is_required() {
        let neither = RunTarget::from_handles(None, None);
        assert!(matches!(neither, Err(ValError::Configuration(_))));

        let model = RunTarget::from_handles(None, Some("model.json".into()));
        assert!(matches!(model, Ok(RunTarget::Model(_))));
    }
}
