use std::num::NonZeroUsize;

use log::info;
use ndarray::Array1;
use rand::{SeedableRng, rngs::StdRng};

use super::{Criterion, ModelEma};
use crate::{
    Device, MlErr, Result,
    arch::Sequential,
    data::{DataLoader, DatasetDescriptor},
    optimization::{GradientDescent, Optimizer},
};

/// Hyperparameters of a `ModelTrainer`.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub epochs: NonZeroUsize,
    pub learning_rate: f32,
    /// Decay of the shadow model, `None` trains without one.
    pub ema_decay: Option<f32>,
    pub device: Device,
    pub half: bool,
    pub seed: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: NonZeroUsize::MIN,
            learning_rate: 0.1,
            ema_decay: Some(0.9999),
            device: Device::Cpu,
            half: false,
            seed: None,
        }
    }
}

/// A model trainer. Contains the relevant components needed for training a model,
/// including the model itself and its optional shadow model.
pub struct ModelTrainer {
    model: Sequential,
    ema: Option<ModelEma>,
    optimizer: GradientDescent,
    criterion: Criterion,
    loader: DataLoader,
    data: Option<DatasetDescriptor>,

    grad: Vec<f32>,
    loss_items: Array1<f32>,
    epoch: usize,
    epochs: NonZeroUsize,
    device: Device,
    half: bool,
    rng: StdRng,
}

impl ModelTrainer {
    /// Returns a new `ModelTrainer`.
    ///
    /// # Arguments
    /// * `model` - The model that will be trained.
    /// * `loader` - The training data.
    /// * `data` - The descriptor the training data was resolved from, if any.
    /// * `cfg` - The training hyperparameters.
    pub fn new(
        model: Sequential,
        loader: DataLoader,
        data: Option<DatasetDescriptor>,
        cfg: TrainerConfig,
    ) -> Self {
        let ema = cfg.ema_decay.map(|decay| ModelEma::new(&model, decay));
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            grad: vec![0.; model.size()],
            loss_items: Array1::zeros(Criterion::TERMS.len()),
            model,
            ema,
            optimizer: GradientDescent::new(cfg.learning_rate),
            criterion: Criterion::new(),
            loader,
            data,
            epoch: 0,
            epochs: cfg.epochs,
            device: cfg.device,
            half: cfg.half,
            rng,
        }
    }

    /// Trains for every configured epoch, calling `on_epoch_end` after each one.
    ///
    /// # Arguments
    /// * `on_epoch_end` - Invoked with the trainer once an epoch finished, typically to run a
    ///   validation pass. An error stops the training.
    pub fn fit<F, E>(&mut self, mut on_epoch_end: F) -> std::result::Result<(), E>
    where
        F: FnMut(&mut Self) -> std::result::Result<(), E>,
        E: From<MlErr>,
    {
        for epoch in 0..self.epochs.get() {
            self.epoch = epoch;
            let items = self.train_epoch()?;
            info!(epoch = epoch; "epoch finished, loss {items}");
            on_epoch_end(self)?;
        }

        Ok(())
    }

    /// Runs one pass over the shuffled training data.
    ///
    /// # Returns
    /// The mean per-term loss of the epoch.
    pub fn train_epoch(&mut self) -> Result<Array1<f32>> {
        self.model.train();
        self.loader.dataset_mut().shuffle(&mut self.rng);

        let mut sum = Array1::zeros(Criterion::TERMS.len());
        let mut nbatches = 0;

        for batch in self.loader.iter() {
            let preds = self.model.forward(batch.img.view())?;
            let (_, items) = self.criterion.loss(preds.view(), &batch)?;
            let d = self.criterion.loss_prime(preds.view(), &batch)?;

            self.model.backward(d, &mut self.grad)?;
            self.optimizer
                .update_params(self.model.params_mut(), &self.grad)?;
            if let Some(ema) = &mut self.ema {
                ema.update(&self.model);
            }

            sum += &items;
            nbatches += 1;
        }

        self.model.eval();
        self.loss_items = sum / nbatches.max(1) as f32;
        Ok(self.loss_items.clone())
    }

    pub fn model(&self) -> &Sequential {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Sequential {
        &mut self.model
    }

    pub fn ema(&self) -> Option<&ModelEma> {
        self.ema.as_ref()
    }

    /// Returns the model validation should run on: the shadow model if present, else the live
    /// one.
    pub fn eval_model_mut(&mut self) -> &mut Sequential {
        self.eval_parts().0
    }

    pub fn criterion(&self) -> &Criterion {
        &self.criterion
    }

    /// Borrows the model returned by `eval_model_mut` together with the criterion.
    pub fn eval_parts(&mut self) -> (&mut Sequential, &Criterion) {
        let model = match &mut self.ema {
            Some(ema) => ema.model_mut(),
            None => &mut self.model,
        };
        (model, &self.criterion)
    }

    pub fn data(&self) -> Option<&DatasetDescriptor> {
        self.data.as_ref()
    }

    /// Returns the mean per-term loss of the last epoch.
    pub fn loss_items(&self) -> &Array1<f32> {
        &self.loss_items
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn epochs(&self) -> usize {
        self.epochs.get()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn half(&self) -> bool {
        self.half
    }

    /// Consumes the trainer, returning the shadow model if present, else the live one.
    pub fn into_model(self) -> Sequential {
        match self.ema {
            Some(ema) => ema.into_model(),
            None => self.model,
        }
    }
}
