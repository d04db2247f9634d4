use std::{num::NonZeroUsize, path::PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::info;
use machine_learning::{
    arch::{ActFnSpec, ModelSpec, Sequential},
    data::{DataLoader, InMemoryDataset},
    device::select_device,
    training::{ModelTrainer, TrainerConfig},
};
use rand::{SeedableRng, rngs::StdRng};
use validation::{
    DatasetResolver, DefaultResolver, ModelSource, RunConfig, RunTarget, StatsMap, ValError,
    Validator,
};

#[derive(Parser, Debug)]
#[command(name = "validate", about = "Evaluate perception models on held-out data")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a saved model artifact against a dataset.
    Val {
        /// JSON run configuration, the defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Model artifact to evaluate.
        #[arg(long)]
        model: Option<PathBuf>,
        /// `key=value` overrides applied on top of the configuration.
        overrides: Vec<String>,
    },
    /// Train a model on the dataset's train split, validating after every epoch.
    Train {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Comma separated layer widths, e.g. `4,16,3`.
        #[arg(long, value_delimiter = ',', required = true)]
        layers: Vec<usize>,
        #[arg(long)]
        epochs: NonZeroUsize,
        #[arg(long, default_value_t = 0.1)]
        lr: f32,
        #[arg(long)]
        seed: Option<u64>,
        /// Where to write the trained model as a native artifact.
        #[arg(long)]
        save: Option<PathBuf>,
        overrides: Vec<String>,
    },
}

fn load_config(path: Option<&PathBuf>, overrides: &[String]) -> Result<RunConfig> {
    let mut cfg = match path {
        Some(path) => RunConfig::from_json_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => RunConfig::default(),
    };
    cfg.apply_overrides(overrides)?;
    Ok(cfg)
}

fn print_stats(stats: &StatsMap) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(stats)?);
    Ok(())
}

fn val(cfg: RunConfig, model: Option<PathBuf>) -> Result<()> {
    let mut validator = Validator::new(cfg)?;
    let stats = validator.call(None, model.map(ModelSource::from))?;
    print_stats(&stats)
}

fn train(
    cfg: RunConfig,
    layers: &[usize],
    epochs: NonZeroUsize,
    lr: f32,
    seed: Option<u64>,
    save: Option<PathBuf>,
) -> Result<()> {
    let Some(locator) = cfg.data.as_deref() else {
        bail!("training needs a dataset, set data=<locator>");
    };
    let data = DefaultResolver.resolve(locator)?;
    let Some(train_split) = data.train.as_deref() else {
        bail!("dataset {locator} has no train split");
    };

    let dataset = InMemoryDataset::from_csv(train_split)?;
    let batch_size = NonZeroUsize::new(cfg.batch_size).context("batch_size must be positive")?;
    let loader = DataLoader::new(dataset, batch_size);

    let spec = ModelSpec::mlp(layers, ActFnSpec::Relu);
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let model = Sequential::init(&spec, &mut rng)?;
    info!("training a {layers:?} model for {epochs} epochs");

    let trainer_cfg = TrainerConfig {
        epochs,
        learning_rate: lr,
        device: select_device(&cfg.device, cfg.batch_size)?,
        half: cfg.half,
        seed,
        ..TrainerConfig::default()
    };
    let mut trainer = ModelTrainer::new(model, loader, Some(data), trainer_cfg);
    let mut validator = Validator::new(cfg)?;

    trainer.fit(|t| -> Result<(), ValError> {
        let stats = validator.run(RunTarget::Trainer(t))?;
        let summary = serde_json::to_string(&stats)?;
        info!(epoch = t.epoch(); "validation {summary}");
        Ok(())
    })?;

    if let Some(path) = save {
        trainer.into_model().save(&path)?;
        info!("saved model to {}", path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Command::Val {
            config,
            model,
            overrides,
        } => val(load_config(config.as_ref(), &overrides)?, model),
        Command::Train {
            config,
            layers,
            epochs,
            lr,
            seed,
            save,
            overrides,
        } => {
            let cfg = load_config(config.as_ref(), &overrides)?;
            train(cfg, &layers, epochs, lr, seed, save)
        }
    }
}
