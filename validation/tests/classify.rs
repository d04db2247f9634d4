use std::{fmt::Write as _, fs, num::NonZeroUsize, path::Path};

use machine_learning::{
    arch::{ActFnSpec, ModelSpec, Sequential},
    data::{DataLoader, InMemoryDataset},
    training::{ModelTrainer, TrainerConfig},
};
use rand::{SeedableRng, rngs::StdRng};
use serde_json::Value;
use validation::{
    DatasetResolver, DefaultResolver, PREDICTIONS_FILE, RunConfig, RunTarget, ValError, Validator,
};

/// Two well separated classes, `samples` rows.
fn write_split(path: &Path, samples: usize) {
    let mut csv = String::from("# label,x,y\n");
    for i in 0..samples {
        let label = i % 2;
        let jitter = (i % 5) as f32 * 0.05;
        let (x, y) = if label == 0 {
            (1. + jitter, -jitter)
        } else {
            (-jitter, 1. + jitter)
        };
        writeln!(csv, "{label},{x},{y}").unwrap();
    }
    fs::write(path, csv).unwrap();
}

fn dataset_dir(root: &Path) -> String {
    let dir = root.join("data");
    fs::create_dir_all(&dir).unwrap();
    write_split(&dir.join("train.csv"), 40);
    write_split(&dir.join("val.csv"), 12);
    fs::write(dir.join("names.txt"), "left\nright\n").unwrap();
    dir.to_str().unwrap().to_string()
}

fn trainer(locator: &str, epochs: usize) -> ModelTrainer {
    let data = DefaultResolver.resolve(locator).unwrap();
    let train = InMemoryDataset::from_csv(data.train.as_deref().unwrap()).unwrap();
    let loader = DataLoader::new(train, NonZeroUsize::new(8).unwrap());

    let spec = ModelSpec::mlp(&[2, 8, 2], ActFnSpec::Relu);
    let model = Sequential::init(&spec, &mut StdRng::seed_from_u64(11)).unwrap();
    let cfg = TrainerConfig {
        epochs: NonZeroUsize::new(epochs).unwrap(),
        learning_rate: 0.5,
        seed: Some(5),
        ..TrainerConfig::default()
    };

    ModelTrainer::new(model, loader, Some(data), cfg)
}

fn scalar(stats: &validation::StatsMap, key: &str) -> f64 {
    stats[key].as_scalar().unwrap()
}

#[test]
fn validates_after_every_epoch() {
    let tmp = tempfile::tempdir().unwrap();
    let locator = dataset_dir(tmp.path());
    let mut trainer = trainer(&locator, 20);

    let cfg = RunConfig {
        project: Some(tmp.path().join("runs")),
        ..RunConfig::default()
    };
    let mut validator = Validator::new(cfg).unwrap();
    let mut history = Vec::new();

    trainer
        .fit(|t| -> Result<(), ValError> {
            history.push(validator.run(RunTarget::Trainer(t))?);
            Ok(())
        })
        .unwrap();

    assert_eq!(history.len(), 20);
    for stats in &history {
        for key in ["metrics/accuracy_top1", "metrics/accuracy_top5", "fitness", "val/mse", "val/ce"] {
            assert!(stats.contains_key(key), "{key}");
        }
        assert_eq!(scalar(stats, "metrics/accuracy_top5"), 1.0);
    }

    let first = scalar(&history[0], "val/ce");
    let last = scalar(&history[19], "val/ce");
    assert!(last < first, "{last} >= {first}");
    assert_eq!(validator.metric_keys().len(), 2);
}

#[test]
fn standalone_run_exports_predictions() {
    let tmp = tempfile::tempdir().unwrap();
    let locator = dataset_dir(tmp.path());
    let mut trainer = trainer(&locator, 5);
    trainer.fit(|_| Ok::<(), ValError>(())).unwrap();

    let model_path = tmp.path().join("model.json");
    trainer.into_model().save(&model_path).unwrap();

    let cfg = RunConfig {
        project: Some(tmp.path().join("runs")),
        data: Some(locator),
        save_json: true,
        batch_size: 5,
        ..RunConfig::default()
    };
    let mut validator = Validator::new(cfg).unwrap();
    let stats = validator
        .run(RunTarget::Model(model_path.as_path().into()))
        .unwrap();

    assert_eq!(scalar(&stats, "metrics/json_records"), 12.0);
    let top1 = scalar(&stats, "metrics/accuracy_top1");
    assert!((0.0..=1.0).contains(&top1));

    let exported = fs::read_to_string(validator.save_dir().join(PREDICTIONS_FILE)).unwrap();
    let records: Vec<Value> = serde_json::from_str(&exported).unwrap();
    assert_eq!(records.len(), 12);
    assert!(records.iter().all(|r| r["category_name"].is_string()));

    assert!(validator.speed().is_some());
}

#[test]
fn missing_artifacts_are_backend_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let locator = dataset_dir(tmp.path());
    let cfg = RunConfig {
        project: Some(tmp.path().join("runs")),
        data: Some(locator),
        ..RunConfig::default()
    };
    let mut validator = Validator::new(cfg).unwrap();

    let err = validator
        .run(RunTarget::Model(tmp.path().join("nope.json").as_path().into()))
        .unwrap_err();
    assert!(matches!(err, ValError::Backend(_)));
}

#[test]
fn unresolvable_datasets_fail_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let spec = ModelSpec::mlp(&[2, 2], ActFnSpec::Relu);
    let model = Sequential::init(&spec, &mut StdRng::seed_from_u64(1)).unwrap();
    let cfg = RunConfig {
        project: Some(tmp.path().join("runs")),
        data: Some(tmp.path().join("missing").to_str().unwrap().to_string()),
        ..RunConfig::default()
    };
    let mut validator = Validator::new(cfg).unwrap();

    let err = validator.run(RunTarget::Model(model.into())).unwrap_err();
    assert!(matches!(err, ValError::DatasetResolution { .. }));
}

#[test]
fn unsupported_tasks_are_rejected_up_front() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = RunConfig {
        project: Some(tmp.path().to_path_buf()),
        task: validation::Task::Segment,
        ..RunConfig::default()
    };

    assert!(matches!(Validator::new(cfg), Err(ValError::Configuration(_))));
}
