//! Evaluation engine for learned perception models.
//!
//! A [`Validator`] drives one full pass over a held-out dataset, either standalone against a
//! model artifact or embedded in a training loop, and reports the statistics produced by a
//! task specific [`MetricsAccumulator`].

pub mod backend;
pub mod config;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod mode;
pub mod paths;
mod pipeline;
pub mod profile;
mod progress;
pub mod tasks;
pub mod trainer;
mod validator;

pub use backend::{AutoBackend, Backend, BackendLoader, Formats, ModelSource, Predictor};
pub use config::{Mode, RunConfig, Task};
pub use dataset::{DatasetResolver, DefaultResolver};
pub use error::{Result, Stage, ValError};
pub use metrics::{MetricsAccumulator, RunContext, Stat, StatsMap};
pub use mode::RunTarget;
pub use profile::{Profile, SpeedProfile, StageTimers};
pub use trainer::{LossCriterion, TrainerHandle, TrainerParts};
pub use validator::{PREDICTIONS_FILE, Validator, ValidatorBuilder};
