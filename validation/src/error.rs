use std::{error::Error, fmt, io};

use machine_learning::MlErr;

/// The validation module's result type.
pub type Result<T> = std::result::Result<T, ValError>;

/// A stage of the per-batch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preprocess,
    Inference,
    Loss,
    Postprocess,
    UpdateMetrics,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Preprocess => "preprocess",
            Stage::Inference => "inference",
            Stage::Loss => "loss",
            Stage::Postprocess => "postprocess",
            Stage::UpdateMetrics => "update_metrics",
        };
        write!(f, "{s}")
    }
}

/// Validation failures. None of them are retried, every one aborts the current run.
#[derive(Debug)]
pub enum ValError {
    /// The run was set up inconsistently (no handle, both handles, invalid option).
    Configuration(String),
    /// A dataset locator could not be resolved into usable splits.
    DatasetResolution { locator: String, reason: String },
    /// The model artifact could not be turned into a backend.
    Backend(String),
    /// A stage of the batch pipeline failed.
    PipelineStage {
        stage: Stage,
        batch: usize,
        source: Box<dyn Error + Send + Sync>,
    },
    Ml(MlErr),
    Io(io::Error),
    Json(serde_json::Error),
}

impl ValError {
    pub(crate) fn dataset(locator: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::DatasetResolution {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn stage<E>(stage: Stage, batch: usize, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self::PipelineStage {
            stage,
            batch,
            source: source.into(),
        }
    }
}

impl fmt::Display for ValError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            ValError::DatasetResolution { locator, reason } => {
                write!(f, "dataset '{locator}' could not be resolved: {reason}")
            }
            ValError::Backend(msg) => write!(f, "backend error: {msg}"),
            ValError::PipelineStage {
                stage,
                batch,
                source,
            } => write!(f, "{stage} failed on batch {batch}: {source}"),
            ValError::Ml(e) => write!(f, "{e}"),
            ValError::Io(e) => write!(f, "io error: {e}"),
            ValError::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl Error for ValError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ValError::PipelineStage { source, .. } => Some(source.as_ref()),
            ValError::Ml(e) => Some(e),
            ValError::Io(e) => Some(e),
            ValError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for ValError {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<io::Error> for ValError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ValError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
