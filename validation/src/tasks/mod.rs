//! Task specific metrics accumulators.

mod classify;

pub use classify::ClassificationMetrics;

use crate::{
    config::Task,
    error::{Result, ValError},
    metrics::MetricsAccumulator,
};

/// Returns the accumulator for `task`.
pub fn accumulator_for(task: Task) -> Result<Box<dyn MetricsAccumulator>> {
    match task {
        Task::Classify => Ok(Box::new(ClassificationMetrics::new())),
        other => Err(ValError::Configuration(format!(
            "no metrics accumulator is available for the '{other}' task"
        ))),
    }
}
