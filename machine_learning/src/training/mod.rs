mod criterion;
mod ema;
mod model_trainer;

pub use criterion::Criterion;
pub use ema::ModelEma;
pub use model_trainer::{ModelTrainer, TrainerConfig};
