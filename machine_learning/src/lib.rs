pub mod arch;
pub mod data;
pub mod device;
pub mod error;
pub mod grad;
pub mod optimization;
pub mod training;

pub use device::Device;
pub use error::{MlErr, Result};
