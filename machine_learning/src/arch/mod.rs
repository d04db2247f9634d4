pub mod activations;
pub mod layers;
pub mod loss;
mod precision;
mod sequential;
mod spec;

pub use precision::Precision;
pub use sequential::Sequential;
pub use spec::{ActFnSpec, LayerSpec, ModelArtifact, ModelSpec};
