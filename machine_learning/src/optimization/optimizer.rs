use crate::Result;

/// A rule that moves model parameters against their gradient.
pub trait Optimizer {
    /// Applies one update step in place.
    ///
    /// # Errors
    /// A size mismatch if `grad` does not cover every parameter.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()>;
}
