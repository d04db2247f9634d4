use crate::arch::Sequential;

const RAMP: f32 = 2000.;

/// Exponential moving average of a model's parameters.
///
/// The decay ramps up from zero so the shadow model follows the live one closely during the
/// first updates: `d = decay * (1 - exp(-updates / 2000))`.
#[derive(Clone, Debug)]
pub struct ModelEma {
    model: Sequential,
    decay: f32,
    updates: usize,
}

impl ModelEma {
    /// Creates a new `ModelEma` shadowing `model`.
    pub fn new(model: &Sequential, decay: f32) -> Self {
        let mut model = model.clone();
        model.eval();
        Self {
            model,
            decay,
            updates: 0,
        }
    }

    /// Moves the shadow parameters towards the live ones.
    pub fn update(&mut self, live: &Sequential) {
        self.updates += 1;
        let d = self.decay * (1. - (-(self.updates as f32) / RAMP).exp());

        for (s, &p) in self.model.params_mut().iter_mut().zip(live.params()) {
            *s = d * *s + (1. - d) * p;
        }
    }

    pub fn updates(&self) -> usize {
        self.updates
    }

    pub fn model(&self) -> &Sequential {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Sequential {
        &mut self.model
    }

    pub fn into_model(self) -> Sequential {
        self.model
    }
}
