use log::{debug, info};

/// Reports how far a run has come through its batches.
pub(crate) struct Progress {
    total: usize,
}

impl Progress {
    /// Starts reporting, logging the accumulator's header line first.
    pub fn new(desc: &str, total: usize) -> Self {
        if !desc.is_empty() {
            info!("{desc}");
        }

        Self { total }
    }

    pub fn update(&self, batch_i: usize) {
        debug!(batch = batch_i; "{}/{} batches", batch_i + 1, self.total);
    }
}
