use std::{
    fmt,
    time::{Duration, Instant},
};

/// Accumulates wall-clock time over any number of timed sections.
#[derive(Debug, Default, Clone, Copy)]
pub struct Profile {
    total: Duration,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f`, adding its wall-clock duration to the total.
    pub fn time<T, F>(&mut self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let start = Instant::now();
        let out = f();
        self.total += start.elapsed();
        out
    }

    pub fn add(&mut self, elapsed: Duration) {
        self.total += elapsed;
    }

    pub fn total(&self) -> Duration {
        self.total
    }
}

/// One accumulator per timed pipeline stage.
#[derive(Debug, Default, Clone, Copy)]
pub struct StageTimers {
    pub preprocess: Profile,
    pub inference: Profile,
    pub loss: Profile,
    pub postprocess: Profile,
}

/// Milliseconds spent per sample in each stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedProfile {
    pub preprocess: f64,
    pub inference: f64,
    pub loss: f64,
    pub postprocess: f64,
}

impl SpeedProfile {
    /// Normalizes the stage totals by the number of samples in the dataset.
    ///
    /// # Returns
    /// `None` when there were no samples to normalize by.
    pub fn from_timers(timers: &StageTimers, samples: usize) -> Option<Self> {
        if samples == 0 {
            return None;
        }

        let per_sample = |p: &Profile| p.total().as_secs_f64() * 1e3 / samples as f64;
        Some(Self {
            preprocess: per_sample(&timers.preprocess),
            inference: per_sample(&timers.inference),
            loss: per_sample(&timers.loss),
            postprocess: per_sample(&timers.postprocess),
        })
    }

    /// The four stage timings in pipeline order.
    pub fn as_array(&self) -> [f64; 4] {
        [self.preprocess, self.inference, self.loss, self.postprocess]
    }
}

impl fmt::Display for SpeedProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}ms pre-process, {:.1}ms inference, {:.1}ms loss, {:.1}ms post-process per image",
            self.preprocess, self.inference, self.loss, self.postprocess
        )
    }
}
