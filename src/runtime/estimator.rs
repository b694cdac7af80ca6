use std::time::Duration;

/// Smoothed frame-rate estimate.
///
/// The moving average runs over frame *time*; the published rate is its
/// reciprocal. Averaging rates directly would overweight short frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameRateEstimator {
    alpha: f64,
    average_time: f64,
}

impl FrameRateEstimator {
    pub fn new(alpha: f64, initial_rate: f64) -> Self {
        let alpha = if alpha > 0.0 && alpha <= 1.0 { alpha } else { 0.05 };
        let initial_rate = if initial_rate > 0.0 { initial_rate } else { 60.0 };
        Self {
            alpha,
            average_time: 1.0 / initial_rate,
        }
    }

    /// Fold in the time since the previous frame started; returns the new rate.
    pub fn update(&mut self, sample: Duration) -> f64 {
        self.update_secs(sample.as_secs_f64())
    }

    pub fn update_secs(&mut self, sample: f64) -> f64 {
        if sample > 0.0 && sample.is_finite() {
            self.average_time = (1.0 - self.alpha) * self.average_time + self.alpha * sample;
        }
        self.rate()
    }

    pub fn rate(&self) -> f64 {
        1.0 / self.average_time
    }

    pub fn average_frame_time(&self) -> Duration {
        Duration::from_secs_f64(self.average_time)
    }
}
