//! Sliding-window transfer speed estimation.
//!
//! Raw progress ticks arrive far more often than a human can read them and
//! their instantaneous rate is noisy. The estimator only accepts a sample
//! once `interval` has passed since the previous one, keeps the last
//! `window` instantaneous rates and reports their mean.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// A smoothed speed and the time remaining it implies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    /// Mean speed over the sample window, bytes per second
    pub speed: f64,
    /// Remaining bytes over `speed`; `None` when speed is zero
    pub time_remaining: Option<Duration>,
}

/// Speed estimator for a single transfer.
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    total: u64,
    interval: Duration,
    window: usize,
    samples: VecDeque<f64>,
    last_at: Instant,
    last_loaded: u64,
}

impl SpeedEstimator {
    /// Estimator with the default 100ms interval and 10-sample window.
    #[must_use]
    pub fn new(total: u64, started_at: Instant) -> Self {
        Self::with_window(
            total,
            started_at,
            Duration::from_millis(crate::DEFAULT_SAMPLE_INTERVAL_MS),
            crate::DEFAULT_SPEED_WINDOW,
        )
    }

    /// Estimator with an explicit sampling interval and window size.
    #[must_use]
    pub fn with_window(total: u64, started_at: Instant, interval: Duration, window: usize) -> Self {
        let window = window.max(1);
        Self {
            total,
            interval,
            window,
            samples: VecDeque::with_capacity(window),
            last_at: started_at,
            last_loaded: 0,
        }
    }

    /// Feed a progress tick. Returns a new estimate when the tick was accepted
    /// as a sample.
    pub fn observe(&mut self, now: Instant, loaded: u64) -> Option<Estimate> {
        let elapsed = now.saturating_duration_since(self.last_at);
        if elapsed.is_zero() || elapsed < self.interval {
            return None;
        }

        let delta = loaded.saturating_sub(self.last_loaded);
        let rate = delta as f64 / elapsed.as_secs_f64();
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(rate);

        self.last_at = now;
        self.last_loaded = loaded;

        let speed = self.smoothed_speed();
        Some(Estimate {
            speed,
            time_remaining: time_remaining(self.total.saturating_sub(loaded), speed),
        })
    }

    /// Mean of the samples in the window; zero before the first sample.
    pub fn smoothed_speed(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Number of samples currently in the window.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Forget all samples and restart from `(now, 0)`.
    pub fn reset(&mut self, now: Instant) {
        self.samples.clear();
        self.last_at = now;
        self.last_loaded = 0;
    }
}

/// Time needed for `remaining` bytes at `speed` bytes per second.
///
/// Returns `None` for a zero, negative or non-finite speed.
pub fn time_remaining(remaining: u64, speed: f64) -> Option<Duration> {
    if speed > 0.0 && speed.is_finite() {
        Duration::try_from_secs_f64(remaining as f64 / speed).ok()
    } else {
        None
    }
}
