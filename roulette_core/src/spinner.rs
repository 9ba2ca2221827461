//! Spinning-pointer duration picker.
//!
//! A pointer starts at a random speed and decays to rest over a fixed number
//! of frames; the rest angle maps linearly onto `[lower_limit, upper_limit]`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::rng::ProvablyFairRng;
use crate::schedule::DurationRange;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinnerConfig {
    pub animation_duration_ms: u32,
    pub frame_interval_ms: u32,
    /// Degrees per second.
    pub start_speed_range: (f64, f64),
    pub exponent: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
}

impl Default for SpinnerConfig {
    fn default() -> Self {
        Self {
            animation_duration_ms: 1000,
            frame_interval_ms: 1,
            start_speed_range: (2000.0, 4000.0),
            exponent: 2.0,
            lower_limit: 5.0,
            upper_limit: 50.0,
        }
    }
}

impl SpinnerConfig {
    pub fn with_limits(mut self, range: DurationRange) -> Self {
        self.lower_limit = range.lower;
        self.upper_limit = range.upper;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpinnerFrame {
    Live(f64),
    Finished(f64),
}

impl SpinnerFrame {
    pub fn value(self) -> f64 {
        match self {
            SpinnerFrame::Live(v) | SpinnerFrame::Finished(v) => v,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpinnerTimeSelector {
    deltas: Vec<f64>,
    frame: usize,
    angle: f64,
    start_speed: f64,
    range: DurationRange,
    frame_interval: Duration,
}

impl SpinnerTimeSelector {
    pub fn start(config: &SpinnerConfig, rng: &mut ProvablyFairRng) -> Self {
        let (low, high) = config.start_speed_range;
        let start_speed = rng.uniform(low, high);
        Self::with_start_speed(config, start_speed)
    }

    /// Builds the frame table for a known start speed.
    pub fn with_start_speed(config: &SpinnerConfig, start_speed: f64) -> Self {
        let frame_ms = config.frame_interval_ms.max(1);
        let total_frames = ((config.animation_duration_ms / frame_ms) as usize).max(2);
        let exponent = if config.exponent > 0.0 { config.exponent } else { 2.0 };
        let deltas = (0..total_frames)
            .map(|i| {
                let p = i as f64 / (total_frames - 1) as f64;
                let speed = start_speed * (1.0 - p.powf(exponent));
                speed * frame_ms as f64 / 1000.0
            })
            .collect();
        Self {
            deltas,
            frame: 0,
            angle: 0.0,
            start_speed,
            range: DurationRange::new(config.lower_limit, config.upper_limit).normalized(),
            frame_interval: Duration::from_millis(frame_ms as u64),
        }
    }

    pub fn start_speed(&self) -> f64 {
        self.start_speed
    }

    pub fn total_frames(&self) -> usize {
        self.deltas.len()
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    pub fn is_finished(&self) -> bool {
        self.frame >= self.deltas.len()
    }

    /// Rest angle in `[0, 360)`.
    pub fn angle(&self) -> f64 {
        self.angle.rem_euclid(360.0)
    }

    /// Live value for the current angle; reading it does not advance anything.
    pub fn current_value(&self) -> f64 {
        let proportion = self.angle() / 360.0;
        let value = self.range.lower + (self.range.upper - self.range.lower) * proportion;
        value.clamp(self.range.lower, self.range.upper)
    }

    pub fn advance(&mut self) -> SpinnerFrame {
        match self.deltas.get(self.frame) {
            Some(delta) => {
                self.angle = (self.angle + delta).rem_euclid(360.0);
                self.frame += 1;
                SpinnerFrame::Live(self.current_value())
            }
            None => SpinnerFrame::Finished(self.current_value()),
        }
    }

    pub fn run_to_end(mut self) -> f64 {
        loop {
            if let SpinnerFrame::Finished(value) = self.advance() {
                return value;
            }
        }
    }
}
