// src/pipeline/fps.rs

use std::time::{Duration, Instant};

/// Counts frames and reports the rate once per interval.
#[derive(Debug, Clone)]
pub struct FrameRateMeter {
    interval: Duration,
    window_start: Instant,
    frames: u64,
}

impl FrameRateMeter {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            frames: 0,
        }
    }

    /// Counts one frame. Once `interval` has elapsed, returns frames per
    /// second over the window and starts a new one.
    pub fn record_frame(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval || elapsed.is_zero() {
            return None;
        }

        let fps = self.frames as f64 / elapsed.as_secs_f64();
        self.frames = 0;
        self.window_start = now;
        Some(fps)
    }
}
