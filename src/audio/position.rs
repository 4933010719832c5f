use crate::error::SurfaceError;
use std::time::Duration;
use tokio::time::Instant;

/// Clock-driven playback position for one media element
#[derive(Debug, Clone)]
pub struct PositionTracker {
    /// Position at `last_update`
    position: Duration,
    last_update: Instant,
    duration: Duration,
    running: bool,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self {
            position: Duration::ZERO,
            last_update: Instant::now(),
            duration: Duration::ZERO,
            running: false,
        }
    }

    /// Start over for a new stream, paused at zero
    pub fn start_tracking(&mut self, duration: Duration) {
        self.position = Duration::ZERO;
        self.duration = duration;
        self.last_update = Instant::now();
        self.running = false;
    }

    pub fn stop_tracking(&mut self) {
        self.position = Duration::ZERO;
        self.duration = Duration::ZERO;
        self.running = false;
    }

    pub fn pause(&mut self) {
        if self.running {
            self.position = self.current_position();
            self.running = false;
        }
        self.last_update = Instant::now();
    }

    pub fn resume(&mut self) {
        if !self.running {
            self.running = true;
            self.last_update = Instant::now();
        }
    }

    /// Move to `position`, rejecting positions past the end of the stream
    pub fn seek(&mut self, position: Duration) -> Result<Duration, SurfaceError> {
        if position > self.duration {
            return Err(SurfaceError::InvalidSeek {
                position: position.as_secs_f64(),
                duration: self.duration.as_secs_f64(),
            });
        }
        self.position = position;
        self.last_update = Instant::now();
        Ok(position)
    }

    /// Get current position (calculated in real-time)
    pub fn current_position(&self) -> Duration {
        let position = if self.running {
            self.position.saturating_add(self.last_update.elapsed())
        } else {
            self.position
        };
        position.min(self.duration)
    }

    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.current_position())
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Calculate progress as a fraction (0.0 to 1.0)
    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            0.0
        } else {
            self.current_position().as_secs_f32() / self.duration.as_secs_f32()
        }
    }
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new()
    }
}
