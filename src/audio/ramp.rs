use std::time::Duration;
use tokio::time::Instant;

/// Linear gain ramp keyed by elapsed time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    from: f32,
    to: f32,
    start: Instant,
    duration: Duration,
}

impl GainRamp {
    pub fn new(from: f32, to: f32, start: Instant, duration: Duration) -> Self {
        Self {
            from,
            to,
            start,
            duration,
        }
    }

    pub fn target(&self) -> f32 {
        self.to
    }

    pub fn end(&self) -> Instant {
        self.start + self.duration
    }

    /// Fraction of the ramp covered at `now`, 0.0 to 1.0
    pub fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn value_at(&self, now: Instant) -> f32 {
        let t = self.progress(now);
        self.from + (self.to - self.from) * t
    }

    pub fn is_complete(&self, now: Instant) -> bool {
        now >= self.end()
    }
}
