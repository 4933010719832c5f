use crate::error::PlayerError;
use crate::logging::EngineLogger;
use crate::models::TrackId;
use log::{info, warn};

/// Retry policy for playback failures.
///
/// Errors are counted per track id. The same track failing
/// `max_consecutive_errors` times in a row is skipped and the counter resets;
/// an error on a different track starts a new run at 1. Resolution failures
/// are never retried.
pub struct PlaybackErrorTracker {
    logger: EngineLogger,
    last_track: Option<TrackId>,
    consecutive_errors: u32,
    max_consecutive_errors: u32,
    total_errors: u64,
    total_skips: u64,
}

impl PlaybackErrorTracker {
    pub fn new(logger: EngineLogger, max_consecutive_errors: u32) -> Self {
        Self {
            logger,
            last_track: None,
            consecutive_errors: 0,
            max_consecutive_errors: max_consecutive_errors.max(1),
            total_errors: 0,
            total_skips: 0,
        }
    }

    /// Record an error for `track` and decide what the controller does next
    pub fn record_error(&mut self, track: &TrackId, error: &PlayerError) -> RecoveryResult {
        self.total_errors += 1;

        if let PlayerError::Source(source_err) = error {
            self.logger.log_resolution_failed(track, &source_err.to_string());
            return RecoveryResult::Failed(format!(
                "Track '{}' could not be resolved: {}",
                track, source_err
            ));
        }

        if self.last_track.as_ref() == Some(track) {
            self.consecutive_errors += 1;
        } else {
            self.last_track = Some(track.clone());
            self.consecutive_errors = 1;
        }

        self.logger
            .log_playback_error(track, &error.to_string(), self.consecutive_errors);

        if self.consecutive_errors >= self.max_consecutive_errors {
            warn!(
                "Track '{}' failed {} times in a row, skipping",
                track, self.consecutive_errors
            );
            self.consecutive_errors = 0;
            self.last_track = None;
            self.total_skips += 1;
            RecoveryResult::Skip(format!("Skipping '{}' after repeated playback errors", track))
        } else {
            info!(
                "Retrying track '{}' (attempt {} of {})",
                track,
                self.consecutive_errors + 1,
                self.max_consecutive_errors
            );
            RecoveryResult::Retry(format!(
                "Retrying '{}' ({}/{})",
                track, self.consecutive_errors, self.max_consecutive_errors
            ))
        }
    }

    /// A track played through to its end
    pub fn record_success(&mut self, track: &TrackId) {
        if self.last_track.as_ref() == Some(track) {
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.last_track = None;
        self.consecutive_errors = 0;
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn last_failed_track(&self) -> Option<&TrackId> {
        self.last_track.as_ref()
    }

    pub fn get_recovery_statistics(&self) -> RecoveryStatistics {
        RecoveryStatistics {
            total_errors: self.total_errors,
            total_skips: self.total_skips,
            current_streak: self.consecutive_errors,
        }
    }
}

/// Outcome of a recorded playback error
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryResult {
    /// Reload the same track
    Retry(String),
    /// Give up on this track and advance
    Skip(String),
    /// Stop playback and surface the error
    Failed(String),
}

impl RecoveryResult {
    pub fn is_retry(&self) -> bool {
        matches!(self, RecoveryResult::Retry(_))
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, RecoveryResult::Skip(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RecoveryResult::Failed(_))
    }

    pub fn message(&self) -> &str {
        match self {
            RecoveryResult::Retry(msg) | RecoveryResult::Skip(msg) | RecoveryResult::Failed(msg) => {
                msg
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryStatistics {
    pub total_errors: u64,
    pub total_skips: u64,
    pub current_streak: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SourceError, SurfaceError};

    fn playback_error() -> PlayerError {
        SurfaceError::Playback("decode failure".to_string()).into()
    }

    fn tracker() -> PlaybackErrorTracker {
        PlaybackErrorTracker::new(EngineLogger::new(), 3)
    }

    #[test]
    fn test_third_consecutive_error_skips_and_resets() {
        let mut tracker = tracker();
        let track = TrackId::new("broken");

        assert!(tracker.record_error(&track, &playback_error()).is_retry());
        assert_eq!(tracker.consecutive_errors(), 1);
        assert!(tracker.record_error(&track, &playback_error()).is_retry());
        assert_eq!(tracker.consecutive_errors(), 2);

        let result = tracker.record_error(&track, &playback_error());
        assert!(result.is_skip());
        assert_eq!(tracker.consecutive_errors(), 0);
        assert!(tracker.last_failed_track().is_none());
    }

    #[test]
    fn test_different_track_restarts_count_at_one() {
        let mut tracker = tracker();
        let a = TrackId::new("a");
        let b = TrackId::new("b");

        tracker.record_error(&a, &playback_error());
        tracker.record_error(&a, &playback_error());
        let result = tracker.record_error(&b, &playback_error());

        assert!(result.is_retry());
        assert_eq!(tracker.consecutive_errors(), 1);
        assert_eq!(tracker.last_failed_track(), Some(&b));
    }

    #[test]
    fn test_resolution_failure_is_not_retried() {
        let mut tracker = tracker();
        let track = TrackId::new("gone");
        let error: PlayerError = SourceError::NotFound { id: track.clone() }.into();

        let result = tracker.record_error(&track, &error);
        assert!(result.is_failed());
        assert_eq!(tracker.consecutive_errors(), 0);
    }

    #[test]
    fn test_success_clears_streak_for_same_track() {
        let mut tracker = tracker();
        let track = TrackId::new("flaky");

        tracker.record_error(&track, &playback_error());
        tracker.record_success(&TrackId::new("other"));
        assert_eq!(tracker.consecutive_errors(), 1);

        tracker.record_success(&track);
        assert_eq!(tracker.consecutive_errors(), 0);
    }

    #[test]
    fn test_recovery_statistics() {
        let mut tracker = tracker();
        let track = TrackId::new("x");
        for _ in 0..4 {
            tracker.record_error(&track, &playback_error());
        }

        let stats = tracker.get_recovery_statistics();
        assert_eq!(stats.total_errors, 4);
        assert_eq!(stats.total_skips, 1);
        assert_eq!(stats.current_streak, 1);
    }

    #[test]
    fn test_recovery_result_message() {
        let result = RecoveryResult::Skip("moving on".to_string());
        assert_eq!(result.message(), "moving on");
        assert!(!result.is_retry());
    }
}
