use crate::models::{OutputMode, Track, TrackId};
use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Journal entry for engine activity
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: LogEventType,
    pub duration: Option<Duration>,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEventType {
    PlaybackStarted,
    PlaybackPaused,
    PlaybackStopped,
    TrackChanged,
    SeekOperation,
    PreloadStarted,
    PreloadFailed,
    CrossfadeStarted,
    CrossfadeCompleted,
    CrossfadeCancelled,
    ModeSwitched,
    PlaybackError,
    ResolutionFailed,
    PerformanceWarning,
}

impl LogEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEventType::PlaybackStarted => "PLAYBACK_STARTED",
            LogEventType::PlaybackPaused => "PLAYBACK_PAUSED",
            LogEventType::PlaybackStopped => "PLAYBACK_STOPPED",
            LogEventType::TrackChanged => "TRACK_CHANGED",
            LogEventType::SeekOperation => "SEEK_OPERATION",
            LogEventType::PreloadStarted => "PRELOAD_STARTED",
            LogEventType::PreloadFailed => "PRELOAD_FAILED",
            LogEventType::CrossfadeStarted => "CROSSFADE_STARTED",
            LogEventType::CrossfadeCompleted => "CROSSFADE_COMPLETED",
            LogEventType::CrossfadeCancelled => "CROSSFADE_CANCELLED",
            LogEventType::ModeSwitched => "MODE_SWITCHED",
            LogEventType::PlaybackError => "PLAYBACK_ERROR",
            LogEventType::ResolutionFailed => "RESOLUTION_FAILED",
            LogEventType::PerformanceWarning => "PERFORMANCE_WARNING",
        }
    }
}

/// Logger for engine operations and debugging
#[derive(Clone)]
pub struct EngineLogger {
    events: Arc<Mutex<VecDeque<LogEvent>>>,
    max_events: usize,
}

impl Default for EngineLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineLogger {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events: 1000,
        }
    }

    /// Initialize logging system with appropriate log level
    pub fn init() -> Result<(), Box<dyn std::error::Error>> {
        let log_level = std::env::var("SEGUE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let mut builder = env_logger::Builder::new();

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] [{}:{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

        match log_level.to_lowercase().as_str() {
            "trace" => builder.filter_level(log::LevelFilter::Trace),
            "debug" => builder.filter_level(log::LevelFilter::Debug),
            "info" => builder.filter_level(log::LevelFilter::Info),
            "warn" => builder.filter_level(log::LevelFilter::Warn),
            "error" => builder.filter_level(log::LevelFilter::Error),
            _ => builder.filter_level(log::LevelFilter::Info),
        };

        builder.try_init()?;

        info!("Engine logging initialized with level: {}", log_level);
        Ok(())
    }

    pub fn log_event(&self, event_type: LogEventType, details: String, duration: Option<Duration>) {
        match event_type {
            LogEventType::PlaybackStarted
            | LogEventType::PlaybackPaused
            | LogEventType::PlaybackStopped
            | LogEventType::TrackChanged
            | LogEventType::CrossfadeCompleted
            | LogEventType::ModeSwitched => {
                info!("[{}] {}", event_type.as_str(), details);
            }
            LogEventType::SeekOperation
            | LogEventType::PreloadStarted
            | LogEventType::CrossfadeStarted
            | LogEventType::CrossfadeCancelled => {
                debug!("[{}] {}", event_type.as_str(), details);
            }
            LogEventType::PreloadFailed | LogEventType::PerformanceWarning => {
                warn!("[{}] {} (duration: {:?})", event_type.as_str(), details, duration);
            }
            LogEventType::PlaybackError | LogEventType::ResolutionFailed => {
                error!("[{}] {}", event_type.as_str(), details);
            }
        }

        let event = LogEvent {
            timestamp: Utc::now(),
            event_type,
            duration,
            details,
        };

        if let Ok(mut events) = self.events.lock() {
            events.push_back(event);
            while events.len() > self.max_events {
                events.pop_front();
            }
        }
    }

    pub fn log_playback_started(&self, track: &Track) {
        self.log_event(
            LogEventType::PlaybackStarted,
            format!("Started playing: {} - {}", track.artist_name(), track.display_name()),
            None,
        );
    }

    pub fn log_playback_paused(&self, position: Duration) {
        self.log_event(
            LogEventType::PlaybackPaused,
            format!("Playback paused at position: {:.2}s", position.as_secs_f64()),
            None,
        );
    }

    pub fn log_playback_stopped(&self, reason: &str) {
        self.log_event(
            LogEventType::PlaybackStopped,
            format!("Playback stopped: {}", reason),
            None,
        );
    }

    pub fn log_track_changed(&self, from_track: Option<&Track>, to_track: &Track) {
        let details = match from_track {
            Some(from) => format!("Track changed from '{}' to '{}'", from.id, to_track.id),
            None => format!("Track loaded: '{}'", to_track.id),
        };
        self.log_event(LogEventType::TrackChanged, details, None);
    }

    pub fn log_seek_operation(&self, from_position: Duration, to_position: Duration) {
        self.log_event(
            LogEventType::SeekOperation,
            format!(
                "Seek from {:.2}s to {:.2}s",
                from_position.as_secs_f64(),
                to_position.as_secs_f64()
            ),
            None,
        );
    }

    pub fn log_preload_started(&self, track: &Track, remaining: Duration) {
        self.log_event(
            LogEventType::PreloadStarted,
            format!("Preloading '{}' with {:.2}s remaining", track.id, remaining.as_secs_f64()),
            None,
        );
    }

    pub fn log_preload_failed(&self, track: &TrackId, reason: &str) {
        self.log_event(
            LogEventType::PreloadFailed,
            format!("Preload of '{}' failed, falling back to hard cut: {}", track, reason),
            None,
        );
    }

    pub fn log_crossfade_started(&self, from: &TrackId, to: &TrackId, duration: Duration) {
        self.log_event(
            LogEventType::CrossfadeStarted,
            format!("Crossfading '{}' -> '{}'", from, to),
            Some(duration),
        );
    }

    pub fn log_crossfade_completed(&self, track: &TrackId) {
        self.log_event(
            LogEventType::CrossfadeCompleted,
            format!("Crossfade completed, now playing '{}'", track),
            None,
        );
    }

    pub fn log_crossfade_cancelled(&self, reason: &str) {
        self.log_event(
            LogEventType::CrossfadeCancelled,
            format!("Crossfade cancelled: {}", reason),
            None,
        );
    }

    pub fn log_mode_switched(&self, from: OutputMode, to: OutputMode, switch_time: Duration) {
        self.log_event(
            LogEventType::ModeSwitched,
            format!("Output mode changed from {} to {}", from, to),
            Some(switch_time),
        );
    }

    pub fn log_playback_error(&self, track: &TrackId, error: &str, attempt: u32) {
        self.log_event(
            LogEventType::PlaybackError,
            format!("Playback error for '{}' (attempt {}): {}", track, attempt, error),
            None,
        );
    }

    pub fn log_resolution_failed(&self, track: &TrackId, error: &str) {
        self.log_event(
            LogEventType::ResolutionFailed,
            format!("Could not resolve '{}': {}", track, error),
            None,
        );
    }

    pub fn log_performance_warning(&self, operation: &str, duration: Duration, threshold: Duration) {
        self.log_event(
            LogEventType::PerformanceWarning,
            format!(
                "{} took {}ms (threshold: {}ms)",
                operation,
                duration.as_millis(),
                threshold.as_millis()
            ),
            Some(duration),
        );
    }

    /// Get recent events for debugging
    pub fn get_recent_events(&self, count: usize) -> Vec<LogEvent> {
        match self.events.lock() {
            Ok(events) => {
                let skip = events.len().saturating_sub(count);
                events.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn get_event_statistics(&self) -> EventStatistics {
        let mut stats = EventStatistics::default();
        if let Ok(events) = self.events.lock() {
            for event in events.iter() {
                match event.event_type {
                    LogEventType::CrossfadeCompleted => stats.crossfades_completed += 1,
                    LogEventType::CrossfadeCancelled => stats.crossfades_cancelled += 1,
                    LogEventType::PreloadFailed => stats.preload_failures += 1,
                    LogEventType::PlaybackError => stats.playback_errors += 1,
                    LogEventType::ResolutionFailed => stats.resolution_failures += 1,
                    LogEventType::ModeSwitched => stats.mode_switches += 1,
                    LogEventType::PerformanceWarning => stats.performance_warnings += 1,
                    _ => {}
                }
            }
            stats.total_events = events.len();
        }
        stats
    }
}

/// Statistics about logged events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventStatistics {
    pub total_events: usize,
    pub crossfades_completed: usize,
    pub crossfades_cancelled: usize,
    pub preload_failures: usize,
    pub playback_errors: usize,
    pub resolution_failures: usize,
    pub mode_switches: usize,
    pub performance_warnings: usize,
}

/// Timer utility for measuring operation durations
pub struct OperationTimer {
    start_time: Instant,
    operation_name: String,
}

impl OperationTimer {
    pub fn new(operation_name: String) -> Self {
        trace!("Starting operation: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.elapsed();
        trace!("Completed operation '{}' in {}ms", self.operation_name, duration.as_millis());
        duration
    }

    pub fn finish_with_threshold(self, threshold: Duration) -> Duration {
        let duration = self.elapsed();
        if duration > threshold {
            warn!(
                "Operation '{}' took {}ms (threshold: {}ms)",
                self.operation_name,
                duration.as_millis(),
                threshold.as_millis()
            );
        } else {
            debug!("Completed operation '{}' in {}ms", self.operation_name, duration.as_millis());
        }
        duration
    }
}

/// Macro for timing operations with threshold warnings
#[macro_export]
macro_rules! time_operation_with_threshold {
    ($name:expr, $threshold:expr, $code:block) => {{
        let timer = $crate::logging::OperationTimer::new($name.to_string());
        let result = $code;
        let duration = timer.finish_with_threshold($threshold);
        (result, duration)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_engine_logger_creation() {
        let logger = EngineLogger::new();
        assert_eq!(logger.max_events, 1000);
        assert!(logger.get_recent_events(10).is_empty());
    }

    #[test]
    fn test_log_event() {
        let logger = EngineLogger::new();
        logger.log_event(LogEventType::PlaybackStarted, "Test playback".to_string(), None);

        let events = logger.get_recent_events(1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details, "Test playback");
        assert_eq!(events[0].event_type, LogEventType::PlaybackStarted);
    }

    #[test]
    fn test_event_history_limit() {
        let mut logger = EngineLogger::new();
        logger.max_events = 3;

        for i in 0..5 {
            logger.log_event(LogEventType::TrackChanged, format!("Event {}", i), None);
        }

        let events = logger.get_recent_events(10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].details, "Event 2");
        assert_eq!(events[2].details, "Event 4");
    }

    #[test]
    fn test_recent_events_keep_chronological_order() {
        let logger = EngineLogger::new();
        for i in 0..4 {
            logger.log_event(LogEventType::SeekOperation, format!("seek {}", i), None);
        }
        let events = logger.get_recent_events(2);
        assert_eq!(events[0].details, "seek 2");
        assert_eq!(events[1].details, "seek 3");
    }

    #[test]
    fn test_event_statistics() {
        let logger = EngineLogger::new();
        let a = TrackId::new("a");

        logger.log_crossfade_completed(&a);
        logger.log_crossfade_completed(&a);
        logger.log_crossfade_cancelled("seek");
        logger.log_preload_failed(&a, "timeout");
        logger.log_playback_error(&a, "decode", 1);
        logger.log_mode_switched(OutputMode::Graph, OutputMode::Direct, Duration::from_millis(3));

        let stats = logger.get_event_statistics();
        assert_eq!(stats.total_events, 6);
        assert_eq!(stats.crossfades_completed, 2);
        assert_eq!(stats.crossfades_cancelled, 1);
        assert_eq!(stats.preload_failures, 1);
        assert_eq!(stats.playback_errors, 1);
        assert_eq!(stats.mode_switches, 1);
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_operation".to_string());
        thread::sleep(Duration::from_millis(10));
        let duration = timer.finish();
        assert!(duration >= Duration::from_millis(10));
    }

    #[test]
    fn test_time_operation_macro_returns_result_and_duration() {
        let (value, elapsed) =
            crate::time_operation_with_threshold!("sum", Duration::from_secs(1), { 2 + 2 });
        assert_eq!(value, 4);
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn test_performance_warning_is_counted() {
        let logger = EngineLogger::new();
        logger.log_performance_warning(
            "switch graph -> direct",
            Duration::from_millis(80),
            Duration::from_millis(50),
        );

        let events = logger.get_recent_events(1);
        assert_eq!(events[0].event_type, LogEventType::PerformanceWarning);
        assert_eq!(events[0].duration, Some(Duration::from_millis(80)));
        assert!(events[0].details.contains("took 80ms (threshold: 50ms)"));
        assert_eq!(logger.get_event_statistics().performance_warnings, 1);
    }

    #[test]
    fn test_event_type_as_str() {
        assert_eq!(LogEventType::CrossfadeStarted.as_str(), "CROSSFADE_STARTED");
        assert_eq!(LogEventType::ModeSwitched.as_str(), "MODE_SWITCHED");
        assert_eq!(LogEventType::ResolutionFailed.as_str(), "RESOLUTION_FAILED");
    }

    #[test]
    fn test_track_specific_log_methods() {
        let logger = EngineLogger::new();
        let a = Track::new("a", Duration::from_secs(100));
        let b = Track::new("b", Duration::from_secs(100));

        logger.log_playback_started(&a);
        logger.log_playback_paused(Duration::from_secs(30));
        logger.log_track_changed(Some(&a), &b);
        logger.log_track_changed(None, &b);
        logger.log_preload_started(&b, Duration::from_secs(7));
        logger.log_crossfade_started(&a.id, &b.id, Duration::from_secs(5));
        logger.log_seek_operation(Duration::from_secs(10), Duration::from_secs(20));
        logger.log_resolution_failed(&b.id, "offline");

        let events = logger.get_recent_events(20);
        assert_eq!(events.len(), 8);
        assert_eq!(events[2].details, "Track changed from 'a' to 'b'");
        assert_eq!(events[3].details, "Track loaded: 'b'");
    }
}
