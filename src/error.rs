use crate::audio::SlotId;
use crate::models::{OutputMode, QueueId, TrackId};
use thiserror::Error;

/// Main player error type
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("CLI parse error: {0}")]
    Parse(#[from] crate::cli::ParseError),

    #[error("Playback engine is not running")]
    EngineStopped,
}

impl PlayerError {
    /// Get user-friendly error message with suggested solutions
    pub fn user_message(&self) -> String {
        match self {
            PlayerError::Surface(err) => err.user_message(),
            PlayerError::Source(err) => err.user_message(),
            PlayerError::Queue(err) => err.user_message(),
            PlayerError::Config(err) => err.user_message(),
            PlayerError::Persistence(err) => err.user_message(),
            PlayerError::File(err) => Self::format_file_error(err),
            PlayerError::Parse(err) => format!("Command error: {}", err),
            PlayerError::EngineStopped => "The playback engine has shut down".to_string(),
        }
    }

    /// Get suggested recovery actions for the error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PlayerError::Surface(err) => err.recovery_suggestions(),
            PlayerError::Source(err) => err.recovery_suggestions(),
            PlayerError::Queue(err) => err.recovery_suggestions(),
            PlayerError::Config(err) => err.recovery_suggestions(),
            PlayerError::Persistence(err) => err.recovery_suggestions(),
            PlayerError::File(err) => Self::file_error_suggestions(err),
            PlayerError::Parse(_) => vec!["Type 'help' to see available commands".to_string()],
            PlayerError::EngineStopped => vec!["Restart the player".to_string()],
        }
    }

    /// Check if this error allows for automatic recovery
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::Surface(err) => err.is_recoverable(),
            PlayerError::Source(err) => err.is_recoverable(),
            PlayerError::Queue(err) => err.is_recoverable(),
            PlayerError::Config(err) => err.is_recoverable(),
            PlayerError::Persistence(err) => err.is_recoverable(),
            PlayerError::File(_) => false,
            PlayerError::Parse(_) => false,
            PlayerError::EngineStopped => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PlayerError::Surface(SurfaceError::PreloadTimeout { .. }) => ErrorSeverity::Info,
            PlayerError::Surface(SurfaceError::ModeSwitch { .. }) => ErrorSeverity::Warning,
            PlayerError::Surface(_) => ErrorSeverity::Error,
            PlayerError::Source(SourceError::NotFound { .. }) => ErrorSeverity::Warning,
            PlayerError::Source(_) => ErrorSeverity::Error,
            PlayerError::Queue(QueueError::EmptyQueue) => ErrorSeverity::Info,
            PlayerError::Queue(_) => ErrorSeverity::Warning,
            PlayerError::Config(_) => ErrorSeverity::Warning,
            PlayerError::Persistence(_) => ErrorSeverity::Warning,
            PlayerError::File(_) => ErrorSeverity::Error,
            PlayerError::Parse(_) => ErrorSeverity::Info,
            PlayerError::EngineStopped => ErrorSeverity::Critical,
        }
    }

    fn format_file_error(err: &std::io::Error) -> String {
        match err.kind() {
            std::io::ErrorKind::NotFound => "File or directory not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "Permission denied - cannot access file".to_string(),
            std::io::ErrorKind::InvalidData => "File contains invalid or corrupted data".to_string(),
            _ => format!("File system error: {}", err),
        }
    }

    fn file_error_suggestions(err: &std::io::Error) -> Vec<String> {
        match err.kind() {
            std::io::ErrorKind::NotFound => vec![
                "Check that the file path is correct".to_string(),
                "Try using absolute path instead of relative path".to_string(),
            ],
            std::io::ErrorKind::PermissionDenied => vec![
                "Check file permissions".to_string(),
                "Ensure the file is not locked by another application".to_string(),
            ],
            _ => vec!["Try the operation again".to_string()],
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Errors raised by playback slots and output modes
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SurfaceError {
    #[error("No source loaded in slot {slot}")]
    EmptySlot { slot: SlotId },

    #[error("Failed to load '{locator}': {reason}")]
    Load { locator: String, reason: String },

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Preload did not become ready within {seconds:.1}s")]
    PreloadTimeout { seconds: f64 },

    #[error("Processing graph is suspended")]
    GraphSuspended,

    #[error("Mode switch from {from} to {to} failed: {reason}")]
    ModeSwitch {
        from: OutputMode,
        to: OutputMode,
        reason: String,
    },

    #[error("Invalid seek position: {position:.2}s exceeds track duration {duration:.2}s")]
    InvalidSeek { position: f64, duration: f64 },
}

impl SurfaceError {
    pub fn user_message(&self) -> String {
        match self {
            SurfaceError::EmptySlot { .. } => "Nothing is loaded to play".to_string(),
            SurfaceError::Load { locator, .. } => {
                format!("Track stream '{}' could not be opened", locator)
            }
            SurfaceError::Playback(msg) => format!("Playback interrupted: {}", msg),
            SurfaceError::PreloadTimeout { .. } => {
                "Next track was slow to load - switching without a crossfade".to_string()
            }
            SurfaceError::GraphSuspended => {
                "Audio processing is suspended while the app is in the background".to_string()
            }
            SurfaceError::ModeSwitch { to, .. } => {
                format!("Could not switch to {} output - keeping the current output", to)
            }
            SurfaceError::InvalidSeek { position, duration } => {
                format!("Cannot seek to {:.1}s - track is only {:.1}s long", position, duration)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            SurfaceError::EmptySlot { .. } => vec![
                "Add tracks with 'queue add <id>'".to_string(),
                "Start a queue with 'segue play <manifest>'".to_string(),
            ],
            SurfaceError::Load { .. } | SurfaceError::Playback(_) => vec![
                "The track will be retried automatically".to_string(),
                "Use 'next' to skip it".to_string(),
            ],
            SurfaceError::PreloadTimeout { .. } => vec![
                "Check your network connection".to_string(),
                "Lower the crossfade duration with 'crossfade <secs>'".to_string(),
            ],
            SurfaceError::GraphSuspended => vec![
                "Switch to direct output with 'mode direct'".to_string(),
            ],
            SurfaceError::ModeSwitch { .. } => vec![
                "Playback continues in the previous output mode".to_string(),
                "Try switching again with 'mode graph' or 'mode direct'".to_string(),
            ],
            SurfaceError::InvalidSeek { duration, .. } => vec![
                format!("Use a position between 0 and {:.1} seconds", duration),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            SurfaceError::EmptySlot { .. } => false,
            SurfaceError::Load { .. } => true,
            SurfaceError::Playback(_) => true,
            SurfaceError::PreloadTimeout { .. } => true,
            SurfaceError::GraphSuspended => true,
            SurfaceError::ModeSwitch { .. } => true,
            SurfaceError::InvalidSeek { .. } => false,
        }
    }
}

/// Track source errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Track not found: {id}")]
    NotFound { id: TrackId },

    #[error("Track source unreachable: {0}")]
    Unreachable(String),

    #[error("No tracks match the requested filters")]
    EmptySelection,

    #[error("Invalid library manifest: {0}")]
    Manifest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn user_message(&self) -> String {
        match self {
            SourceError::NotFound { id } => format!("Track '{}' is unavailable", id),
            SourceError::Unreachable(msg) => format!("Cannot reach the music library: {}", msg),
            SourceError::EmptySelection => "No tracks match the requested selection".to_string(),
            SourceError::Manifest(msg) => format!("Library manifest could not be read: {}", msg),
            SourceError::Io(err) => format!("Cannot access library manifest: {}", err),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            SourceError::NotFound { .. } => vec![
                "Use 'next' to continue with the following track".to_string(),
                "Use 'play' to retry".to_string(),
            ],
            SourceError::Unreachable(_) => vec![
                "Check your network connection".to_string(),
                "Use 'play' to retry once the library is reachable".to_string(),
            ],
            SourceError::EmptySelection => vec![
                "Broaden the filters or pick another source".to_string(),
            ],
            SourceError::Manifest(_) | SourceError::Io(_) => vec![
                "Check the manifest path and TOML syntax".to_string(),
                "Each [[tracks]] entry needs id, duration_secs and locator".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            SourceError::NotFound { .. } => false,
            SourceError::Unreachable(_) => true,
            SourceError::EmptySelection => false,
            SourceError::Manifest(_) => false,
            SourceError::Io(_) => true,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => {
                format!("Cannot access configuration file: {}", err)
            }
            ConfigError::SerializationError(_) => {
                "Failed to save configuration settings".to_string()
            }
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
            ConfigError::InvalidValue { field, reason } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ConfigError::ConfigDirNotFound => vec![
                "Check that you have write permissions to your home directory".to_string(),
                "Try creating the directory manually: ~/.config/segue/".to_string(),
            ],
            ConfigError::IoError(_) => vec![
                "Check file permissions for the configuration directory".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
            ConfigError::SerializationError(_) => vec![
                "Configuration will use default values".to_string(),
            ],
            ConfigError::DeserializationError(_) => vec![
                "Delete the configuration file to reset to defaults".to_string(),
                "Check the configuration file format manually".to_string(),
            ],
            ConfigError::InvalidValue { .. } => vec![
                "Run 'segue config reset' to restore defaults".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        true
    }
}

/// Queue management errors
#[derive(Debug, Error, PartialEq)]
pub enum QueueError {
    #[error("Queue is empty")]
    EmptyQueue,

    #[error("Invalid index: {index}")]
    InvalidIndex { index: usize },

    #[error("No queue entry with id {queue_id}")]
    UnknownQueueId { queue_id: QueueId },

    #[error("'{operation}' is not available while a lazy queue is active")]
    LazyModeUnsupported { operation: String },
}

impl QueueError {
    pub fn user_message(&self) -> String {
        match self {
            QueueError::EmptyQueue => "No tracks in queue - add some tracks first".to_string(),
            QueueError::InvalidIndex { index } => {
                format!("Track number {} is not valid for current queue", index + 1)
            }
            QueueError::UnknownQueueId { .. } => {
                "That queue entry no longer exists".to_string()
            }
            QueueError::LazyModeUnsupported { operation } => {
                format!("Cannot {} while shuffling the whole library", operation)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            QueueError::EmptyQueue => vec![
                "Use 'queue add <id>' to add tracks".to_string(),
            ],
            QueueError::InvalidIndex { .. } | QueueError::UnknownQueueId { .. } => vec![
                "Use 'queue list' to see available tracks".to_string(),
                "Track numbers start from 1".to_string(),
            ],
            QueueError::LazyModeUnsupported { .. } => vec![
                "Use 'lazy off' to turn the library shuffle into a regular queue".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, QueueError::EmptyQueue | QueueError::LazyModeUnsupported { .. })
    }
}

/// Session persistence errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Data directory not found")]
    DataDirNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl PersistenceError {
    pub fn user_message(&self) -> String {
        match self {
            PersistenceError::DataDirNotFound => {
                "Cannot find a location to store the listening session".to_string()
            }
            PersistenceError::Io(err) => format!("Cannot access session file: {}", err),
            PersistenceError::Encoding(_) => {
                "Saved session is corrupted and will be ignored".to_string()
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PersistenceError::DataDirNotFound => vec![
                "Set 'session_file' in the configuration".to_string(),
            ],
            PersistenceError::Io(_) => vec![
                "Check permissions of the session file directory".to_string(),
            ],
            PersistenceError::Encoding(_) => vec![
                "Delete the session file to start fresh".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_player_error_from_surface_error() {
        let surface_error = SurfaceError::GraphSuspended;
        let player_error: PlayerError = surface_error.into();

        match player_error {
            PlayerError::Surface(SurfaceError::GraphSuspended) => {
                // Success
            }
            _ => panic!("Expected Surface error variant"),
        }
    }

    #[test]
    fn test_player_error_from_queue_error() {
        let player_error: PlayerError = QueueError::EmptyQueue.into();
        assert!(matches!(player_error, PlayerError::Queue(QueueError::EmptyQueue)));
        assert_eq!(player_error.severity(), ErrorSeverity::Info);
    }

    #[test]
    fn test_surface_error_display() {
        let error = SurfaceError::EmptySlot { slot: SlotId::B };
        assert_eq!(format!("{}", error), "No source loaded in slot B");

        let error = SurfaceError::PreloadTimeout { seconds: 10.0 };
        assert_eq!(format!("{}", error), "Preload did not become ready within 10.0s");

        let error = SurfaceError::ModeSwitch {
            from: OutputMode::Graph,
            to: OutputMode::Direct,
            reason: "element refused".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Mode switch from graph to direct failed: element refused"
        );
    }

    #[test]
    fn test_source_error_display() {
        let error = SourceError::NotFound { id: TrackId::new("t9") };
        assert_eq!(format!("{}", error), "Track not found: t9");

        let error = SourceError::Unreachable("timeout".to_string());
        assert_eq!(format!("{}", error), "Track source unreachable: timeout");
    }

    #[test]
    fn test_queue_error_display() {
        let error = QueueError::InvalidIndex { index: 5 };
        assert_eq!(format!("{}", error), "Invalid index: 5");
        assert_eq!(error.user_message(), "Track number 6 is not valid for current queue");

        let error = QueueError::LazyModeUnsupported {
            operation: "remove from queue".to_string(),
        };
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_severity_mapping() {
        let timeout: PlayerError = SurfaceError::PreloadTimeout { seconds: 10.0 }.into();
        assert_eq!(timeout.severity(), ErrorSeverity::Info);

        let playback: PlayerError = SurfaceError::Playback("decode".to_string()).into();
        assert_eq!(playback.severity(), ErrorSeverity::Error);
        assert_eq!(playback.severity().log_level(), log::Level::Error);

        assert_eq!(PlayerError::EngineStopped.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_recoverability() {
        assert!(SurfaceError::Playback("x".to_string()).is_recoverable());
        assert!(!SurfaceError::EmptySlot { slot: SlotId::A }.is_recoverable());
        assert!(SourceError::Unreachable("x".to_string()).is_recoverable());
        assert!(!SourceError::NotFound { id: TrackId::new("x") }.is_recoverable());
    }

    #[test]
    fn test_error_chain() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "Config file not found");
        let config_error: ConfigError = io_error.into();
        let player_error: PlayerError = config_error.into();

        let error_string = format!("{}", player_error);
        assert!(error_string.contains("Configuration error"));
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied");
        let player_error = PlayerError::Persistence(PersistenceError::Io(io_error));

        let mut current_error: &dyn Error = &player_error;
        let mut error_count = 0;

        while let Some(source) = current_error.source() {
            current_error = source;
            error_count += 1;
        }

        assert!(error_count >= 1);
    }
}
