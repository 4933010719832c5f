use crate::error_recovery::RecoveryStatistics;
use crate::logging::{EventStatistics, LogEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Stable identifier of a track in the library
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Track metadata as supplied by the track source.
///
/// The engine only looks at `id` and `duration`; the rest is carried along
/// for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Duration,
}

impl Track {
    pub fn new(id: impl Into<TrackId>, duration: Duration) -> Self {
        Self {
            id: id.into(),
            title: None,
            artist: None,
            album: None,
            duration,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    /// Get the display name for this track (title or id)
    pub fn display_name(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.id.to_string())
    }

    /// Get the artist name or "Unknown Artist"
    pub fn artist_name(&self) -> String {
        self.artist
            .clone()
            .unwrap_or_else(|| "Unknown Artist".to_string())
    }

    /// Get the album name or "Unknown Album"
    pub fn album_name(&self) -> String {
        self.album
            .clone()
            .unwrap_or_else(|| "Unknown Album".to_string())
    }
}

/// Identity of one occurrence of a track inside a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(Uuid);

impl QueueId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueueId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueItem {
    pub track: Track,
    pub queue_id: QueueId,
}

impl QueueItem {
    pub fn new(track: Track) -> Self {
        Self {
            track,
            queue_id: QueueId::new(),
        }
    }
}

/// Where a queue came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Library,
    Album,
    Playlist,
    Artist,
    Other,
}

impl SourceKind {
    /// Whether a fresh ordering can be requested from the track source
    pub fn is_refetchable(&self) -> bool {
        !matches!(self, SourceKind::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Library => "library",
            SourceKind::Album => "album",
            SourceKind::Playlist => "playlist",
            SourceKind::Artist => "artist",
            SourceKind::Other => "other",
        }
    }
}

/// Filter parameters that produced a queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFilters {
    pub album: Option<String>,
    pub artist: Option<String>,
    pub playlist: Option<String>,
    pub search: Option<String>,
}

/// Provenance tag of a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSource {
    pub kind: SourceKind,
    #[serde(default)]
    pub filters: SourceFilters,
}

impl QueueSource {
    pub fn new(kind: SourceKind, filters: SourceFilters) -> Self {
        Self { kind, filters }
    }

    pub fn library() -> Self {
        Self::new(SourceKind::Library, SourceFilters::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    One,
}

impl RepeatMode {
    /// Cycle off -> all -> one -> off
    pub fn next(&self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::All => "all",
            RepeatMode::One => "one",
        }
    }
}

impl std::str::FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "none" => Ok(RepeatMode::Off),
            "all" => Ok(RepeatMode::All),
            "one" | "single" => Ok(RepeatMode::One),
            other => Err(format!("unknown repeat mode '{}'", other)),
        }
    }
}

/// Lifecycle of the track loaded in the active slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackPhase {
    Unloaded,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
}

impl TrackPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackPhase::Unloaded => "Unloaded",
            TrackPhase::Loading => "Loading",
            TrackPhase::Ready => "Ready",
            TrackPhase::Playing => "Playing",
            TrackPhase::Paused => "Paused",
            TrackPhase::Ended => "Ended",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CrossfadeState {
    #[default]
    Idle,
    Preloading,
    Crossfading,
}

impl CrossfadeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrossfadeState::Idle => "idle",
            CrossfadeState::Preloading => "preloading",
            CrossfadeState::Crossfading => "crossfading",
        }
    }
}

/// Output pipeline used by the slot pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Routed through the shared processing graph
    #[default]
    Graph,
    /// Element volume only, keeps playing in the background
    Direct,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Graph => "graph",
            OutputMode::Direct => "direct",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "graph" => Ok(OutputMode::Graph),
            "direct" => Ok(OutputMode::Direct),
            other => Err(format!("unknown output mode '{}'", other)),
        }
    }
}

/// Host application visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Foreground,
    Background,
}

/// Playable location of a resolved track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSource {
    pub locator: String,
    /// Temporary local-cache handle that must be revoked once released
    pub is_local_cache: bool,
}

impl StreamSource {
    pub fn remote(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            is_local_cache: false,
        }
    }

    pub fn local_cache(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            is_local_cache: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub length: usize,
    pub current_index: Option<usize>,
    pub is_lazy: bool,
    pub has_next: bool,
}

/// Read-only view of the engine published after every change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub current_track: Option<Track>,
    pub is_playing: bool,
    pub position: Duration,
    pub duration: Duration,
    pub queue: QueueSummary,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    pub crossfade_state: CrossfadeState,
    pub crossfade_duration: Duration,
    pub volume: f32,
    pub output_mode: OutputMode,
    pub phase: TrackPhase,
    pub error: Option<String>,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            current_track: None,
            is_playing: false,
            position: Duration::ZERO,
            duration: Duration::ZERO,
            queue: QueueSummary::default(),
            shuffle: false,
            repeat: RepeatMode::Off,
            crossfade_state: CrossfadeState::Idle,
            crossfade_duration: Duration::ZERO,
            volume: 1.0,
            output_mode: OutputMode::Graph,
            phase: TrackPhase::Unloaded,
            error: None,
        }
    }
}

impl PlayerSnapshot {
    /// Get progress as a fraction (0.0 to 1.0)
    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            0.0
        } else {
            (self.position.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
        }
    }

    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.position)
    }

    /// Format position as MM:SS
    pub fn position_formatted(&self) -> String {
        format_mm_ss(self.position)
    }

    /// Format duration as MM:SS
    pub fn duration_formatted(&self) -> String {
        format_mm_ss(self.duration)
    }
}

fn format_mm_ss(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Queue contents for listing commands
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueListing {
    pub entries: Vec<QueueItem>,
    pub current_index: Option<usize>,
    /// `(pointer, total ids)` while a lazy queue is active
    pub lazy: Option<(usize, usize)>,
    pub upcoming_ids: Vec<TrackId>,
    pub history: Vec<Track>,
}

/// Journal counters and error-recovery totals for the stats command
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub events: EventStatistics,
    pub recovery: RecoveryStatistics,
    /// Newest last
    pub recent: Vec<LogEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_mode_cycles() {
        let mut mode = RepeatMode::Off;
        mode = mode.next();
        assert_eq!(mode, RepeatMode::All);
        mode = mode.next();
        assert_eq!(mode, RepeatMode::One);
        mode = mode.next();
        assert_eq!(mode, RepeatMode::Off);
    }

    #[test]
    fn test_repeat_mode_from_str() {
        assert_eq!("all".parse::<RepeatMode>().unwrap(), RepeatMode::All);
        assert_eq!("ONE".parse::<RepeatMode>().unwrap(), RepeatMode::One);
        assert!("sometimes".parse::<RepeatMode>().is_err());
    }

    #[test]
    fn test_track_display_fallbacks() {
        let track = Track::new("t-1", Duration::from_secs(200));
        assert_eq!(track.display_name(), "t-1");
        assert_eq!(track.artist_name(), "Unknown Artist");
        assert_eq!(track.album_name(), "Unknown Album");

        let track = track.with_title("Song").with_artist("Band");
        assert_eq!(track.display_name(), "Song");
        assert_eq!(track.artist_name(), "Band");
    }

    #[test]
    fn test_queue_ids_are_unique_per_occurrence() {
        let track = Track::new("same", Duration::from_secs(10));
        let a = QueueItem::new(track.clone());
        let b = QueueItem::new(track);
        assert_eq!(a.track, b.track);
        assert_ne!(a.queue_id, b.queue_id);
        assert_eq!(a.queue_id.to_string().len(), 8);
    }

    #[test]
    fn test_source_kind_refetchable() {
        assert!(SourceKind::Library.is_refetchable());
        assert!(SourceKind::Playlist.is_refetchable());
        assert!(!SourceKind::Other.is_refetchable());
    }

    #[test]
    fn test_snapshot_progress_and_formatting() {
        let snapshot = PlayerSnapshot {
            position: Duration::from_secs(90),
            duration: Duration::from_secs(180),
            ..Default::default()
        };
        assert_eq!(snapshot.progress(), 0.5);
        assert_eq!(snapshot.position_formatted(), "01:30");
        assert_eq!(snapshot.duration_formatted(), "03:00");
        assert_eq!(snapshot.remaining(), Duration::from_secs(90));

        let empty = PlayerSnapshot::default();
        assert_eq!(empty.progress(), 0.0);
    }

    #[test]
    fn test_track_serialization() {
        let track = Track::new("abc", Duration::from_millis(1500)).with_album("LP");
        let json = serde_json::to_string(&track).unwrap();
        let back: Track = serde_json::from_str(&json).unwrap();
        assert_eq!(track, back);
    }
}
