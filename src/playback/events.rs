use crate::audio::SlotSignal;
use crate::error::{PlayerError, SourceError};
use crate::models::{
    EngineStats, OutputMode, QueueId, QueueListing, QueueSource, RepeatMode, StreamSource, Track, TrackId,
    Visibility,
};
use std::time::Duration;
use tokio::sync::oneshot;

/// Completion of asynchronous work, posted back to the controller.
///
/// Every variant carries the ticket or epoch it was started under; the
/// controller drops results whose ticket is no longer current.
#[derive(Debug)]
pub enum EngineEvent {
    Slot(SlotSignal),
    SourceResolved {
        ticket: u64,
        track_id: TrackId,
        result: Result<StreamSource, SourceError>,
    },
    LazyBatch {
        epoch: u64,
        purpose: LazyFetch,
        result: Result<Vec<Track>, SourceError>,
    },
    LazyOrder {
        epoch: u64,
        shuffle: bool,
        result: Result<Vec<TrackId>, SourceError>,
    },
    PreloadTimeout {
        ticket: u64,
    },
    CrossfadeElapsed {
        ticket: u64,
    },
}

/// Why a lazy-queue batch was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyFetch {
    /// First id plus look-ahead when the lazy queue is created
    Initial,
    /// Record needed to move the pointer to `index`
    Jump { index: usize, autoplay: bool },
    /// Opportunistic look-ahead after an advance
    Prefetch,
}

/// Transport and queue commands accepted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetQueue { tracks: Vec<Track>, start_index: usize },
    AddToQueue(Track),
    RemoveFromQueue(QueueId),
    ClearQueue,
    PlayTrack(QueueId),
    PlayNext,
    PlayPrevious,
    Seek(Duration),
    TogglePlayPause,
    Play,
    Pause,
    ToggleShuffle,
    ToggleRepeat,
    SetRepeat(RepeatMode),
    SetLazyQueue {
        ids: Vec<TrackId>,
        source: Option<QueueSource>,
    },
    ExitLazyMode,
    SetVolume(f32),
    SetCrossfade(Duration),
    SetVisibility(Visibility),
    SetGraphFeatures(bool),
    SetPreferredMode(OutputMode),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetQueue { .. } => "set_queue",
            Command::AddToQueue(_) => "add_to_queue",
            Command::RemoveFromQueue(_) => "remove_from_queue",
            Command::ClearQueue => "clear_queue",
            Command::PlayTrack(_) => "play_track",
            Command::PlayNext => "play_next",
            Command::PlayPrevious => "play_previous",
            Command::Seek(_) => "seek",
            Command::TogglePlayPause => "toggle_play_pause",
            Command::Play => "play",
            Command::Pause => "pause",
            Command::ToggleShuffle => "toggle_shuffle",
            Command::ToggleRepeat => "toggle_repeat",
            Command::SetRepeat(_) => "set_repeat",
            Command::SetLazyQueue { .. } => "set_lazy_queue",
            Command::ExitLazyMode => "exit_lazy_mode",
            Command::SetVolume(_) => "set_volume",
            Command::SetCrossfade(_) => "set_crossfade",
            Command::SetVisibility(_) => "set_visibility",
            Command::SetGraphFeatures(_) => "set_graph_features",
            Command::SetPreferredMode(_) => "set_preferred_mode",
        }
    }
}

/// Message from a [`Player`](crate::playback::player::Player) handle to its actor
#[derive(Debug)]
pub enum Request {
    Command {
        command: Command,
        reply: oneshot::Sender<Result<(), PlayerError>>,
    },
    Listing {
        reply: oneshot::Sender<QueueListing>,
    },
    Stats {
        reply: oneshot::Sender<EngineStats>,
    },
}
