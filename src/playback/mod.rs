pub mod crossfade;
pub mod events;
pub mod player;


use crate::audio::{ElementFactory, OutputModeController, PlaybackSurface, SlotId, SlotSignal, SlotSignalKind};
use crate::config::EngineSettings;
use crate::error::{PlayerError, QueueError, SourceError, SurfaceError};
use crate::error_recovery::{PlaybackErrorTracker, RecoveryResult};
use crate::logging::EngineLogger;
use crate::models::{
    CrossfadeState, EngineStats, OutputMode, PlayerSnapshot, QueueId, QueueListing, QueueSource, QueueSummary,
    RepeatMode, StreamSource, Track, TrackId, TrackPhase, Visibility,
};
use crate::persistence::{PersistedLazyQueue, PersistedSession};
use crate::queue::{AdvanceReason, LazyQueue, PlannedAdvance, QueueModel};
use crate::source::TrackSource;
use chrono::Utc;
use crossfade::{CompletedHandoff, CrossfadeOrchestrator, CrossfadeTarget};
use events::{Command, EngineEvent, LazyFetch};
use log::{debug, info, trace, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

pub use player::{Player, PlayerTiming};

/// Past this point "previous" restarts the current track
const RESTART_THRESHOLD: Duration = Duration::from_secs(3);

/// Ids shown after the pointer in a lazy queue listing
const LISTING_LOOKAHEAD: usize = 10;

/// Journal entries returned with the stats
const STATS_RECENT_EVENTS: usize = 10;

/// The playback engine.
///
/// Owns the queue (materialized or lazy), both slot pairs, the crossfade
/// session and the error policy. Callers drive it through commands,
/// [`handle_event`](Self::handle_event) for async completions and
/// [`tick`](Self::tick) for time; it never blocks.
pub struct PlaybackController {
    settings: EngineSettings,
    source: Arc<dyn TrackSource>,
    output: OutputModeController,
    events: UnboundedSender<EngineEvent>,
    logger: EngineLogger,
    errors: PlaybackErrorTracker,
    queue: QueueModel,
    lazy: Option<LazyQueue>,
    /// Epoch of the outstanding lazy re-order request
    pending_order: Option<u64>,
    crossfade: CrossfadeOrchestrator,
    active: SlotId,
    load_generation: u64,
    active_ticket: u64,
    phase: TrackPhase,
    is_playing: bool,
    autoplay: bool,
    pending_seek: Option<Duration>,
    volume: f32,
    last_error: Option<String>,
    dirty: bool,
}

impl PlaybackController {
    pub fn new(
        settings: EngineSettings,
        source: Arc<dyn TrackSource>,
        factory: &dyn ElementFactory,
        events: UnboundedSender<EngineEvent>,
        logger: EngineLogger,
    ) -> Self {
        let mut output = OutputModeController::new(
            factory,
            settings.preferred_output_mode,
            settings.graph_suspends_in_background,
            logger.clone(),
        );
        let volume = settings.initial_volume.clamp(0.0, 1.0);
        output.set_master_volume(volume);

        Self {
            errors: PlaybackErrorTracker::new(logger.clone(), settings.max_consecutive_errors),
            queue: QueueModel::new(settings.history_limit),
            crossfade: CrossfadeOrchestrator::new(&settings, events.clone(), logger.clone()),
            settings,
            source,
            output,
            events,
            logger,
            lazy: None,
            pending_order: None,
            active: SlotId::A,
            load_generation: 0,
            active_ticket: 0,
            phase: TrackPhase::Unloaded,
            is_playing: false,
            autoplay: false,
            pending_seek: None,
            volume,
            last_error: None,
            dirty: false,
        }
    }

    /// Use a seeded shuffle generator
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.queue = QueueModel::with_seed(self.settings.history_limit, seed);
        self
    }

    // ----- read side -----

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_crossfading(&self) -> bool {
        self.crossfade.is_crossfading()
    }

    pub fn crossfade_state(&self) -> CrossfadeState {
        self.crossfade.state()
    }

    pub fn phase(&self) -> TrackPhase {
        self.phase
    }

    pub fn active_slot(&self) -> SlotId {
        self.active
    }

    pub fn output(&self) -> &OutputModeController {
        &self.output
    }

    pub fn queue(&self) -> &QueueModel {
        &self.queue
    }

    pub fn lazy_queue(&self) -> Option<&LazyQueue> {
        self.lazy.as_ref()
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.errors.consecutive_errors()
    }

    pub fn logger(&self) -> &EngineLogger {
        &self.logger
    }

    pub fn current_track(&self) -> Option<&Track> {
        match &self.lazy {
            Some(lazy) => lazy.current(),
            None => self.queue.current_track(),
        }
    }

    pub fn position(&self) -> Duration {
        if self.phase == TrackPhase::Loading {
            return self.pending_seek.unwrap_or(Duration::ZERO);
        }
        self.output.position(self.active)
    }

    pub fn duration(&self) -> Duration {
        let reported = self.output.duration(self.active);
        if reported.is_zero() {
            self.current_track().map_or(Duration::ZERO, |track| track.duration)
        } else {
            reported
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let repeat = self.queue.repeat();
        let queue = match &self.lazy {
            Some(lazy) => QueueSummary {
                length: lazy.len(),
                current_index: lazy.current().map(|_| lazy.pointer()),
                is_lazy: true,
                has_next: lazy.plan_next(AdvanceReason::User, repeat).is_some(),
            },
            None => QueueSummary {
                length: self.queue.len(),
                current_index: self.queue.current_index(),
                is_lazy: false,
                has_next: self.queue.plan_advance(AdvanceReason::User).is_some(),
            },
        };

        PlayerSnapshot {
            current_track: self.current_track().cloned(),
            is_playing: self.is_playing,
            position: self.position(),
            duration: self.duration(),
            queue,
            shuffle: self.queue.is_shuffled(),
            repeat,
            crossfade_state: self.crossfade.state(),
            crossfade_duration: self.crossfade.duration(),
            volume: self.volume,
            output_mode: self.output.mode(),
            phase: self.phase,
            error: self.last_error.clone(),
        }
    }

    pub fn listing(&self) -> QueueListing {
        QueueListing {
            entries: self.queue.items().to_vec(),
            current_index: self.queue.current_index(),
            lazy: self.lazy.as_ref().map(|lazy| (lazy.pointer(), lazy.len())),
            upcoming_ids: self
                .lazy
                .as_ref()
                .map(|lazy| lazy.upcoming(LISTING_LOOKAHEAD))
                .unwrap_or_default(),
            history: self.queue.history().to_vec(),
        }
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            events: self.logger.get_event_statistics(),
            recovery: self.errors.get_recovery_statistics(),
            recent: self.logger.get_recent_events(STATS_RECENT_EVENTS),
        }
    }

    /// Whether anything worth saving changed since the last call
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    // ----- commands -----

    pub fn execute(&mut self, command: Command) -> Result<(), PlayerError> {
        debug!("Executing {}", command.name());
        self.dirty = true;
        match command {
            Command::SetQueue { tracks, start_index } => self.set_queue(tracks, start_index),
            Command::AddToQueue(track) => self.add_to_queue(track),
            Command::RemoveFromQueue(queue_id) => self.remove_from_queue(queue_id),
            Command::ClearQueue => {
                self.clear_queue();
                Ok(())
            }
            Command::PlayTrack(queue_id) => self.play_track(queue_id),
            Command::PlayNext => self.play_next(),
            Command::PlayPrevious => self.play_previous(),
            Command::Seek(position) => self.seek(position),
            Command::TogglePlayPause => self.toggle_play_pause(),
            Command::Play => self.play(),
            Command::Pause => {
                self.pause();
                Ok(())
            }
            Command::ToggleShuffle => {
                self.toggle_shuffle();
                Ok(())
            }
            Command::ToggleRepeat => {
                self.toggle_repeat();
                Ok(())
            }
            Command::SetRepeat(mode) => {
                self.set_repeat(mode);
                Ok(())
            }
            Command::SetLazyQueue { ids, source } => self.set_lazy_queue(ids, source),
            Command::ExitLazyMode => {
                self.exit_lazy_mode();
                Ok(())
            }
            Command::SetVolume(volume) => {
                self.set_volume(volume);
                Ok(())
            }
            Command::SetCrossfade(duration) => {
                self.set_crossfade(duration);
                Ok(())
            }
            Command::SetVisibility(visibility) => {
                self.set_visibility(visibility);
                Ok(())
            }
            Command::SetGraphFeatures(needed) => {
                self.set_graph_features(needed);
                Ok(())
            }
            Command::SetPreferredMode(mode) => {
                self.set_preferred_mode(mode);
                Ok(())
            }
        }
    }

    /// Replace the queue and start playing `start_index`
    pub fn set_queue(&mut self, tracks: Vec<Track>, start_index: usize) -> Result<(), PlayerError> {
        self.drop_lazy_queue();
        if tracks.is_empty() {
            self.clear_queue();
            return Ok(());
        }

        let previous = self.queue.current_track().cloned();
        if let Some(track) = self.queue.set_queue(tracks, start_index) {
            self.logger.log_track_changed(previous.as_ref(), &track);
        }
        self.load_current(true);
        Ok(())
    }

    pub fn add_to_queue(&mut self, track: Track) -> Result<(), PlayerError> {
        if let Some(lazy) = self.lazy.as_mut() {
            lazy.append(track);
            self.revalidate_session();
            return Ok(());
        }

        if self.queue.add(track) {
            self.load_current(false);
        } else {
            self.revalidate_session();
        }
        Ok(())
    }

    pub fn remove_from_queue(&mut self, queue_id: QueueId) -> Result<(), PlayerError> {
        if self.lazy.is_some() {
            return Err(QueueError::LazyModeUnsupported {
                operation: "remove from queue".to_string(),
            }
            .into());
        }

        let outcome = self.queue.remove(queue_id)?;
        debug!("Removed '{}' from queue", outcome.removed.track.display_name());

        if !outcome.was_current {
            self.revalidate_session();
        } else if self.queue.current_index().is_some() {
            let playing = self.is_playing;
            self.load_current(playing);
        } else {
            self.unload("current entry removed");
        }
        Ok(())
    }

    pub fn clear_queue(&mut self) {
        self.drop_lazy_queue();
        self.queue.clear();
        self.unload("queue cleared");
    }

    pub fn play_track(&mut self, queue_id: QueueId) -> Result<(), PlayerError> {
        if self.lazy.is_some() {
            return Err(QueueError::LazyModeUnsupported {
                operation: "play a queue entry".to_string(),
            }
            .into());
        }

        let previous = self.queue.current_track().cloned();
        let track = self.queue.select(queue_id)?;
        self.logger.log_track_changed(previous.as_ref(), &track);
        self.load_current(true);
        Ok(())
    }

    pub fn play_next(&mut self) -> Result<(), PlayerError> {
        if self.crossfade.is_crossfading() || self.crossfade.preload_ready() {
            if let Some(done) = self.crossfade.finish(&mut self.output, self.active) {
                self.complete_handoff(done);
                return Ok(());
            }
        }

        if self.lazy.is_some() {
            self.lazy_advance(AdvanceReason::User, true);
            return Ok(());
        }
        if self.queue.is_empty() {
            return Err(QueueError::EmptyQueue.into());
        }

        self.advance(AdvanceReason::User, true);
        Ok(())
    }

    /// Restart the current track, or step back when near its start
    pub fn play_previous(&mut self) -> Result<(), PlayerError> {
        if self.current_track().is_none() {
            return Err(QueueError::EmptyQueue.into());
        }

        let repeat = self.queue.repeat();
        let target = match &self.lazy {
            Some(lazy) => lazy.plan_previous(repeat),
            None => self.queue.plan_previous(),
        };

        match target {
            Some(index) if self.position() <= RESTART_THRESHOLD => {
                if self.lazy.is_some() {
                    self.lazy_jump(index, true);
                } else {
                    let previous = self.queue.current_track().cloned();
                    let track = self.queue.select_index(index)?;
                    self.logger.log_track_changed(previous.as_ref(), &track);
                    self.load_current(true);
                }
            }
            _ => self.restart_current(),
        }
        Ok(())
    }

    pub fn seek(&mut self, position: Duration) -> Result<(), PlayerError> {
        if self.current_track().is_none() || self.phase == TrackPhase::Unloaded {
            return Err(SurfaceError::EmptySlot { slot: self.active }.into());
        }

        let duration = self.duration();
        if position > duration {
            return Err(SurfaceError::InvalidSeek {
                position: position.as_secs_f64(),
                duration: duration.as_secs_f64(),
            }
            .into());
        }

        if self.crossfade.should_cancel_for_seek(position, duration) {
            self.cancel_crossfade("seek");
        }

        if self.phase == TrackPhase::Loading {
            self.pending_seek = Some(position);
            return Ok(());
        }

        let from = self.output.position(self.active);
        self.output.seek(self.active, position)?;
        self.logger.log_seek_operation(from, position);
        if self.phase == TrackPhase::Ended {
            self.phase = TrackPhase::Paused;
        }
        Ok(())
    }

    pub fn toggle_play_pause(&mut self) -> Result<(), PlayerError> {
        if self.is_playing {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    pub fn play(&mut self) -> Result<(), PlayerError> {
        match self.phase {
            TrackPhase::Playing => Ok(()),
            TrackPhase::Loading => {
                self.autoplay = true;
                self.is_playing = true;
                Ok(())
            }
            TrackPhase::Ready | TrackPhase::Paused => {
                self.play_active();
                Ok(())
            }
            TrackPhase::Unloaded | TrackPhase::Ended => {
                if self.current_track().is_none() {
                    return Err(QueueError::EmptyQueue.into());
                }
                self.load_current(true);
                Ok(())
            }
        }
    }

    pub fn pause(&mut self) {
        if self.crossfade.is_crossfading() {
            if let Some(done) = self.crossfade.finish(&mut self.output, self.active) {
                self.complete_handoff(done);
            }
        }

        self.autoplay = false;
        if !self.is_playing {
            return;
        }

        self.output.pause(self.active);
        self.is_playing = false;
        if self.phase == TrackPhase::Playing {
            self.phase = TrackPhase::Paused;
        }
        self.logger.log_playback_paused(self.output.position(self.active));
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        if self.lazy.is_none() {
            let enabled = self.queue.toggle_shuffle();
            info!("Shuffle {}", if enabled { "on" } else { "off" });
            self.revalidate_session();
            return enabled;
        }

        let enabled = !self.queue.is_shuffled();
        self.queue.set_shuffle_flag(enabled);
        self.request_lazy_order(enabled);
        enabled
    }

    pub fn toggle_repeat(&mut self) -> RepeatMode {
        let mode = self.queue.toggle_repeat();
        info!("Repeat {}", mode.as_str());
        self.revalidate_session();
        mode
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        self.queue.set_repeat(mode);
        self.revalidate_session();
    }

    /// Switch to an identifier-only queue and start on its first id
    pub fn set_lazy_queue(
        &mut self,
        ids: Vec<TrackId>,
        source: Option<QueueSource>,
    ) -> Result<(), PlayerError> {
        if ids.is_empty() {
            return Err(QueueError::EmptyQueue.into());
        }

        if let Some(track) = self.current_track().cloned() {
            self.queue.record_played(track);
        }
        self.drop_lazy_queue();
        self.queue.clear();
        self.unload("lazy queue started");

        let epoch = self.next_ticket();
        let mut lazy = LazyQueue::new(
            ids,
            source,
            self.settings.lazy_lookahead,
            self.settings.prefetch_cache_capacity,
            epoch,
        );
        lazy.begin_fetch();
        let window = lazy.initial_window();
        info!("Lazy queue of {} ids, resolving first {}", lazy.len(), window.len());
        self.lazy = Some(lazy);

        self.active_ticket = self.next_ticket();
        self.phase = TrackPhase::Loading;
        self.autoplay = true;
        self.is_playing = true;
        self.spawn_batch(epoch, LazyFetch::Initial, window);
        Ok(())
    }

    /// Turn the lazy queue into a one-entry queue holding the current track
    pub fn exit_lazy_mode(&mut self) {
        let Some(lazy) = self.lazy.take() else {
            return;
        };
        self.pending_order = None;

        match lazy.current().cloned() {
            Some(track) => {
                info!("Leaving lazy mode on '{}'", track.display_name());
                self.queue.replace_with_single(track);
                self.revalidate_session();
            }
            None => {
                self.queue.clear();
                self.unload("lazy queue abandoned");
            }
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.output.set_master_volume(self.volume);
    }

    /// Takes effect from the next track boundary
    pub fn set_crossfade(&mut self, duration: Duration) {
        self.cancel_crossfade("crossfade duration changed");
        self.crossfade.set_duration(duration);
        self.settings.crossfade = duration;
        info!("Crossfade set to {:.1}s", duration.as_secs_f32());
    }

    pub fn set_visibility(&mut self, visibility: Visibility) {
        self.output.set_visibility(visibility);
        match visibility {
            Visibility::Background => {
                self.apply_output_mode();
                if self.output.graph_must_suspend() {
                    self.output.suspend_graph();
                }
            }
            Visibility::Foreground => {
                if let Err(err) = self.output.resume_graph() {
                    warn!("Processing graph did not resume: {}", err);
                }
                self.apply_output_mode();
            }
        }
    }

    pub fn set_graph_features(&mut self, needed: bool) {
        self.output.set_graph_features(needed);
        self.apply_output_mode();
    }

    pub fn set_preferred_mode(&mut self, mode: OutputMode) {
        self.output.set_preferred(mode);
        self.apply_output_mode();
    }

    // ----- persistence -----

    pub fn session(&self) -> PersistedSession {
        PersistedSession {
            saved_at: Utc::now(),
            items: self.queue.items().to_vec(),
            current_index: self.queue.current_index(),
            position_secs: self.position().as_secs_f64(),
            volume: self.volume,
            shuffle: self.queue.is_shuffled(),
            repeat: self.queue.repeat(),
            lazy: self.lazy.as_ref().map(|lazy| PersistedLazyQueue {
                ids: lazy.ids().to_vec(),
                pointer: lazy.pointer(),
                source: lazy.source().cloned(),
                current: lazy.current().cloned(),
            }),
        }
    }

    /// Rebuild a saved session; the track comes back paused at its position
    pub fn restore(&mut self, session: PersistedSession) {
        self.set_volume(session.volume);
        let position = session.position();

        match session.lazy {
            Some(saved) if !saved.ids.is_empty() => {
                self.queue.restore(Vec::new(), None, false, session.repeat);
                self.queue.set_shuffle_flag(session.shuffle);
                let epoch = self.next_ticket();
                let mut lazy = LazyQueue::new(
                    saved.ids,
                    saved.source,
                    self.settings.lazy_lookahead,
                    self.settings.prefetch_cache_capacity,
                    epoch,
                );
                let pointer = saved.pointer;
                let has_current = saved.current.is_some();
                lazy.restore(pointer, saved.current);
                self.lazy = Some(lazy);
                if !has_current {
                    self.lazy_jump(pointer, false);
                    return;
                }
            }
            _ => self.queue.restore(
                session.items,
                session.current_index,
                session.shuffle,
                session.repeat,
            ),
        }

        if self.current_track().is_some() {
            self.load_current(false);
            if !position.is_zero() {
                self.pending_seek = Some(position);
            }
            info!("Restored session at {:.1}s", position.as_secs_f32());
        }
    }

    /// Release both slot pairs
    pub fn shutdown(&mut self) {
        self.cancel_crossfade("shutdown");
        let released = self.output.release_all();
        self.revoke(released);
        self.is_playing = false;
        self.phase = TrackPhase::Unloaded;
        self.logger.log_playback_stopped("shutdown");
    }

    // ----- time and events -----

    /// Drive gain ramps and the preload/crossfade triggers
    pub fn tick(&mut self, now: Instant) {
        self.output.advance(now);
        if !self.is_playing || self.phase != TrackPhase::Playing {
            return;
        }

        let duration = self.duration();
        if duration.is_zero() {
            return;
        }
        let remaining = duration.saturating_sub(self.output.position(self.active));

        if self.crossfade.should_preload(remaining, self.active_ticket) {
            self.begin_preload(remaining);
        }
        if self.crossfade.should_start(remaining) {
            self.start_crossfade(now);
        }
    }

    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Slot(signal) => self.on_slot_signal(signal),
            EngineEvent::SourceResolved {
                ticket,
                track_id,
                result,
            } => self.on_source_resolved(ticket, track_id, result),
            EngineEvent::LazyBatch {
                epoch,
                purpose,
                result,
            } => self.on_lazy_batch(epoch, purpose, result),
            EngineEvent::LazyOrder {
                epoch,
                shuffle,
                result,
            } => self.on_lazy_order(epoch, shuffle, result),
            EngineEvent::PreloadTimeout { ticket } => {
                let released = self
                    .crossfade
                    .on_timeout(&mut self.output, self.active, ticket, self.active_ticket);
                self.revoke(released);
            }
            EngineEvent::CrossfadeElapsed { ticket } => {
                if !(self.crossfade.owns_ticket(ticket) && self.crossfade.is_crossfading()) {
                    debug!("Dropping stale crossfade completion (ticket {})", ticket);
                    return;
                }
                if let Some(done) = self.crossfade.finish(&mut self.output, self.active) {
                    self.complete_handoff(done);
                }
            }
        }
    }

    fn on_slot_signal(&mut self, signal: SlotSignal) {
        if signal.mode != self.output.mode() {
            debug!("Dropping {:?} from inactive {} output", signal.kind, signal.mode);
            return;
        }

        if signal.slot == self.active && signal.ticket == self.active_ticket {
            match signal.kind {
                SlotSignalKind::Ready => self.on_active_ready(),
                SlotSignalKind::Ended => {
                    if self.crossfade.is_crossfading() {
                        trace!("Outgoing track ended inside the crossfade");
                    } else {
                        self.on_track_ended();
                    }
                }
                SlotSignalKind::Failed(reason) => {
                    self.on_playback_failure(SurfaceError::Playback(reason).into());
                }
            }
            return;
        }

        let incoming = self.crossfade.session().map(|session| session.incoming);
        if self.crossfade.owns_ticket(signal.ticket) && incoming == Some(signal.slot) {
            match signal.kind {
                SlotSignalKind::Ready => self.crossfade.on_preload_ready(signal.ticket),
                SlotSignalKind::Failed(reason) => {
                    let released = self.crossfade.on_preload_failed(
                        &mut self.output,
                        self.active,
                        self.active_ticket,
                        &reason,
                    );
                    self.revoke(released);
                }
                SlotSignalKind::Ended => trace!("Incoming track ended before handoff"),
            }
            return;
        }

        debug!(
            "Dropping stale {:?} from slot {} (ticket {}, active {})",
            signal.kind, signal.slot, signal.ticket, self.active_ticket
        );
    }

    fn on_source_resolved(
        &mut self,
        ticket: u64,
        track_id: TrackId,
        result: Result<StreamSource, SourceError>,
    ) {
        if ticket == self.active_ticket && self.phase == TrackPhase::Loading {
            match result {
                Ok(stream) => {
                    self.output.set_gain(self.active, 1.0);
                    if let Err(err) = self.output.load(self.active, &stream, ticket) {
                        self.on_playback_failure(err.into());
                    }
                }
                Err(err) => self.on_playback_failure(err.into()),
            }
            return;
        }

        if self.crossfade.owns_ticket(ticket) {
            let Some(incoming) = self.crossfade.session().map(|session| session.incoming) else {
                return;
            };
            let failure = match result {
                Ok(stream) => {
                    self.output.set_gain(incoming, 0.0);
                    self.output
                        .load(incoming, &stream, ticket)
                        .err()
                        .map(|err| err.to_string())
                }
                Err(err) => Some(err.to_string()),
            };
            if let Some(reason) = failure {
                let released = self.crossfade.on_preload_failed(
                    &mut self.output,
                    self.active,
                    self.active_ticket,
                    &reason,
                );
                self.revoke(released);
            }
            return;
        }

        debug!("Dropping stale resolution of '{}' (ticket {})", track_id, ticket);
        if let Ok(stream) = result {
            self.revoke(Some(stream));
        }
    }

    fn on_active_ready(&mut self) {
        if self.phase != TrackPhase::Loading {
            trace!("Active slot re-signalled ready");
            return;
        }

        self.phase = TrackPhase::Ready;
        if let Some(position) = self.pending_seek.take() {
            if let Err(err) = self.output.seek(self.active, position) {
                warn!("Could not restore position {:.1}s: {}", position.as_secs_f32(), err);
            }
        }
        if self.autoplay {
            self.play_active();
        }
    }

    fn on_track_ended(&mut self) {
        if let Some(track) = self.current_track() {
            let id = track.id.clone();
            self.errors.record_success(&id);
        }

        if self.crossfade.preload_ready() {
            if let Some(done) = self.crossfade.finish(&mut self.output, self.active) {
                self.complete_handoff(done);
                return;
            }
        }
        self.advance(AdvanceReason::Natural, true);
    }

    fn on_playback_failure(&mut self, error: PlayerError) {
        let Some(track) = self.current_track().cloned() else {
            return;
        };

        match self.errors.record_error(&track.id, &error) {
            RecoveryResult::Retry(message) => {
                info!("{}", message);
                let position = self.output.position(self.active);
                let autoplay = self.autoplay;
                self.load_current(autoplay);
                if !position.is_zero() {
                    self.pending_seek = Some(position);
                }
            }
            RecoveryResult::Skip(message) => {
                self.last_error = Some(message);
                self.advance(AdvanceReason::Skip, true);
            }
            RecoveryResult::Failed(message) => {
                log::log!(error.severity().log_level(), "{}", message);
                self.unload("track unavailable");
                self.last_error = Some(error.user_message());
            }
        }
    }

    fn on_lazy_batch(&mut self, epoch: u64, purpose: LazyFetch, result: Result<Vec<Track>, SourceError>) {
        let Some(lazy) = self.lazy.as_mut().filter(|lazy| lazy.epoch() == epoch) else {
            debug!("Dropping stale lazy batch (epoch {})", epoch);
            return;
        };

        match purpose {
            LazyFetch::Initial => {
                lazy.finish_fetch();
                let first = match result {
                    Ok(tracks) => {
                        lazy.store(tracks);
                        lazy.cached_at(0).ok_or_else(|| SourceError::NotFound {
                            id: lazy.id_at(0).cloned().unwrap_or_else(|| TrackId::new("")),
                        })
                    }
                    Err(err) => Err(err),
                };

                match first {
                    Ok(track) => {
                        lazy.commit(0, track.clone());
                        self.logger.log_track_changed(None, &track);
                        self.load_current(true);
                        self.prefetch();
                    }
                    Err(err) => {
                        warn!("Lazy queue could not start: {}", err);
                        self.drop_lazy_queue();
                        self.unload("lazy queue failed");
                        self.last_error = Some(err.user_message());
                    }
                }
            }
            LazyFetch::Jump { index, autoplay } => {
                lazy.finish_fetch();
                let resolved = match result {
                    Ok(tracks) => {
                        lazy.store(tracks);
                        lazy.cached_at(index).ok_or_else(|| SourceError::NotFound {
                            id: lazy.id_at(index).cloned().unwrap_or_else(|| TrackId::new("")),
                        })
                    }
                    Err(err) => Err(err),
                };

                match resolved {
                    Ok(track) => self.lazy_commit(index, track, autoplay),
                    Err(err) => {
                        warn!("Lazy advance failed: {}", err);
                        self.last_error = Some(err.user_message());
                    }
                }
            }
            LazyFetch::Prefetch => match result {
                Ok(tracks) => {
                    trace!("Prefetched {} records", tracks.len());
                    lazy.store(tracks);
                }
                Err(err) => debug!("Prefetch failed: {}", err),
            },
        }
    }

    fn on_lazy_order(&mut self, epoch: u64, shuffle: bool, result: Result<Vec<TrackId>, SourceError>) {
        if self.pending_order != Some(epoch) {
            debug!("Dropping stale lazy order (epoch {})", epoch);
            return;
        }
        self.pending_order = None;
        let Some(lazy) = self.lazy.as_mut() else {
            return;
        };

        match result {
            Ok(ids) => {
                info!("Lazy queue re-ordered ({} ids, shuffle {})", ids.len(), shuffle);
                lazy.replace_order(ids, epoch);
                self.revalidate_session();
                self.prefetch();
            }
            Err(err) => {
                warn!("Re-ordering the lazy queue failed: {}", err);
                self.queue.set_shuffle_flag(!shuffle);
                self.last_error = Some(err.user_message());
            }
        }
    }

    // ----- internals -----

    fn next_ticket(&mut self) -> u64 {
        self.load_generation += 1;
        self.load_generation
    }

    /// Resolve and load the current track into the active slot
    fn load_current(&mut self, autoplay: bool) {
        self.cancel_crossfade("track changed");

        let Some(track) = self.current_track().cloned() else {
            self.unload("nothing to play");
            return;
        };

        let ticket = self.next_ticket();
        self.active_ticket = ticket;
        self.phase = TrackPhase::Loading;
        self.autoplay = autoplay;
        self.is_playing = autoplay;
        self.pending_seek = None;
        self.dirty = true;

        self.output.pause(self.active);
        let released = self.output.release(self.active);
        self.revoke(released);
        self.output.set_gain(self.active, 1.0);

        debug!("Loading '{}' into slot {} (ticket {})", track.display_name(), self.active, ticket);
        self.spawn_resolve(ticket, track.id);
    }

    fn play_active(&mut self) {
        match self.output.play(self.active) {
            Ok(()) => {
                self.phase = TrackPhase::Playing;
                self.is_playing = true;
                self.last_error = None;
                if let Some(track) = self.current_track() {
                    self.logger.log_playback_started(track);
                }
            }
            Err(err) => {
                let err = PlayerError::from(err);
                warn!("Could not start slot {}: {}", self.active, err);
                self.is_playing = false;
                self.autoplay = false;
                self.phase = TrackPhase::Paused;
                self.last_error = Some(err.user_message());
            }
        }
    }

    fn restart_current(&mut self) {
        match self.phase {
            TrackPhase::Unloaded | TrackPhase::Ended | TrackPhase::Loading => self.load_current(true),
            _ => {
                self.cancel_crossfade("restart");
                let from = self.output.position(self.active);
                match self.output.seek(self.active, Duration::ZERO) {
                    Ok(()) => self.logger.log_seek_operation(from, Duration::ZERO),
                    Err(err) => warn!("Restart failed: {}", err),
                }
            }
        }
    }

    /// Move forward in whichever queue is active; stops at the end
    fn advance(&mut self, reason: AdvanceReason, autoplay: bool) {
        if self.lazy.is_some() {
            self.lazy_advance(reason, autoplay);
            return;
        }

        let previous = self.queue.current_track().cloned();
        match self.queue.advance(reason) {
            Some(track) => {
                self.logger.log_track_changed(previous.as_ref(), &track);
                self.load_current(autoplay);
            }
            None => self.stop_at_end(reason),
        }
    }

    fn stop_at_end(&mut self, reason: AdvanceReason) {
        self.cancel_crossfade("end of queue");
        self.output.pause(self.active);
        self.is_playing = false;
        self.autoplay = false;
        self.phase = if reason == AdvanceReason::Natural {
            TrackPhase::Ended
        } else {
            TrackPhase::Paused
        };
        self.logger.log_playback_stopped("end of queue");
    }

    fn lazy_advance(&mut self, reason: AdvanceReason, autoplay: bool) {
        let repeat = self.queue.repeat();
        let Some(lazy) = self.lazy.as_ref() else {
            return;
        };
        match lazy.plan_next(reason, repeat) {
            Some(index) => self.lazy_jump(index, autoplay),
            None => self.stop_at_end(reason),
        }
    }

    /// Move the lazy pointer to `index`, fetching its record first if needed
    fn lazy_jump(&mut self, index: usize, autoplay: bool) {
        let Some(lazy) = self.lazy.as_mut() else {
            return;
        };

        if let Some(track) = lazy.cached_at(index) {
            self.lazy_commit(index, track, autoplay);
            return;
        }

        if !lazy.begin_fetch() {
            debug!("Lazy fetch already in flight; ignoring advance");
            return;
        }
        let Some(id) = lazy.id_at(index).cloned() else {
            lazy.finish_fetch();
            return;
        };
        let epoch = lazy.epoch();
        self.spawn_batch(epoch, LazyFetch::Jump { index, autoplay }, vec![id]);
    }

    fn lazy_commit(&mut self, index: usize, track: Track, autoplay: bool) {
        let Some(lazy) = self.lazy.as_mut() else {
            return;
        };
        let previous = lazy.commit(index, track.clone());
        self.logger.log_track_changed(previous.as_ref(), &track);
        if let Some(previous) = previous {
            self.queue.record_played(previous);
        }
        self.load_current(autoplay);
        self.prefetch();
    }

    fn prefetch(&mut self) {
        let Some(lazy) = self.lazy.as_ref() else {
            return;
        };
        let ids = lazy.uncached_window();
        if ids.is_empty() {
            return;
        }
        let epoch = lazy.epoch();
        self.spawn_batch(epoch, LazyFetch::Prefetch, ids);
    }

    fn request_lazy_order(&mut self, shuffle: bool) {
        let Some(lazy) = self.lazy.as_ref() else {
            return;
        };
        let Some(origin) = lazy.source().filter(|s| s.kind.is_refetchable()).cloned() else {
            debug!("Lazy queue has no re-fetchable source; keeping order");
            return;
        };
        let pinned = lazy.current_id().cloned();

        let epoch = self.next_ticket();
        self.pending_order = Some(epoch);

        let source = Arc::clone(&self.source);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = source
                .ordered_ids(&origin.filters, shuffle, pinned.as_ref())
                .await;
            if events
                .send(EngineEvent::LazyOrder {
                    epoch,
                    shuffle,
                    result,
                })
                .is_err()
            {
                trace!("Engine gone before lazy order arrived");
            }
        });
    }

    fn drop_lazy_queue(&mut self) {
        if self.lazy.take().is_some() {
            debug!("Lazy queue discarded");
        }
        self.pending_order = None;
    }

    /// Release the active slot and forget the loaded track
    fn unload(&mut self, reason: &str) {
        self.cancel_crossfade(reason);
        self.active_ticket = self.next_ticket();
        self.output.pause(self.active);
        let released = self.output.release(self.active);
        self.revoke(released);
        if self.is_playing {
            self.logger.log_playback_stopped(reason);
        }
        self.is_playing = false;
        self.autoplay = false;
        self.pending_seek = None;
        self.phase = TrackPhase::Unloaded;
    }

    /// What a natural advance would play, when it is worth preloading
    fn next_target(&self) -> Option<(Track, CrossfadeTarget)> {
        let repeat = self.queue.repeat();
        if let Some(lazy) = &self.lazy {
            let index = lazy.plan_next(AdvanceReason::Natural, repeat)?;
            if index == lazy.pointer() {
                return None;
            }
            let id = lazy.id_at(index)?.clone();
            let track = lazy.cache().peek(&id)?.clone();
            return Some((track, CrossfadeTarget::Lazy { index, id }));
        }

        let plan = self.queue.plan_advance(AdvanceReason::Natural)?;
        if !plan.wrapped && Some(plan.index) == self.queue.current_index() {
            return None;
        }
        let item = self.queue.items().get(plan.index)?;
        Some((
            item.track.clone(),
            CrossfadeTarget::Queue {
                plan,
                queue_id: item.queue_id,
            },
        ))
    }

    fn begin_preload(&mut self, remaining: Duration) {
        let Some((track, target)) = self.next_target() else {
            return;
        };
        let ticket = self.next_ticket();
        let incoming = self.active.other();
        let id = track.id.clone();
        self.crossfade
            .begin_preload(incoming, ticket, track, target, remaining);
        self.spawn_resolve(ticket, id);
    }

    fn start_crossfade(&mut self, now: Instant) {
        let Some(from) = self.current_track().map(|track| track.id.clone()) else {
            return;
        };
        if let Err(err) = self
            .crossfade
            .start(&mut self.output, self.active, &from, now)
        {
            warn!("Crossfade could not start: {}", err);
            let released = self.crossfade.on_preload_failed(
                &mut self.output,
                self.active,
                self.active_ticket,
                &err.to_string(),
            );
            self.revoke(released);
        }
    }

    /// Swap slot roles after a finished crossfade and move the queue along
    fn complete_handoff(&mut self, done: CompletedHandoff) {
        self.revoke(done.released);
        let session = done.session;
        let previous = self.current_track().cloned();
        if let Some(track) = &previous {
            self.errors.record_success(&track.id);
        }

        self.active = session.incoming;
        self.active_ticket = session.ticket;
        self.pending_seek = None;
        self.dirty = true;

        match session.target {
            CrossfadeTarget::Queue { plan, queue_id } => {
                let index = self
                    .queue
                    .items()
                    .iter()
                    .position(|item| item.queue_id == queue_id);
                match index {
                    Some(index) => {
                        self.queue.commit(PlannedAdvance {
                            index,
                            wrapped: plan.wrapped,
                        });
                    }
                    None => warn!("Crossfade target left the queue"),
                }
            }
            CrossfadeTarget::Lazy { index, id } => {
                if let Some(lazy) = self.lazy.as_mut() {
                    if lazy.id_at(index) == Some(&id) {
                        if let Some(left) = lazy.commit(index, session.track.clone()) {
                            self.queue.record_played(left);
                        }
                    }
                }
                self.prefetch();
            }
        }
        self.logger.log_track_changed(previous.as_ref(), &session.track);

        if self.output.is_playing(self.active) {
            self.phase = TrackPhase::Playing;
            self.is_playing = true;
        } else {
            self.play_active();
        }
    }

    fn cancel_crossfade(&mut self, reason: &str) {
        let released = self.crossfade.cancel(&mut self.output, self.active, reason);
        self.revoke(released);
    }

    /// Keep or drop the crossfade session after the queue changed under it
    fn revalidate_session(&mut self) {
        let Some(current) = self.crossfade.session().map(|s| s.target.clone()) else {
            return;
        };

        let still_next = match (self.next_target(), &current) {
            (
                Some((_, CrossfadeTarget::Queue { plan, queue_id })),
                CrossfadeTarget::Queue { queue_id: old, .. },
            ) if queue_id == *old => Some(CrossfadeTarget::Queue { plan, queue_id }),
            (Some((_, CrossfadeTarget::Lazy { index, id })), CrossfadeTarget::Lazy { id: old, .. })
                if id == *old =>
            {
                Some(CrossfadeTarget::Lazy { index, id })
            }
            _ => None,
        };

        match still_next {
            Some(target) => self.crossfade.retarget(target),
            None => self.cancel_crossfade("next track changed"),
        }
    }

    fn apply_output_mode(&mut self) {
        let target = self.output.desired_mode();
        if target == self.output.mode() {
            return;
        }

        self.cancel_crossfade("output mode change");
        if let Err(err) = self
            .output
            .switch_to(target, self.active, self.active_ticket)
        {
            self.last_error = Some(PlayerError::from(err).user_message());
        }
    }

    fn spawn_resolve(&self, ticket: u64, track_id: TrackId) {
        let source = Arc::clone(&self.source);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = source.resolve(&track_id).await;
            if events
                .send(EngineEvent::SourceResolved {
                    ticket,
                    track_id,
                    result,
                })
                .is_err()
            {
                trace!("Engine gone before resolution finished");
            }
        });
    }

    fn spawn_batch(&self, epoch: u64, purpose: LazyFetch, ids: Vec<TrackId>) {
        let source = Arc::clone(&self.source);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = source.resolve_batch(&ids).await;
            if events
                .send(EngineEvent::LazyBatch {
                    epoch,
                    purpose,
                    result,
                })
                .is_err()
            {
                trace!("Engine gone before lazy batch arrived");
            }
        });
    }

    fn revoke(&self, released: impl IntoIterator<Item = StreamSource>) {
        for stream in released {
            if stream.is_local_cache {
                self.source.revoke(&stream);
            }
        }
    }
}
