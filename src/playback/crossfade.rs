use crate::audio::{PlaybackSurface, SlotId};
use crate::config::EngineSettings;
use crate::error::SurfaceError;
use crate::logging::EngineLogger;
use crate::models::{CrossfadeState, QueueId, StreamSource, Track, TrackId};
use crate::playback::events::EngineEvent;
use crate::queue::PlannedAdvance;
use log::{debug, info, trace};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Where the queue goes once the incoming track takes over
#[derive(Debug, Clone, PartialEq)]
pub enum CrossfadeTarget {
    Queue { plan: PlannedAdvance, queue_id: QueueId },
    Lazy { index: usize, id: TrackId },
}

/// One preload/crossfade attempt for a single track boundary
#[derive(Debug)]
pub struct CrossfadeSession {
    pub incoming: SlotId,
    pub ticket: u64,
    pub track: Track,
    pub target: CrossfadeTarget,
    pub ready: bool,
    pub started_at: Option<Instant>,
    timer: Option<JoinHandle<()>>,
}

impl CrossfadeSession {
    fn abort_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Result of a finished handoff
#[derive(Debug)]
pub struct CompletedHandoff {
    pub session: CrossfadeSession,
    /// What the retired slot held, for revocation
    pub released: Option<StreamSource>,
}

/// Drives `idle -> preloading -> crossfading -> idle` for track boundaries.
///
/// Preload and ramp timers are spawned tasks posting back to the engine
/// channel; aborting them plus the ticket check on arrival is the
/// cancellation handle.
pub struct CrossfadeOrchestrator {
    state: CrossfadeState,
    session: Option<CrossfadeSession>,
    duration: Duration,
    preload_lead: Duration,
    preload_timeout: Duration,
    min_remaining: Duration,
    seek_cancel_margin: Duration,
    /// Active ticket whose boundary gave up on crossfading
    failed_boundary: Option<u64>,
    events: UnboundedSender<EngineEvent>,
    logger: EngineLogger,
}

impl CrossfadeOrchestrator {
    pub fn new(
        settings: &EngineSettings,
        events: UnboundedSender<EngineEvent>,
        logger: EngineLogger,
    ) -> Self {
        Self {
            state: CrossfadeState::Idle,
            session: None,
            duration: settings.crossfade,
            preload_lead: settings.preload_lead,
            preload_timeout: settings.preload_timeout,
            min_remaining: settings.min_crossfade_remaining,
            seek_cancel_margin: settings.seek_cancel_margin,
            failed_boundary: None,
            events,
            logger,
        }
    }

    pub fn state(&self) -> CrossfadeState {
        self.state
    }

    pub fn session(&self) -> Option<&CrossfadeSession> {
        self.session.as_ref()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    pub fn is_crossfading(&self) -> bool {
        self.state == CrossfadeState::Crossfading
    }

    pub fn owns_ticket(&self, ticket: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.ticket == ticket)
    }

    pub fn preload_ready(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.ready)
    }

    /// Remaining time has entered the preload window for this boundary
    pub fn should_preload(&self, remaining: Duration, active_ticket: u64) -> bool {
        self.state == CrossfadeState::Idle
            && self.session.is_none()
            && self.failed_boundary != Some(active_ticket)
            && remaining > self.duration
            && remaining <= self.duration + self.preload_lead
    }

    pub fn should_start(&self, remaining: Duration) -> bool {
        self.state == CrossfadeState::Preloading
            && self.preload_ready()
            && remaining <= self.duration
            && remaining > self.min_remaining
    }

    /// A seek that far back leaves the boundary well out of reach
    pub fn should_cancel_for_seek(&self, new_position: Duration, track_duration: Duration) -> bool {
        self.session.is_some()
            && track_duration.saturating_sub(new_position) > self.duration + self.seek_cancel_margin
    }

    /// Open a session and arm the ready timeout; the caller resolves and
    /// loads the stream under `ticket`
    pub fn begin_preload(
        &mut self,
        incoming: SlotId,
        ticket: u64,
        track: Track,
        target: CrossfadeTarget,
        remaining: Duration,
    ) {
        self.logger.log_preload_started(&track, remaining);

        let events = self.events.clone();
        let timeout = self.preload_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if events.send(EngineEvent::PreloadTimeout { ticket }).is_err() {
                trace!("Engine gone before preload timeout fired");
            }
        });

        self.session = Some(CrossfadeSession {
            incoming,
            ticket,
            track,
            target,
            ready: false,
            started_at: None,
            timer: Some(timer),
        });
        self.state = CrossfadeState::Preloading;
    }

    pub fn on_preload_ready(&mut self, ticket: u64) {
        if let Some(session) = self.session.as_mut().filter(|s| s.ticket == ticket) {
            session.abort_timer();
            session.ready = true;
            debug!("Preloaded '{}' into slot {}", session.track.display_name(), session.incoming);
        }
    }

    /// Give up on this boundary; a hard cut at track end takes over.
    /// A failure mid-crossfade restores the outgoing slot to full gain.
    pub fn on_preload_failed(
        &mut self,
        surface: &mut dyn PlaybackSurface,
        active: SlotId,
        active_ticket: u64,
        reason: &str,
    ) -> Option<StreamSource> {
        let mut session = self.session.take()?;
        session.abort_timer();
        if self.state == CrossfadeState::Crossfading {
            surface.set_gain(active, 1.0);
        }
        self.state = CrossfadeState::Idle;
        self.failed_boundary = Some(active_ticket);
        self.logger.log_preload_failed(&session.track.id, reason);
        surface.set_gain(session.incoming, 0.0);
        surface.release(session.incoming)
    }

    pub fn on_timeout(
        &mut self,
        surface: &mut dyn PlaybackSurface,
        active: SlotId,
        ticket: u64,
        active_ticket: u64,
    ) -> Option<StreamSource> {
        let pending = self
            .session
            .as_ref()
            .is_some_and(|s| s.ticket == ticket && !s.ready);
        if !pending {
            return None;
        }
        let reason = SurfaceError::PreloadTimeout {
            seconds: self.preload_timeout.as_secs_f64(),
        };
        self.on_preload_failed(surface, active, active_ticket, &reason.to_string())
    }

    /// Start the incoming slot and ramp both gains
    pub fn start(
        &mut self,
        surface: &mut dyn PlaybackSurface,
        active: SlotId,
        from: &TrackId,
        now: Instant,
    ) -> Result<(), SurfaceError> {
        let duration = self.duration;
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        surface.set_gain(session.incoming, 0.0);
        surface.play(session.incoming)?;
        surface.ramp_gain(active, 0.0, duration, now);
        surface.ramp_gain(session.incoming, 1.0, duration, now);

        let events = self.events.clone();
        let ticket = session.ticket;
        session.abort_timer();
        session.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if events.send(EngineEvent::CrossfadeElapsed { ticket }).is_err() {
                trace!("Engine gone before crossfade finished");
            }
        }));
        session.started_at = Some(now);

        self.state = CrossfadeState::Crossfading;
        self.logger.log_crossfade_started(from, &session.track.id, duration);
        Ok(())
    }

    /// Retire the outgoing slot and hand the session back for the swap.
    ///
    /// Works from any point of the session (a zero-length ramp when the
    /// crossfade never started).
    pub fn finish(
        &mut self,
        surface: &mut dyn PlaybackSurface,
        active: SlotId,
    ) -> Option<CompletedHandoff> {
        let mut session = self.session.take()?;
        session.abort_timer();
        self.state = CrossfadeState::Idle;

        surface.pause(active);
        let released = surface.release(active);
        surface.set_gain(active, 0.0);
        surface.set_gain(session.incoming, 1.0);

        self.logger.log_crossfade_completed(&session.track.id);
        info!(
            "Slot {} now active with '{}'",
            session.incoming,
            session.track.display_name()
        );
        Some(CompletedHandoff { session, released })
    }

    /// Drop the session, leaving the active slot fully audible
    pub fn cancel(
        &mut self,
        surface: &mut dyn PlaybackSurface,
        active: SlotId,
        reason: &str,
    ) -> Option<StreamSource> {
        let mut session = self.session.take()?;
        session.abort_timer();
        self.state = CrossfadeState::Idle;

        surface.set_gain(active, 1.0);
        surface.set_gain(session.incoming, 0.0);
        let released = surface.release(session.incoming);

        self.logger.log_crossfade_cancelled(reason);
        released
    }

    /// Point the session at a shifted target after a queue edit
    pub fn retarget(&mut self, target: CrossfadeTarget) {
        if let Some(session) = self.session.as_mut() {
            session.target = target;
        }
    }
}

impl Drop for CrossfadeOrchestrator {
    fn drop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.abort_timer();
        }
    }
}
