use crate::config::PlayerConfig;
use crate::error::{PersistenceError, PlayerError};
use crate::models::{EngineStats, PlayerSnapshot, QueueListing};
use crate::persistence::{DebouncedSaver, PersistenceService};
use crate::playback::events::{Command, EngineEvent, Request};
use crate::playback::PlaybackController;
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Loop periods of the engine task
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerTiming {
    /// Position polling while playing
    pub poll_interval: Duration,
    /// Gain ramp stepping while crossfading
    pub animation_interval: Duration,
    pub persist_debounce: Duration,
}

impl Default for PlayerTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            animation_interval: Duration::from_millis(50),
            persist_debounce: Duration::from_secs(1),
        }
    }
}

impl From<&PlayerConfig> for PlayerTiming {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            persist_debounce: config.persist_debounce(),
            ..Self::default()
        }
    }
}

/// Handle to a running engine task.
///
/// The controller lives inside a single task; the handle talks to it over
/// channels and reads the published snapshot.
pub struct Player {
    requests: mpsc::UnboundedSender<Request>,
    snapshots: watch::Receiver<PlayerSnapshot>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), PersistenceError>>>,
}

impl Player {
    /// Hydrate the saved session and spawn the engine task
    pub async fn start(
        mut controller: PlaybackController,
        events: mpsc::UnboundedReceiver<EngineEvent>,
        persistence: Arc<dyn PersistenceService>,
        timing: PlayerTiming,
    ) -> Self {
        match persistence.load().await {
            Ok(Some(session)) if !session.is_empty() => {
                info!("Resuming session saved at {}", session.saved_at);
                controller.restore(session);
            }
            Ok(_) => debug!("No saved session to resume"),
            Err(err) => warn!("Ignoring saved session: {}", err),
        }

        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_engine(
            controller,
            events,
            requests_rx,
            shutdown_rx,
            persistence,
            timing,
            snapshot_tx,
        ));

        Self {
            requests: requests_tx,
            snapshots: snapshot_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub async fn send(&self, command: Command) -> Result<(), PlayerError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Command { command, reply })
            .map_err(|_| PlayerError::EngineStopped)?;
        response.await.map_err(|_| PlayerError::EngineStopped)?
    }

    pub async fn listing(&self) -> Result<QueueListing, PlayerError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Listing { reply })
            .map_err(|_| PlayerError::EngineStopped)?;
        response.await.map_err(|_| PlayerError::EngineStopped)
    }

    /// Journal counters, recent journal entries and recovery totals
    pub async fn stats(&self) -> Result<EngineStats, PlayerError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Stats { reply })
            .map_err(|_| PlayerError::EngineStopped)?;
        response.await.map_err(|_| PlayerError::EngineStopped)
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.snapshots.clone()
    }

    /// Stop the engine task, release both slots and flush the session
    pub async fn stop(mut self) -> Result<(), PlayerError> {
        if let Some(shutdown) = self.shutdown.take() {
            if shutdown.send(()).is_err() {
                debug!("Engine task already finished");
            }
        }

        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result.map_err(PlayerError::from),
            Err(err) => {
                error!("Engine task failed: {}", err);
                Err(PlayerError::EngineStopped)
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            if shutdown.send(()).is_err() {
                trace!("Engine task gone before the handle was dropped");
            }
        }
    }
}

async fn run_engine(
    mut controller: PlaybackController,
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
    mut requests: mpsc::UnboundedReceiver<Request>,
    mut shutdown: oneshot::Receiver<()>,
    persistence: Arc<dyn PersistenceService>,
    timing: PlayerTiming,
    snapshots: watch::Sender<PlayerSnapshot>,
) -> Result<(), PersistenceError> {
    let mut poll = tokio::time::interval(timing.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut animation = tokio::time::interval(timing.animation_interval);
    animation.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut saver = DebouncedSaver::new(timing.persist_debounce);

    info!("Playback engine started");

    loop {
        let save_at = saver.deadline();

        tokio::select! {
            _ = &mut shutdown => break,

            Some(request) = requests.recv() => match request {
                Request::Command { command, reply } => {
                    let result = controller.execute(command);
                    if let Err(err) = &result {
                        log::log!(err.severity().log_level(), "Command failed: {}", err);
                    }
                    // Callers read the snapshot as soon as the reply lands
                    snapshots.send_replace(controller.snapshot());
                    if reply.send(result).is_err() {
                        debug!("Command caller went away before the reply");
                    }
                }
                Request::Listing { reply } => {
                    if reply.send(controller.listing()).is_err() {
                        debug!("Listing caller went away before the reply");
                    }
                }
                Request::Stats { reply } => {
                    if reply.send(controller.stats()).is_err() {
                        debug!("Stats caller went away before the reply");
                    }
                }
            },

            Some(event) = events.recv() => controller.handle_event(event),

            _ = poll.tick(), if controller.is_playing() => {
                controller.tick(Instant::now());
            }

            _ = animation.tick(), if controller.is_crossfading() => {
                controller.tick(Instant::now());
            }

            _ = tokio::time::sleep_until(save_at.unwrap_or_else(Instant::now)), if save_at.is_some() => {
                if saver.take_due(Instant::now()) {
                    if let Err(err) = persistence.save(&controller.session()).await {
                        warn!("Session save failed: {}", err);
                    }
                }
            }
        }

        if controller.take_dirty() {
            saver.schedule(Instant::now());
        }
        snapshots.send_replace(controller.snapshot());
    }

    let session = controller.session();
    controller.shutdown();
    snapshots.send_replace(controller.snapshot());
    saver.flush();
    persistence.save(&session).await?;
    info!("Playback engine stopped");
    Ok(())
}
