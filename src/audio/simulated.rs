use crate::audio::{ElementFactory, MediaElement, PositionTracker, SlotId, SlotSignal, SlotSignalKind};
use crate::error::SurfaceError;
use crate::models::{OutputMode, StreamSource};
use crate::playback::events::EngineEvent;
use crate::source::LibraryManifest;
use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// How a simulated stream behaves once loaded
#[derive(Debug, Clone, PartialEq)]
pub struct MediaProfile {
    pub duration: Duration,
    pub ready_latency: Duration,
    /// Report this failure instead of becoming ready
    pub fail_load: Option<String>,
}

impl MediaProfile {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            ready_latency: Duration::from_millis(20),
            fail_load: None,
        }
    }

    pub fn with_ready_latency(mut self, latency: Duration) -> Self {
        self.ready_latency = latency;
        self
    }

    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail_load = Some(reason.into());
        self
    }
}

/// Catalog of simulated streams, keyed by locator, and the factory for
/// elements that play them
#[derive(Clone)]
pub struct SimulatedMedia {
    catalog: Arc<Mutex<HashMap<String, MediaProfile>>>,
    events: UnboundedSender<EngineEvent>,
}

impl SimulatedMedia {
    pub fn new(events: UnboundedSender<EngineEvent>) -> Self {
        Self {
            catalog: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    pub fn register(&self, locator: impl Into<String>, profile: MediaProfile) {
        if let Ok(mut catalog) = self.catalog.lock() {
            catalog.insert(locator.into(), profile);
        }
    }

    /// Make an already registered stream fail (or recover) on its next load
    pub fn set_failure(&self, locator: &str, failure: Option<String>) {
        if let Ok(mut catalog) = self.catalog.lock() {
            if let Some(profile) = catalog.get_mut(locator) {
                profile.fail_load = failure;
            }
        }
    }

    /// Register every manifest entry at its declared duration
    pub fn register_manifest(&self, manifest: &LibraryManifest) {
        for entry in manifest.entries() {
            self.register(
                entry.locator.clone(),
                MediaProfile::new(Duration::from_secs_f64(entry.duration_secs)),
            );
        }
    }

    pub fn profile(&self, locator: &str) -> Option<MediaProfile> {
        self.catalog
            .lock()
            .ok()
            .and_then(|catalog| catalog.get(locator).cloned())
    }
}

impl ElementFactory for SimulatedMedia {
    fn create(&self, slot: SlotId, mode: OutputMode) -> Box<dyn MediaElement> {
        Box::new(SimulatedElement::new(
            slot,
            mode,
            self.catalog.clone(),
            self.events.clone(),
        ))
    }
}

/// Media element driven by the tokio clock instead of a decoder
pub struct SimulatedElement {
    slot: SlotId,
    mode: OutputMode,
    catalog: Arc<Mutex<HashMap<String, MediaProfile>>>,
    events: UnboundedSender<EngineEvent>,
    ticket: u64,
    source: Option<StreamSource>,
    tracker: PositionTracker,
    volume: f32,
    paused: bool,
    ready_task: Option<JoinHandle<()>>,
    end_task: Option<JoinHandle<()>>,
}

impl SimulatedElement {
    pub fn new(
        slot: SlotId,
        mode: OutputMode,
        catalog: Arc<Mutex<HashMap<String, MediaProfile>>>,
        events: UnboundedSender<EngineEvent>,
    ) -> Self {
        Self {
            slot,
            mode,
            catalog,
            events,
            ticket: 0,
            source: None,
            tracker: PositionTracker::new(),
            volume: 1.0,
            paused: true,
            ready_task: None,
            end_task: None,
        }
    }

    fn signal(&self, kind: SlotSignalKind) -> SlotSignal {
        SlotSignal {
            slot: self.slot,
            mode: self.mode,
            ticket: self.ticket,
            kind,
        }
    }

    fn spawn_signal(&self, after: Duration, kind: SlotSignalKind) -> JoinHandle<()> {
        let events = self.events.clone();
        let signal = self.signal(kind);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if events.send(EngineEvent::Slot(signal)).is_err() {
                trace!("Engine event channel closed; dropping slot signal");
            }
        })
    }

    fn arm_end_timer(&mut self) {
        if let Some(task) = self.end_task.take() {
            task.abort();
        }
        let remaining = self.tracker.remaining();
        self.end_task = Some(self.spawn_signal(remaining, SlotSignalKind::Ended));
    }

    fn cancel_tasks(&mut self) {
        if let Some(task) = self.ready_task.take() {
            task.abort();
        }
        if let Some(task) = self.end_task.take() {
            task.abort();
        }
    }
}

impl MediaElement for SimulatedElement {
    fn set_source(&mut self, source: Option<&StreamSource>, ticket: u64) {
        self.cancel_tasks();
        self.paused = true;
        self.tracker.stop_tracking();
        self.ticket = ticket;
        self.source = source.cloned();

        let Some(source) = source else {
            return;
        };

        let profile = self
            .catalog
            .lock()
            .ok()
            .and_then(|catalog| catalog.get(&source.locator).cloned());

        self.ready_task = Some(match profile {
            Some(profile) => {
                self.tracker.start_tracking(profile.duration);
                let kind = match profile.fail_load {
                    Some(reason) => SlotSignalKind::Failed(reason),
                    None => SlotSignalKind::Ready,
                };
                self.spawn_signal(profile.ready_latency, kind)
            }
            None => self.spawn_signal(
                Duration::ZERO,
                SlotSignalKind::Failed(format!("unknown stream '{}'", source.locator)),
            ),
        });
    }

    fn play(&mut self) -> Result<(), SurfaceError> {
        if self.source.is_none() {
            return Err(SurfaceError::Playback("no stream loaded".to_string()));
        }
        if self.paused {
            self.paused = false;
            self.tracker.resume();
            self.arm_end_timer();
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
        self.tracker.pause();
        if let Some(task) = self.end_task.take() {
            task.abort();
        }
    }

    fn seek(&mut self, position: Duration) -> Result<(), SurfaceError> {
        self.tracker.seek(position)?;
        if !self.paused {
            self.arm_end_timer();
        }
        Ok(())
    }

    fn position(&self) -> Duration {
        self.tracker.current_position()
    }

    fn duration(&self) -> Duration {
        self.tracker.duration()
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        self.volume
    }
}

impl Drop for SimulatedElement {
    fn drop(&mut self) {
        self.cancel_tasks();
    }
}
