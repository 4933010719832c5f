pub mod direct;
pub mod graph;
pub mod output;
pub mod position;
pub mod ramp;
pub mod simulated;

use crate::error::SurfaceError;
use crate::models::{OutputMode, StreamSource};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

pub use direct::DirectSurface;
pub use graph::{GainNode, GraphSurface};
pub use output::OutputModeController;
pub use position::PositionTracker;
pub use ramp::GainRamp;
pub use simulated::{MediaProfile, SimulatedElement, SimulatedMedia};

/// One of the two playback slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SlotId {
    A,
    B,
}

impl SlotId {
    pub fn other(self) -> Self {
        match self {
            SlotId::A => SlotId::B,
            SlotId::B => SlotId::A,
        }
    }

    pub fn index(self) -> usize {
        match self {
            SlotId::A => 0,
            SlotId::B => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotId::A => "A",
            SlotId::B => "B",
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asynchronous report from a media element
#[derive(Debug, Clone, PartialEq)]
pub struct SlotSignal {
    pub slot: SlotId,
    pub mode: OutputMode,
    /// Load generation the element was loaded with
    pub ticket: u64,
    pub kind: SlotSignalKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlotSignalKind {
    Ready,
    Ended,
    Failed(String),
}

/// Platform media element; decoding happens behind this boundary
pub trait MediaElement: Send {
    /// Point the element at a stream (or nothing). Signals carry `ticket`.
    fn set_source(&mut self, source: Option<&StreamSource>, ticket: u64);

    fn play(&mut self) -> Result<(), SurfaceError>;

    fn pause(&mut self);

    fn seek(&mut self, position: Duration) -> Result<(), SurfaceError>;

    fn position(&self) -> Duration;

    fn duration(&self) -> Duration;

    fn is_paused(&self) -> bool;

    fn set_volume(&mut self, volume: f32);

    fn volume(&self) -> f32;
}

/// Builds the element behind each slot of an output mode
pub trait ElementFactory: Send + Sync {
    fn create(&self, slot: SlotId, mode: OutputMode) -> Box<dyn MediaElement>;
}

/// A pair of slots with per-slot gain, wired for one output mode.
///
/// Slot gain is the crossfade gain (active 1.0, inactive 0.0 at rest);
/// master volume is applied on top of it.
pub trait PlaybackSurface: Send {
    fn mode(&self) -> OutputMode;

    fn load(&mut self, slot: SlotId, source: &StreamSource, ticket: u64) -> Result<(), SurfaceError>;

    /// Empty the slot and hand back what it held
    fn release(&mut self, slot: SlotId) -> Option<StreamSource>;

    fn play(&mut self, slot: SlotId) -> Result<(), SurfaceError>;

    fn pause(&mut self, slot: SlotId);

    fn seek(&mut self, slot: SlotId, position: Duration) -> Result<(), SurfaceError>;

    fn position(&self, slot: SlotId) -> Duration;

    fn duration(&self, slot: SlotId) -> Duration;

    fn is_playing(&self, slot: SlotId) -> bool;

    fn source(&self, slot: SlotId) -> Option<&StreamSource>;

    /// Set the slot gain immediately, cancelling any ramp on it
    fn set_gain(&mut self, slot: SlotId, gain: f32);

    fn gain(&self, slot: SlotId) -> f32;

    /// Linear ramp from the current gain to `target` starting at `now`
    fn ramp_gain(&mut self, slot: SlotId, target: f32, over: Duration, now: Instant);

    fn is_ramping(&self) -> bool;

    /// Bring gains up to date with the clock
    fn advance(&mut self, now: Instant);

    fn set_master_volume(&mut self, volume: f32);

    fn master_volume(&self) -> f32;

    /// What the listener hears from this slot: gain times master, zero when silent
    fn output_level(&self, slot: SlotId) -> f32;
}

struct LoadedSlot {
    element: Box<dyn MediaElement>,
    source: Option<StreamSource>,
}

/// The two elements of one output mode and what they are loaded with
pub struct SlotPair {
    mode: OutputMode,
    slots: [LoadedSlot; 2],
}

impl SlotPair {
    pub fn new(factory: &dyn ElementFactory, mode: OutputMode) -> Self {
        let slot = |id| LoadedSlot {
            element: factory.create(id, mode),
            source: None,
        };
        Self {
            mode,
            slots: [slot(SlotId::A), slot(SlotId::B)],
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn load(&mut self, slot: SlotId, source: &StreamSource, ticket: u64) {
        let entry = &mut self.slots[slot.index()];
        entry.element.pause();
        entry.element.set_source(Some(source), ticket);
        entry.source = Some(source.clone());
    }

    pub fn release(&mut self, slot: SlotId) -> Option<StreamSource> {
        let entry = &mut self.slots[slot.index()];
        entry.element.pause();
        entry.element.set_source(None, 0);
        entry.source.take()
    }

    pub fn play(&mut self, slot: SlotId) -> Result<(), SurfaceError> {
        let entry = &mut self.slots[slot.index()];
        if entry.source.is_none() {
            return Err(SurfaceError::EmptySlot { slot });
        }
        entry.element.play()
    }

    pub fn pause(&mut self, slot: SlotId) {
        self.slots[slot.index()].element.pause();
    }

    pub fn seek(&mut self, slot: SlotId, position: Duration) -> Result<(), SurfaceError> {
        let entry = &mut self.slots[slot.index()];
        if entry.source.is_none() {
            return Err(SurfaceError::EmptySlot { slot });
        }
        entry.element.seek(position)
    }

    pub fn position(&self, slot: SlotId) -> Duration {
        self.slots[slot.index()].element.position()
    }

    pub fn duration(&self, slot: SlotId) -> Duration {
        self.slots[slot.index()].element.duration()
    }

    pub fn is_playing(&self, slot: SlotId) -> bool {
        let entry = &self.slots[slot.index()];
        entry.source.is_some() && !entry.element.is_paused()
    }

    pub fn source(&self, slot: SlotId) -> Option<&StreamSource> {
        self.slots[slot.index()].source.as_ref()
    }

    pub fn element_mut(&mut self, slot: SlotId) -> &mut dyn MediaElement {
        self.slots[slot.index()].element.as_mut()
    }

    pub fn element(&self, slot: SlotId) -> &dyn MediaElement {
        self.slots[slot.index()].element.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_id_other() {
        assert_eq!(SlotId::A.other(), SlotId::B);
        assert_eq!(SlotId::B.other(), SlotId::A);
        assert_eq!(SlotId::B.index(), 1);
        assert_eq!(SlotId::A.to_string(), "A");
    }
}
