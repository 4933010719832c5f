use crate::audio::{ElementFactory, GainRamp, PlaybackSurface, SlotId, SlotPair};
use crate::error::SurfaceError;
use crate::models::{OutputMode, StreamSource};
use log::trace;
use std::time::Duration;
use tokio::time::Instant;

/// Slots play straight out of their elements.
///
/// Gain is the element's own volume property (slot gain times master), so
/// ramps are animated by stepping the volume on every `advance`.
pub struct DirectSurface {
    slots: SlotPair,
    gains: [f32; 2],
    ramps: [Option<GainRamp>; 2],
    master: f32,
}

impl DirectSurface {
    pub fn new(factory: &dyn ElementFactory) -> Self {
        let mut surface = Self {
            slots: SlotPair::new(factory, OutputMode::Direct),
            gains: [1.0, 0.0],
            ramps: [None, None],
            master: 1.0,
        };
        surface.apply(SlotId::A);
        surface.apply(SlotId::B);
        surface
    }

    fn apply(&mut self, slot: SlotId) {
        let volume = (self.gains[slot.index()] * self.master).clamp(0.0, 1.0);
        self.slots.element_mut(slot).set_volume(volume);
    }
}

impl PlaybackSurface for DirectSurface {
    fn mode(&self) -> OutputMode {
        OutputMode::Direct
    }

    fn load(&mut self, slot: SlotId, source: &StreamSource, ticket: u64) -> Result<(), SurfaceError> {
        self.slots.load(slot, source, ticket);
        self.apply(slot);
        Ok(())
    }

    fn release(&mut self, slot: SlotId) -> Option<StreamSource> {
        self.slots.release(slot)
    }

    fn play(&mut self, slot: SlotId) -> Result<(), SurfaceError> {
        self.slots.play(slot)
    }

    fn pause(&mut self, slot: SlotId) {
        self.slots.pause(slot);
    }

    fn seek(&mut self, slot: SlotId, position: Duration) -> Result<(), SurfaceError> {
        self.slots.seek(slot, position)
    }

    fn position(&self, slot: SlotId) -> Duration {
        self.slots.position(slot)
    }

    fn duration(&self, slot: SlotId) -> Duration {
        self.slots.duration(slot)
    }

    fn is_playing(&self, slot: SlotId) -> bool {
        self.slots.is_playing(slot)
    }

    fn source(&self, slot: SlotId) -> Option<&StreamSource> {
        self.slots.source(slot)
    }

    fn set_gain(&mut self, slot: SlotId, gain: f32) {
        self.ramps[slot.index()] = None;
        self.gains[slot.index()] = gain.clamp(0.0, 1.0);
        self.apply(slot);
    }

    fn gain(&self, slot: SlotId) -> f32 {
        self.gains[slot.index()]
    }

    fn ramp_gain(&mut self, slot: SlotId, target: f32, over: Duration, now: Instant) {
        if over.is_zero() {
            self.set_gain(slot, target);
            return;
        }
        let from = self.gains[slot.index()];
        self.ramps[slot.index()] = Some(GainRamp::new(from, target.clamp(0.0, 1.0), now, over));
    }

    fn is_ramping(&self) -> bool {
        self.ramps.iter().any(Option::is_some)
    }

    fn advance(&mut self, now: Instant) {
        for slot in [SlotId::A, SlotId::B] {
            let Some(ramp) = self.ramps[slot.index()] else {
                continue;
            };
            self.gains[slot.index()] = ramp.value_at(now);
            if ramp.is_complete(now) {
                self.ramps[slot.index()] = None;
            }
            self.apply(slot);
        }
        trace!("Direct gains A={:.3} B={:.3}", self.gains[0], self.gains[1]);
    }

    fn set_master_volume(&mut self, volume: f32) {
        self.master = volume.clamp(0.0, 1.0);
        self.apply(SlotId::A);
        self.apply(SlotId::B);
    }

    fn master_volume(&self) -> f32 {
        self.master
    }

    fn output_level(&self, slot: SlotId) -> f32 {
        if self.slots.is_playing(slot) {
            self.slots.element(slot).volume()
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{MediaProfile, SimulatedMedia};
    use tokio::sync::mpsc;

    fn surface() -> (DirectSurface, SimulatedMedia) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let media = SimulatedMedia::new(tx);
        media.register("mem://a", MediaProfile::new(Duration::from_secs(60)));
        (DirectSurface::new(&media), media)
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_is_gain_times_master() {
        let (mut surface, _media) = surface();
        surface
            .load(SlotId::A, &StreamSource::remote("mem://a"), 1)
            .unwrap();
        surface.play(SlotId::A).unwrap();

        surface.set_master_volume(0.5);
        assert!((surface.output_level(SlotId::A) - 0.5).abs() < 1e-6);

        surface.set_gain(SlotId::A, 0.5);
        assert!((surface.output_level(SlotId::A) - 0.25).abs() < 1e-6);
        assert_eq!(surface.output_level(SlotId::B), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_is_stepped_by_advance() {
        let (mut surface, _media) = surface();
        let start = Instant::now();
        surface.ramp_gain(SlotId::A, 0.0, Duration::from_secs(2), start);
        assert!(surface.is_ramping());

        surface.advance(start + Duration::from_secs(1));
        assert!((surface.gain(SlotId::A) - 0.5).abs() < 1e-6);

        surface.advance(start + Duration::from_secs(2));
        assert_eq!(surface.gain(SlotId::A), 0.0);
        assert!(!surface.is_ramping());
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_empty_slot_fails() {
        let (mut surface, _media) = surface();
        assert_eq!(
            surface.play(SlotId::B),
            Err(SurfaceError::EmptySlot { slot: SlotId::B })
        );
    }
}
