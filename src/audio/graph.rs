use crate::audio::{ElementFactory, GainRamp, PlaybackSurface, SlotId, SlotPair};
use crate::error::SurfaceError;
use crate::models::{OutputMode, StreamSource};
use log::{debug, info};
use std::time::Duration;
use tokio::time::Instant;

/// Gain parameter of the processing graph with linear-ramp automation
#[derive(Debug, Clone, PartialEq)]
pub struct GainNode {
    value: f32,
    automation: Option<GainRamp>,
}

impl GainNode {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            automation: None,
        }
    }

    /// Set the value now, dropping scheduled automation
    pub fn set_value(&mut self, value: f32) {
        self.automation = None;
        self.value = value.clamp(0.0, 1.0);
    }

    pub fn linear_ramp_to(&mut self, target: f32, over: Duration, now: Instant) {
        let from = self.value;
        self.automation = Some(GainRamp::new(from, target.clamp(0.0, 1.0), now, over));
        if over.is_zero() {
            self.render(now);
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn value_at(&self, now: Instant) -> f32 {
        self.automation
            .map_or(self.value, |automation| automation.value_at(now))
    }

    pub fn is_automated(&self) -> bool {
        self.automation.is_some()
    }

    pub fn render(&mut self, now: Instant) {
        if let Some(automation) = self.automation {
            self.value = automation.value_at(now);
            if automation.is_complete(now) {
                self.automation = None;
            }
        }
    }
}

/// Slots routed through a shared processing graph.
///
/// Elements run at unity volume; per-slot gain nodes feed one master gain
/// node. The graph can be suspended (host in background), which silences
/// it and refuses playback until resumed.
pub struct GraphSurface {
    slots: SlotPair,
    nodes: [GainNode; 2],
    master: GainNode,
    suspended: bool,
    resume_on_wake: [bool; 2],
}

impl GraphSurface {
    pub fn new(factory: &dyn ElementFactory) -> Self {
        let mut slots = SlotPair::new(factory, OutputMode::Graph);
        slots.element_mut(SlotId::A).set_volume(1.0);
        slots.element_mut(SlotId::B).set_volume(1.0);
        Self {
            slots,
            nodes: [GainNode::new(1.0), GainNode::new(0.0)],
            master: GainNode::new(1.0),
            suspended: false,
            resume_on_wake: [false, false],
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Stop the graph; anything playing is paused and remembered
    pub fn suspend(&mut self) {
        if self.suspended {
            return;
        }
        for slot in [SlotId::A, SlotId::B] {
            let playing = self.slots.is_playing(slot);
            self.resume_on_wake[slot.index()] = playing;
            if playing {
                self.slots.pause(slot);
            }
        }
        self.suspended = true;
        info!("Processing graph suspended");
    }

    pub fn resume(&mut self) -> Result<(), SurfaceError> {
        if !self.suspended {
            return Ok(());
        }
        self.suspended = false;
        info!("Processing graph resumed");
        for slot in [SlotId::A, SlotId::B] {
            if std::mem::take(&mut self.resume_on_wake[slot.index()]) {
                self.slots.play(slot)?;
            }
        }
        Ok(())
    }

    pub fn node(&self, slot: SlotId) -> &GainNode {
        &self.nodes[slot.index()]
    }
}

impl PlaybackSurface for GraphSurface {
    fn mode(&self) -> OutputMode {
        OutputMode::Graph
    }

    fn load(&mut self, slot: SlotId, source: &StreamSource, ticket: u64) -> Result<(), SurfaceError> {
        self.resume_on_wake[slot.index()] = false;
        self.slots.load(slot, source, ticket);
        Ok(())
    }

    fn release(&mut self, slot: SlotId) -> Option<StreamSource> {
        self.resume_on_wake[slot.index()] = false;
        self.slots.release(slot)
    }

    fn play(&mut self, slot: SlotId) -> Result<(), SurfaceError> {
        if self.suspended {
            return Err(SurfaceError::GraphSuspended);
        }
        self.slots.play(slot)
    }

    fn pause(&mut self, slot: SlotId) {
        self.resume_on_wake[slot.index()] = false;
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
        self.nodes[slot.index()].set_value(gain);
    }

    fn gain(&self, slot: SlotId) -> f32 {
        self.nodes[slot.index()].value()
    }

    fn ramp_gain(&mut self, slot: SlotId, target: f32, over: Duration, now: Instant) {
        debug!(
            "Scheduling gain ramp on slot {} to {:.2} over {}ms",
            slot,
            target,
            over.as_millis()
        );
        self.nodes[slot.index()].linear_ramp_to(target, over, now);
    }

    fn is_ramping(&self) -> bool {
        self.nodes.iter().any(GainNode::is_automated)
    }

    fn advance(&mut self, now: Instant) {
        for node in self.nodes.iter_mut() {
            node.render(now);
        }
        self.master.render(now);
    }

    fn set_master_volume(&mut self, volume: f32) {
        self.master.set_value(volume);
    }

    fn master_volume(&self) -> f32 {
        self.master.value()
    }

    fn output_level(&self, slot: SlotId) -> f32 {
        if self.suspended || !self.slots.is_playing(slot) {
            return 0.0;
        }
        let element = self.slots.element(slot).volume();
        element * self.nodes[slot.index()].value() * self.master.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{MediaProfile, SimulatedMedia};
    use tokio::sync::mpsc;

    fn surface() -> (GraphSurface, SimulatedMedia) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let media = SimulatedMedia::new(tx);
        media.register("mem://a", MediaProfile::new(Duration::from_secs(60)));
        (GraphSurface::new(&media), media)
    }

    #[test]
    fn test_gain_node_automation() {
        let start = Instant::now();
        let mut node = GainNode::new(0.0);
        node.linear_ramp_to(1.0, Duration::from_secs(4), start);

        assert!((node.value_at(start + Duration::from_secs(1)) - 0.25).abs() < 1e-6);
        node.render(start + Duration::from_secs(2));
        assert!((node.value() - 0.5).abs() < 1e-6);

        node.set_value(0.3);
        assert!(!node.is_automated());
        assert_eq!(node.value_at(start + Duration::from_secs(9)), 0.3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_pauses_and_resume_replays() {
        let (mut surface, _media) = surface();
        surface
            .load(SlotId::A, &StreamSource::remote("mem://a"), 1)
            .unwrap();
        surface.play(SlotId::A).unwrap();

        surface.suspend();
        assert!(surface.is_suspended());
        assert!(!surface.is_playing(SlotId::A));
        assert_eq!(surface.play(SlotId::A), Err(SurfaceError::GraphSuspended));

        surface.resume().unwrap();
        assert!(surface.is_playing(SlotId::A));
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_level_uses_nodes_and_master() {
        let (mut surface, _media) = surface();
        surface
            .load(SlotId::A, &StreamSource::remote("mem://a"), 1)
            .unwrap();
        surface.play(SlotId::A).unwrap();
        surface.set_master_volume(0.8);
        surface.set_gain(SlotId::A, 0.5);

        assert!((surface.output_level(SlotId::A) - 0.4).abs() < 1e-6);
    }
}
