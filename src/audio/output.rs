use crate::audio::{
    DirectSurface, ElementFactory, GraphSurface, PlaybackSurface, SlotId,
};
use crate::error::SurfaceError;
use crate::logging::EngineLogger;
use crate::models::{OutputMode, StreamSource, Visibility};
use crate::time_operation_with_threshold;
use log::{info, warn};
use std::time::Duration;
use tokio::time::Instant;

const SWITCH_WARN_THRESHOLD: Duration = Duration::from_millis(50);

/// Owns both slot pairs and decides which one is live.
///
/// All transport calls go to the live surface. Switching moves the active
/// track across (source, position, gain, play state) and never changes
/// whether it is playing.
pub struct OutputModeController {
    direct: DirectSurface,
    graph: GraphSurface,
    mode: OutputMode,
    preferred: OutputMode,
    visibility: Visibility,
    graph_features: bool,
    graph_suspends_in_background: bool,
    logger: EngineLogger,
}

impl OutputModeController {
    pub fn new(
        factory: &dyn ElementFactory,
        preferred: OutputMode,
        graph_suspends_in_background: bool,
        logger: EngineLogger,
    ) -> Self {
        Self {
            direct: DirectSurface::new(factory),
            graph: GraphSurface::new(factory),
            mode: preferred,
            preferred,
            visibility: Visibility::Foreground,
            graph_features: false,
            graph_suspends_in_background,
            logger,
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn set_visibility(&mut self, visibility: Visibility) {
        self.visibility = visibility;
    }

    /// Visualization or effects need the processing graph
    pub fn set_graph_features(&mut self, needed: bool) {
        self.graph_features = needed;
    }

    pub fn graph_features(&self) -> bool {
        self.graph_features
    }

    pub fn preferred(&self) -> OutputMode {
        self.preferred
    }

    pub fn set_preferred(&mut self, mode: OutputMode) {
        self.preferred = mode;
    }

    /// Mode the current signals call for
    pub fn desired_mode(&self) -> OutputMode {
        if self.visibility == Visibility::Background && self.graph_suspends_in_background {
            OutputMode::Direct
        } else if self.graph_features {
            OutputMode::Graph
        } else {
            self.preferred
        }
    }

    /// Whether the host suspends the graph in the current visibility
    pub fn graph_must_suspend(&self) -> bool {
        self.visibility == Visibility::Background && self.graph_suspends_in_background
    }

    pub fn graph(&self) -> &GraphSurface {
        &self.graph
    }

    pub fn direct(&self) -> &DirectSurface {
        &self.direct
    }

    pub fn suspend_graph(&mut self) {
        self.graph.suspend();
    }

    pub fn resume_graph(&mut self) -> Result<(), SurfaceError> {
        self.graph.resume()
    }

    /// Move the track in `active` over to `target`'s slot pair.
    ///
    /// On failure the previous mode stays live with its playback state
    /// restored.
    pub fn switch_to(&mut self, target: OutputMode, active: SlotId, ticket: u64) -> Result<(), SurfaceError> {
        if target == self.mode {
            return Ok(());
        }

        let from_mode = self.mode;
        let (from, to): (&mut dyn PlaybackSurface, &mut dyn PlaybackSurface) = match from_mode {
            OutputMode::Graph => (&mut self.graph, &mut self.direct),
            OutputMode::Direct => (&mut self.direct, &mut self.graph),
        };

        let (result, elapsed) = time_operation_with_threshold!(
            format!("switch {} -> {}", from_mode, target),
            SWITCH_WARN_THRESHOLD,
            { transfer(from, to, active, ticket) }
        );

        match result {
            Ok(()) => {
                self.mode = target;
                self.logger.log_mode_switched(from_mode, target, elapsed);
                if elapsed > SWITCH_WARN_THRESHOLD {
                    self.logger.log_performance_warning(
                        &format!("switch {} -> {}", from_mode, target),
                        elapsed,
                        SWITCH_WARN_THRESHOLD,
                    );
                }
                info!("Output switched from {} to {}", from_mode, target);
                Ok(())
            }
            Err(reason) => {
                warn!("Staying in {} output: {}", from_mode, reason);
                Err(SurfaceError::ModeSwitch {
                    from: from_mode,
                    to: target,
                    reason,
                })
            }
        }
    }

    /// Empty every slot of both pairs
    pub fn release_all(&mut self) -> Vec<StreamSource> {
        let mut released = Vec::new();
        for slot in [SlotId::A, SlotId::B] {
            released.extend(self.graph.release(slot));
            released.extend(self.direct.release(slot));
        }
        released
    }

    fn live(&self) -> &dyn PlaybackSurface {
        match self.mode {
            OutputMode::Graph => &self.graph,
            OutputMode::Direct => &self.direct,
        }
    }

    fn live_mut(&mut self) -> &mut dyn PlaybackSurface {
        match self.mode {
            OutputMode::Graph => &mut self.graph,
            OutputMode::Direct => &mut self.direct,
        }
    }
}

fn transfer(
    from: &mut dyn PlaybackSurface,
    to: &mut dyn PlaybackSurface,
    active: SlotId,
    ticket: u64,
) -> Result<(), String> {
    let gain = from.gain(active);
    to.set_gain(active, gain);
    to.set_gain(active.other(), 0.0);

    let Some(source) = from.source(active).cloned() else {
        return Ok(());
    };
    let playing = from.is_playing(active);
    let position = from.position(active);

    from.pause(active);

    if let Err(err) = take_over(to, active, &source, ticket, position, playing) {
        to.release(active);
        if playing {
            if let Err(resume_err) = from.play(active) {
                warn!("Could not resume slot {} after failed switch: {}", active, resume_err);
            }
        }
        return Err(err.to_string());
    }

    // Same stream now lives in the new pair; nothing to revoke
    from.release(active);
    Ok(())
}

fn take_over(
    to: &mut dyn PlaybackSurface,
    active: SlotId,
    source: &StreamSource,
    ticket: u64,
    position: Duration,
    playing: bool,
) -> Result<(), SurfaceError> {
    to.load(active, source, ticket)?;
    to.seek(active, position)?;
    if playing {
        to.play(active)?;
    }
    Ok(())
}

impl PlaybackSurface for OutputModeController {
    fn mode(&self) -> OutputMode {
        self.mode
    }

    fn load(&mut self, slot: SlotId, source: &StreamSource, ticket: u64) -> Result<(), SurfaceError> {
        self.live_mut().load(slot, source, ticket)
    }

    fn release(&mut self, slot: SlotId) -> Option<StreamSource> {
        self.live_mut().release(slot)
    }

    fn play(&mut self, slot: SlotId) -> Result<(), SurfaceError> {
        self.live_mut().play(slot)
    }

    fn pause(&mut self, slot: SlotId) {
        self.live_mut().pause(slot);
    }

    fn seek(&mut self, slot: SlotId, position: Duration) -> Result<(), SurfaceError> {
        self.live_mut().seek(slot, position)
    }

    fn position(&self, slot: SlotId) -> Duration {
        self.live().position(slot)
    }

    fn duration(&self, slot: SlotId) -> Duration {
        self.live().duration(slot)
    }

    fn is_playing(&self, slot: SlotId) -> bool {
        self.live().is_playing(slot)
    }

    fn source(&self, slot: SlotId) -> Option<&StreamSource> {
        self.live().source(slot)
    }

    fn set_gain(&mut self, slot: SlotId, gain: f32) {
        self.live_mut().set_gain(slot, gain);
    }

    fn gain(&self, slot: SlotId) -> f32 {
        self.live().gain(slot)
    }

    fn ramp_gain(&mut self, slot: SlotId, target: f32, over: Duration, now: Instant) {
        self.live_mut().ramp_gain(slot, target, over, now);
    }

    fn is_ramping(&self) -> bool {
        self.live().is_ramping()
    }

    fn advance(&mut self, now: Instant) {
        self.live_mut().advance(now);
    }

    fn set_master_volume(&mut self, volume: f32) {
        self.graph.set_master_volume(volume);
        self.direct.set_master_volume(volume);
    }

    fn master_volume(&self) -> f32 {
        self.live().master_volume()
    }

    fn output_level(&self, slot: SlotId) -> f32 {
        self.live().output_level(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{MediaProfile, SimulatedMedia};
    use tokio::sync::mpsc;
    use tokio::time::advance;

    fn controller(preferred: OutputMode) -> (OutputModeController, SimulatedMedia) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let media = SimulatedMedia::new(tx);
        media.register("mem://track", MediaProfile::new(Duration::from_secs(120)));
        let output = OutputModeController::new(&media, preferred, true, EngineLogger::new());
        (output, media)
    }

    fn start(output: &mut OutputModeController) {
        output
            .load(SlotId::A, &StreamSource::remote("mem://track"), 1)
            .unwrap();
        output.play(SlotId::A).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_preserves_position_and_play_state() {
        let (mut output, _media) = controller(OutputMode::Graph);
        output.set_master_volume(0.7);
        start(&mut output);
        advance(Duration::from_secs(30)).await;

        output.switch_to(OutputMode::Direct, SlotId::A, 1).unwrap();

        assert_eq!(output.mode(), OutputMode::Direct);
        assert!(output.is_playing(SlotId::A));
        assert_eq!(output.position(SlotId::A), Duration::from_secs(30));
        assert_eq!(output.source(SlotId::A).unwrap().locator, "mem://track");
        assert!(output.graph().source(SlotId::A).is_none());
        assert!((output.master_volume() - 0.7).abs() < 1e-6);
        assert!((output.output_level(SlotId::A) - 0.7).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_track_stays_paused_across_switch() {
        let (mut output, _media) = controller(OutputMode::Direct);
        start(&mut output);
        advance(Duration::from_secs(5)).await;
        output.pause(SlotId::A);

        output.switch_to(OutputMode::Graph, SlotId::A, 1).unwrap();
        assert!(!output.is_playing(SlotId::A));
        assert_eq!(output.position(SlotId::A), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_switch_rolls_back() {
        let (mut output, _media) = controller(OutputMode::Direct);
        output.suspend_graph();
        start(&mut output);
        advance(Duration::from_secs(10)).await;

        let err = output.switch_to(OutputMode::Graph, SlotId::A, 1).unwrap_err();
        assert!(matches!(err, SurfaceError::ModeSwitch { .. }));
        assert_eq!(output.mode(), OutputMode::Direct);
        assert!(output.is_playing(SlotId::A));
        assert_eq!(output.position(SlotId::A), Duration::from_secs(10));
        assert!(output.graph().source(SlotId::A).is_none());
    }

    #[test]
    fn test_desired_mode() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let media = SimulatedMedia::new(tx);
        let mut output = OutputModeController::new(&media, OutputMode::Direct, true, EngineLogger::new());
        assert_eq!(output.desired_mode(), OutputMode::Direct);

        output.set_graph_features(true);
        assert_eq!(output.desired_mode(), OutputMode::Graph);

        output.set_visibility(Visibility::Background);
        assert_eq!(output.desired_mode(), OutputMode::Direct);
        assert!(output.graph_must_suspend());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_to_same_mode_is_noop() {
        let (mut output, _media) = controller(OutputMode::Graph);
        start(&mut output);
        output.switch_to(OutputMode::Graph, SlotId::A, 1).unwrap();
        assert!(output.is_playing(SlotId::A));
    }
}
