use crate::mode_switch::ModeSwitchScheduler;
use crate::registry::StreamRegistry;
use crate::scheduler::{PlaybackScheduler, TickReport};
use crate::sink::{DisplaySink, TracingSink, TransportView, WarningSink};
use crate::timeline::{TimelineState, TimelineSynchronizer};
use quadview_common::{OpenError, PlayLabel, SlotKey, ViewMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Timer that fired in `TransportController::next_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    PlaybackTick,
    ModeSwitch,
}

/// Point-in-time view of the player for callers outside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub timeline: TimelineState,
    pub playing: bool,
    pub active_mode: ViewMode,
    pub valid_slots: Vec<SlotKey>,
    pub controls_enabled: bool,
    pub tick_interval_ms: u64,
    pub loop_count: u64,
    /// Consecutive ticks without a frame, per slot; healthy slots are absent
    pub stale_slots: BTreeMap<SlotKey, u32>,
}

/// Play/pause/seek entry point.
///
/// Owns the timeline and both schedulers, and is the only writer of the
/// timeline state. All methods run on the engine task.
pub struct TransportController {
    registry: StreamRegistry,
    timeline: TimelineSynchronizer,
    playback: PlaybackScheduler,
    mode_switch: ModeSwitchScheduler,
    display: Box<dyn DisplaySink>,
    warnings: Box<dyn WarningSink>,
    view: Box<dyn TransportView>,
    controls_enabled: bool,
}

impl TransportController {
    pub fn new(
        registry: StreamRegistry,
        timeline: TimelineSynchronizer,
        mode_switch: ModeSwitchScheduler,
    ) -> Self {
        Self {
            registry,
            timeline,
            playback: PlaybackScheduler::new(),
            mode_switch,
            display: Box::new(TracingSink::new()),
            warnings: Box::new(TracingSink::new()),
            view: Box::new(TracingSink::new()),
            controls_enabled: false,
        }
    }

    pub fn with_display(mut self, display: Box<dyn DisplaySink>) -> Self {
        self.display = display;
        self
    }

    pub fn with_warnings(mut self, warnings: Box<dyn WarningSink>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_view(mut self, view: Box<dyn TransportView>) -> Self {
        self.view = view;
        self
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn timeline(&self) -> &TimelineState {
        self.timeline.state()
    }

    pub fn is_playing(&self) -> bool {
        !self.timeline.state().is_paused
    }

    pub fn controls_enabled(&self) -> bool {
        self.controls_enabled
    }

    pub fn active_mode(&self) -> ViewMode {
        self.mode_switch.active_mode()
    }

    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    pub fn mode_switch(&self) -> &ModeSwitchScheduler {
        &self.mode_switch
    }

    /// Load `path` into `slot`. A failure is reported to the warning sink and
    /// leaves every slot as it was.
    pub async fn open_source(&mut self, slot: &SlotKey, path: &Path) -> Result<(), OpenError> {
        if let Err(e) = self.registry.open(slot, path).await {
            self.warnings.warn(&e.to_string());
            return Err(e);
        }
        self.on_sources_changed().await;
        Ok(())
    }

    /// Re-derive the timeline after the slot set changed and park at frame 0, paused.
    pub async fn on_sources_changed(&mut self) {
        self.playback.stop();
        self.mode_switch.disarm();
        self.playback.reset_staleness();

        if self.timeline.recompute(&self.registry) {
            self.warnings.warn(
                "One or more videos report an unreadable frame count or FPS; \
                 synchronization uses fallback values",
            );
        }

        self.timeline.set_paused(true);
        self.view.set_play_label(PlayLabel::Play);
        self.view
            .set_seek_range(self.timeline.state().total_frames.saturating_sub(1));

        self.timeline.seek(&mut self.registry, 0);
        self.display_current_frame().await;
        self.view.set_seek_position(0);
        self.view.set_elapsed(self.timeline.elapsed());

        self.controls_enabled = self.registry.all_slots_filled();
        self.view.set_controls_enabled(self.controls_enabled);

        info!(
            "Sources changed: valid={:?}, controls_enabled={}",
            self.registry.valid_slots(),
            self.controls_enabled
        );
    }

    /// Returns whether playback is running afterwards.
    pub fn toggle_play_pause(&mut self) -> bool {
        if !self.controls_enabled {
            debug!("Play/pause ignored: not every slot has a source");
            return self.is_playing();
        }

        if self.timeline.state().is_paused {
            self.timeline.set_paused(false);
            self.view.show_mode(ViewMode::Primary);
            self.playback.start(self.timeline.state().fps);
            self.mode_switch.arm();
            self.view.set_play_label(PlayLabel::Pause);
            info!("Playback started at frame {}", self.timeline.state().current_frame);
        } else {
            self.timeline.set_paused(true);
            self.playback.stop();
            self.mode_switch.disarm();
            self.view.set_play_label(PlayLabel::Play);
            info!("Playback paused at frame {}", self.timeline.state().current_frame);
        }

        self.is_playing()
    }

    /// Move every slot to `position`. While paused the new frame is decoded
    /// and shown immediately; while running the next tick picks it up.
    pub async fn seek_to(&mut self, position: i64) -> u64 {
        if !self.controls_enabled {
            debug!("Seek ignored: not every slot has a source");
            return self.timeline.state().current_frame;
        }

        let frame = self.timeline.seek(&mut self.registry, position);
        if self.timeline.state().is_paused {
            self.display_current_frame().await;
            self.view.set_seek_position(frame);
            self.view.set_elapsed(self.timeline.elapsed());
        }
        frame
    }

    /// One-shot read of the frame under every cursor.
    async fn display_current_frame(&mut self) {
        for (key, decoder) in self.registry.valid_decoders_mut() {
            match decoder.read_next().await {
                Ok(Some(frame)) => self.display.show(key, &frame),
                Ok(None) => debug!("Slot {} has no frame at the cursor", key),
                Err(e) => debug!("Slot {} decode failed: {}", key, e),
            }
        }
    }

    pub async fn handle_tick(&mut self) -> TickReport {
        let report = self
            .playback
            .tick(&mut self.timeline, &mut self.registry, self.display.as_mut())
            .await;
        self.view.set_seek_position(report.frame);
        self.view.set_elapsed(self.timeline.elapsed());
        report
    }

    pub fn handle_mode_fire(&mut self) -> ViewMode {
        let mode = self.mode_switch.fire();
        self.view.show_mode(mode);
        mode
    }

    /// Wait for whichever scheduler fires next. Pends forever while both are stopped.
    pub async fn next_event(&mut self) -> SchedulerEvent {
        tokio::select! {
            _ = self.playback.wait_tick() => SchedulerEvent::PlaybackTick,
            _ = self.mode_switch.wait_fire() => SchedulerEvent::ModeSwitch,
        }
    }

    pub async fn handle_event(&mut self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::PlaybackTick => {
                self.handle_tick().await;
            }
            SchedulerEvent::ModeSwitch => {
                self.handle_mode_fire();
            }
        }
    }

    pub fn status(&self) -> PlayerStatus {
        PlayerStatus {
            timeline: self.timeline.state().clone(),
            playing: self.is_playing(),
            active_mode: self.mode_switch.active_mode(),
            valid_slots: self.registry.valid_slots(),
            controls_enabled: self.controls_enabled,
            tick_interval_ms: self.playback.period().as_millis() as u64,
            loop_count: self.playback.loop_count(),
            stale_slots: self.playback.staleness().clone(),
        }
    }

    /// Stop both schedulers and release every decoder.
    pub fn shutdown(&mut self) {
        self.playback.stop();
        self.mode_switch.disarm();
        self.timeline.set_paused(true);
        self.registry.release_all();
        self.controls_enabled = false;
        info!("Transport shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::mock::{MockBackend, MockSource};
    use crate::sink::recording::RecordingSink;
    use quadview_common::default_slot_keys;
    use std::sync::Arc;
    use std::time::Duration;

    fn controller(backend: &Arc<MockBackend>, sink: &RecordingSink) -> TransportController {
        let registry = StreamRegistry::new(default_slot_keys(), backend.clone());
        TransportController::new(
            registry,
            TimelineSynchronizer::default(),
            ModeSwitchScheduler::new(Duration::from_secs(30), Duration::from_secs(8)),
        )
        .with_display(Box::new(sink.clone()))
        .with_warnings(Box::new(sink.clone()))
        .with_view(Box::new(sink.clone()))
    }

    async fn loaded(source: MockSource) -> (Arc<MockBackend>, RecordingSink, TransportController) {
        let backend = Arc::new(MockBackend::new().with_source("clip.mp4", source));
        let sink = RecordingSink::new();
        let mut transport = controller(&backend, &sink);
        for key in default_slot_keys() {
            transport.open_source(&key, Path::new("clip.mp4")).await.unwrap();
        }
        (backend, sink, transport)
    }

    #[tokio::test]
    async fn test_all_sources_enable_controls() {
        let (_backend, sink, transport) = loaded(MockSource::new(300, 30.0)).await;

        assert!(transport.controls_enabled());
        assert_eq!(sink.last_controls_enabled(), Some(true));
        assert_eq!(sink.last_label(), Some(PlayLabel::Play));
        assert_eq!(transport.timeline().total_frames, 300);
        assert_eq!(sink.recorded.lock().unwrap().seek_ranges.last(), Some(&299));

        // The last reload re-displayed frame 0 on every slot
        let frames = sink.frames();
        let tail: Vec<u64> = frames[frames.len() - 4..].iter().map(|(_, i)| *i).collect();
        assert_eq!(tail, vec![0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_partial_load_keeps_controls_disabled() {
        let backend = Arc::new(MockBackend::new().with_source("clip.mp4", MockSource::new(50, 30.0)));
        let sink = RecordingSink::new();
        let mut transport = controller(&backend, &sink);

        transport
            .open_source(&SlotKey::from("A1"), Path::new("clip.mp4"))
            .await
            .unwrap();

        assert!(!transport.controls_enabled());
        assert!(!transport.toggle_play_pause());
        assert!(!transport.playback().is_running());
        assert_eq!(transport.seek_to(10).await, 0);
    }

    #[tokio::test]
    async fn test_unopenable_source_warns() {
        let backend = Arc::new(MockBackend::new());
        let sink = RecordingSink::new();
        let mut transport = controller(&backend, &sink);

        let result = transport
            .open_source(&SlotKey::from("A1"), Path::new("broken.avi"))
            .await;

        assert!(result.is_err());
        assert_eq!(sink.warnings().len(), 1);
        assert!(sink.warnings()[0].contains("broken.avi"));
    }

    #[tokio::test]
    async fn test_degraded_metadata_warns_once_per_recompute() {
        let backend = Arc::new(MockBackend::new().with_source("bad.mov", MockSource::unreadable()));
        let sink = RecordingSink::new();
        let mut transport = controller(&backend, &sink);

        transport
            .open_source(&SlotKey::from("A1"), Path::new("bad.mov"))
            .await
            .unwrap();

        assert_eq!(sink.warnings().len(), 1);
        assert_eq!(transport.timeline().total_frames, 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_sources_share_one_timeline() {
        let backend = Arc::new(
            MockBackend::new()
                .with_source("a.mp4", MockSource::new(100, 30.0))
                .with_source("b.mp4", MockSource::new(150, 25.0))
                .with_source("c.mp4", MockSource::new(80, 30.0))
                .with_source("d.mp4", MockSource::unreadable()),
        );
        let sink = RecordingSink::new();
        let mut transport = controller(&backend, &sink);

        for (key, path) in [("A1", "a.mp4"), ("A2", "b.mp4"), ("B1", "c.mp4"), ("B2", "d.mp4")] {
            transport
                .open_source(&SlotKey::from(key), Path::new(path))
                .await
                .unwrap();
        }

        assert_eq!(sink.warnings().len(), 1);
        assert!(transport.controls_enabled());
        assert_eq!(transport.timeline().total_frames, 150);
        assert_eq!(transport.timeline().fps, 25.0);

        assert!(transport.toggle_play_pause());
        assert_eq!(transport.seek_to(149).await, 149);
        let report = transport.handle_tick().await;

        assert!(report.looped);
        assert_eq!(report.frame, 0);
        assert_eq!(transport.timeline().current_frame, 0);
        assert_eq!(sink.warnings().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_and_pause_drive_both_schedulers() {
        let (_backend, sink, mut transport) = loaded(MockSource::new(300, 30.0)).await;

        assert!(transport.toggle_play_pause());
        assert!(transport.playback().is_running());
        assert!(transport.mode_switch().is_armed());
        assert_eq!(sink.last_label(), Some(PlayLabel::Pause));
        assert_eq!(sink.modes(), vec![ViewMode::Primary]);

        assert!(!transport.toggle_play_pause());
        assert!(!transport.playback().is_running());
        assert!(!transport.mode_switch().is_armed());
        assert_eq!(sink.last_label(), Some(PlayLabel::Play));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_pause_play_resets_mode_cycle() {
        let (_backend, _sink, mut transport) = loaded(MockSource::new(3000, 30.0)).await;
        transport.toggle_play_pause();

        // Run until the view flips to Secondary
        loop {
            let event = transport.next_event().await;
            transport.handle_event(event).await;
            if event == SchedulerEvent::ModeSwitch {
                break;
            }
        }
        assert_eq!(transport.active_mode(), ViewMode::Secondary);

        transport.toggle_play_pause();
        transport.toggle_play_pause();

        assert!(transport.playback().is_running());
        assert_eq!(transport.active_mode(), ViewMode::Primary);
        assert_eq!(transport.mode_switch().dwell_interval(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_seek_while_paused_displays_target() {
        let (_backend, sink, mut transport) = loaded(MockSource::new(300, 30.0)).await;
        sink.clear_frames();

        assert_eq!(transport.seek_to(120).await, 120);

        let frames = sink.frames();
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|(_, index)| *index == 120));
        assert_eq!(sink.recorded.lock().unwrap().seek_positions.last(), Some(&120));
        // 120 frames @ 30fps
        assert_eq!(sink.recorded.lock().unwrap().elapsed.last().unwrap().seconds, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_while_running_is_positional() {
        let (_backend, sink, mut transport) = loaded(MockSource::new(300, 30.0)).await;
        transport.toggle_play_pause();
        sink.clear_frames();

        assert_eq!(transport.seek_to(1000).await, 299);

        assert!(sink.frames().is_empty());
        assert_eq!(transport.timeline().current_frame, 299);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_loop_ticks_until_mode_switch() {
        let (_backend, _sink, mut transport) = loaded(MockSource::new(3000, 30.0)).await;
        transport.toggle_play_pause();

        let mut ticks = 0;
        loop {
            match transport.next_event().await {
                SchedulerEvent::PlaybackTick => {
                    transport.handle_tick().await;
                    ticks += 1;
                }
                SchedulerEvent::ModeSwitch => break,
            }
        }

        // 30s of 33ms ticks
        assert!((900..=910).contains(&ticks), "ticks = {}", ticks);
        assert_eq!(transport.timeline().current_frame, ticks);
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let (backend, _sink, mut transport) = loaded(MockSource::new(10, 30.0)).await;

        transport.shutdown();
        transport.shutdown();

        assert!(transport.registry().valid_slots().is_empty());
        assert!(!transport.controls_enabled());
        assert_eq!(backend.released().len(), 4);
        assert_eq!(transport.status().valid_slots, Vec::<SlotKey>::new());
    }
}
