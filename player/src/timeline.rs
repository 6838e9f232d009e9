use crate::registry::StreamRegistry;
use quadview_common::Elapsed;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Shared playback position across every valid slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineState {
    pub total_frames: u64,
    pub fps: f64,
    pub current_frame: u64,
    pub is_paused: bool,
}

impl Default for TimelineState {
    fn default() -> Self {
        Self {
            total_frames: 1,
            fps: 30.0,
            current_frame: 0,
            is_paused: true,
        }
    }
}

/// Values substituted when a source reports unusable metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineDefaults {
    pub fallback_frame_count: u64,
    pub default_fps: f64,
}

impl Default for TimelineDefaults {
    fn default() -> Self {
        Self {
            fallback_frame_count: 3000,
            default_fps: 30.0,
        }
    }
}

/// Derives one `(total_frames, fps)` pair from all valid slots and moves
/// every decoder cursor in lock-step.
pub struct TimelineSynchronizer {
    state: TimelineState,
    defaults: TimelineDefaults,
}

impl TimelineSynchronizer {
    pub fn new(defaults: TimelineDefaults) -> Self {
        Self {
            state: TimelineState {
                fps: defaults.default_fps.max(1.0),
                ..TimelineState::default()
            },
            defaults,
        }
    }

    pub fn state(&self) -> &TimelineState {
        &self.state
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.state.is_paused = paused;
    }

    /// Recompute `total_frames` and `fps` from the valid slots.
    ///
    /// Returns `true` when at least one slot had an unreadable frame count or
    /// fps. Such a slot never drives the maximum: it is treated as if it
    /// reported the healthy maximum (or the fallback count when no slot is
    /// healthy). With no valid slot this is a no-op.
    pub fn recompute(&mut self, registry: &StreamRegistry) -> bool {
        let metadata: Vec<_> = registry
            .valid_decoders()
            .map(|(key, decoder)| (key.clone(), decoder.frame_count(), decoder.fps()))
            .collect();

        if metadata.is_empty() {
            debug!("No valid slots, timeline left unchanged");
            return false;
        }

        let mut total_frames = 0u64;
        let mut fps = self.defaults.default_fps;
        let mut degraded = false;

        for (key, frames, slot_fps) in &metadata {
            match (frames, slot_fps) {
                (Some(frames), Some(slot_fps)) if *frames > 0 && *slot_fps > 0.0 => {
                    if *frames > total_frames {
                        total_frames = *frames;
                        fps = *slot_fps;
                    }
                }
                _ => {
                    warn!(
                        "Slot {} reports unusable metadata (frames={:?}, fps={:?})",
                        key, frames, slot_fps
                    );
                    degraded = true;
                }
            }
        }

        if total_frames == 0 {
            // Every slot is degraded
            total_frames = self.defaults.fallback_frame_count;
        }

        self.state.total_frames = total_frames.max(1);
        self.state.fps = fps.max(1.0);
        self.state.current_frame = self.state.current_frame.min(self.state.total_frames - 1);

        info!(
            "Timeline synchronized: {} slot(s), total_frames={}, fps={:.2}, degraded={}",
            metadata.len(),
            self.state.total_frames,
            self.state.fps,
            degraded
        );
        degraded
    }

    /// Clamp `frame_idx` into range and park every valid decoder there.
    pub fn seek(&mut self, registry: &mut StreamRegistry, frame_idx: i64) -> u64 {
        let last = self.state.total_frames.saturating_sub(1);
        let target = frame_idx.clamp(0, last.min(i64::MAX as u64) as i64) as u64;

        for (_, decoder) in registry.valid_decoders_mut() {
            decoder.seek(target);
        }
        self.state.current_frame = target;

        debug!("Seek to frame {} (requested {})", target, frame_idx);
        target
    }

    /// Step forward one frame. Reaching `total_frames` seeks back to zero
    /// instead and reports `true`.
    pub fn advance_one(&mut self, registry: &mut StreamRegistry) -> bool {
        let next = self.state.current_frame + 1;
        if next >= self.state.total_frames {
            self.seek(registry, 0);
            debug!("End of timeline reached, looped to frame 0");
            return true;
        }
        self.state.current_frame = next;
        false
    }

    pub fn elapsed(&self) -> Elapsed {
        Elapsed::from_frame(self.state.current_frame, self.state.fps)
    }
}

impl Default for TimelineSynchronizer {
    fn default() -> Self {
        Self::new(TimelineDefaults::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::mock::{MockBackend, MockSource};
    use proptest::prelude::*;
    use quadview_common::default_slot_keys;
    use std::path::Path;
    use std::sync::Arc;

    async fn registry_from(sources: Vec<MockSource>) -> (Arc<MockBackend>, StreamRegistry) {
        let mut backend = MockBackend::new();
        for (i, source) in sources.iter().enumerate() {
            backend = backend.with_source(&format!("{}.mp4", i), source.clone());
        }
        let backend = Arc::new(backend);
        let mut registry = StreamRegistry::new(default_slot_keys(), backend.clone());
        let keys = default_slot_keys();
        for i in 0..sources.len() {
            registry
                .open(&keys[i], Path::new(&format!("{}.mp4", i)))
                .await
                .unwrap();
        }
        (backend, registry)
    }

    fn positions(registry: &StreamRegistry) -> Vec<u64> {
        registry
            .valid_decoders()
            .map(|(_, decoder)| decoder.position())
            .collect()
    }

    #[tokio::test]
    async fn test_mixed_metadata_scenario() {
        let (_backend, mut registry) = registry_from(vec![
            MockSource::new(100, 30.0),
            MockSource::new(150, 25.0),
            MockSource::new(80, 30.0),
            MockSource::unreadable(),
        ])
        .await;
        let mut timeline = TimelineSynchronizer::default();

        let degraded = timeline.recompute(&registry);

        assert!(degraded);
        assert_eq!(timeline.state().total_frames, 150);
        assert_eq!(timeline.state().fps, 25.0);

        assert_eq!(timeline.seek(&mut registry, 149), 149);
        assert!(timeline.advance_one(&mut registry));
        assert_eq!(timeline.state().current_frame, 0);
        assert_eq!(positions(&registry), vec![0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_degraded_slot_first_does_not_drive_max() {
        let (_backend, registry) =
            registry_from(vec![MockSource::unreadable(), MockSource::new(100, 24.0)]).await;
        let mut timeline = TimelineSynchronizer::default();

        assert!(timeline.recompute(&registry));
        assert_eq!(timeline.state().total_frames, 100);
        assert_eq!(timeline.state().fps, 24.0);
    }

    #[tokio::test]
    async fn test_all_degraded_uses_fallback() {
        let (_backend, registry) = registry_from(vec![MockSource::unreadable()]).await;
        let mut timeline = TimelineSynchronizer::default();

        assert!(timeline.recompute(&registry));
        assert_eq!(timeline.state().total_frames, 3000);
        assert_eq!(timeline.state().fps, 30.0);
    }

    #[tokio::test]
    async fn test_fps_clamped_to_one() {
        let (_backend, registry) = registry_from(vec![MockSource::new(50, 0.5)]).await;
        let mut timeline = TimelineSynchronizer::default();

        assert!(!timeline.recompute(&registry));
        assert_eq!(timeline.state().fps, 1.0);
    }

    #[tokio::test]
    async fn test_recompute_without_slots_is_noop() {
        let (_backend, registry) = registry_from(vec![]).await;
        let mut timeline = TimelineSynchronizer::default();
        let before = timeline.state().clone();

        assert!(!timeline.recompute(&registry));
        assert_eq!(timeline.state(), &before);
    }

    #[tokio::test]
    async fn test_seek_clamps_and_is_idempotent() {
        let (backend, mut registry) =
            registry_from(vec![MockSource::new(60, 30.0), MockSource::new(40, 30.0)]).await;
        let mut timeline = TimelineSynchronizer::default();
        timeline.recompute(&registry);

        assert_eq!(timeline.seek(&mut registry, 500), 59);
        assert_eq!(timeline.seek(&mut registry, -3), 0);

        timeline.seek(&mut registry, 17);
        let first = positions(&registry);
        timeline.seek(&mut registry, 17);
        assert_eq!(positions(&registry), first);
        assert_eq!(first, vec![17, 17]);
        // Seeking never decodes
        assert!(backend.reads_for("0.mp4").is_empty());
    }

    #[tokio::test]
    async fn test_advance_loops_exactly_once_per_cycle() {
        let (_backend, mut registry) = registry_from(vec![MockSource::new(10, 30.0)]).await;
        let mut timeline = TimelineSynchronizer::default();
        timeline.recompute(&registry);
        timeline.seek(&mut registry, 0);

        let loops: Vec<bool> = (0..10).map(|_| timeline.advance_one(&mut registry)).collect();

        assert_eq!(loops.iter().filter(|l| **l).count(), 1);
        assert!(loops[9]);
        assert_eq!(timeline.state().current_frame, 0);
    }

    #[test]
    fn test_elapsed_uses_current_frame() {
        let mut timeline = TimelineSynchronizer::default();
        timeline.state.total_frames = 10_000;
        timeline.state.current_frame = 1830;
        let elapsed = timeline.elapsed();
        assert_eq!((elapsed.minutes, elapsed.seconds), (1, 1));
    }

    proptest! {
        #[test]
        fn prop_total_is_max_frame_count(
            counts in prop::collection::vec(1u64..100_000, 1..=4),
            rates in prop::collection::vec(1.0f64..120.0, 4),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let sources: Vec<MockSource> = counts
                .iter()
                .zip(rates.iter())
                .map(|(c, r)| MockSource::new(*c, *r))
                .collect();
            let (_backend, registry) = runtime.block_on(registry_from(sources));
            let mut timeline = TimelineSynchronizer::default();

            prop_assert!(!timeline.recompute(&registry));

            let max = *counts.iter().max().unwrap();
            let winner = counts.iter().position(|c| *c == max).unwrap();
            prop_assert_eq!(timeline.state().total_frames, max);
            prop_assert_eq!(timeline.state().fps, rates[winner].max(1.0));
        }
    }
}
