use quadview_common::{Elapsed, Frame, PlayLabel, SlotKey, ViewMode};
use tracing::{debug, info, trace, warn};

/// Receives decoded frames. Color conversion and scaling happen here, not in the core.
pub trait DisplaySink: Send {
    fn show(&mut self, slot: &SlotKey, frame: &Frame);
}

/// Receives user-facing, non-fatal warnings.
pub trait WarningSink: Send {
    fn warn(&mut self, message: &str);
}

/// Transport widgets the controller keeps in step with the timeline.
pub trait TransportView: Send {
    fn set_play_label(&mut self, _label: PlayLabel) {}
    fn set_elapsed(&mut self, _elapsed: Elapsed) {}
    fn set_seek_range(&mut self, _max_frame: u64) {}
    fn set_seek_position(&mut self, _frame: u64) {}
    fn set_controls_enabled(&mut self, _enabled: bool) {}
    fn show_mode(&mut self, _mode: ViewMode) {}
}

/// Headless sink that reports everything through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink {
    frames_shown: u64,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplaySink for TracingSink {
    fn show(&mut self, slot: &SlotKey, frame: &Frame) {
        self.frames_shown += 1;
        trace!(
            "Slot {} frame {} ({}x{}, {} bytes)",
            slot,
            frame.index,
            frame.width,
            frame.height,
            frame.data.len()
        );
    }
}

impl WarningSink for TracingSink {
    fn warn(&mut self, message: &str) {
        warn!("{}", message);
    }
}

impl TransportView for TracingSink {
    fn set_play_label(&mut self, label: PlayLabel) {
        info!("[{}]", label);
    }

    fn set_elapsed(&mut self, elapsed: Elapsed) {
        debug!("{}", elapsed);
    }

    fn set_seek_range(&mut self, max_frame: u64) {
        debug!("Seek range 0..={}", max_frame);
    }

    fn set_controls_enabled(&mut self, enabled: bool) {
        info!("Transport controls {}", if enabled { "enabled" } else { "disabled" });
    }

    fn show_mode(&mut self, mode: ViewMode) {
        info!("Showing {:?} view (frames shown so far: {})", mode, self.frames_shown);
    }
}

#[cfg(test)]
pub mod recording {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Everything a `RecordingSink` observed.
    #[derive(Debug, Default)]
    pub struct Recorded {
        pub frames: Vec<(SlotKey, u64)>,
        pub warnings: Vec<String>,
        pub labels: Vec<PlayLabel>,
        pub elapsed: Vec<Elapsed>,
        pub seek_ranges: Vec<u64>,
        pub seek_positions: Vec<u64>,
        pub controls_enabled: Vec<bool>,
        pub modes: Vec<ViewMode>,
    }

    /// Cloneable sink; every clone writes to the same record.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingSink {
        pub recorded: Arc<Mutex<Recorded>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn frames(&self) -> Vec<(SlotKey, u64)> {
            self.recorded.lock().unwrap().frames.clone()
        }

        pub fn warnings(&self) -> Vec<String> {
            self.recorded.lock().unwrap().warnings.clone()
        }

        pub fn modes(&self) -> Vec<ViewMode> {
            self.recorded.lock().unwrap().modes.clone()
        }

        pub fn last_label(&self) -> Option<PlayLabel> {
            self.recorded.lock().unwrap().labels.last().copied()
        }

        pub fn last_controls_enabled(&self) -> Option<bool> {
            self.recorded.lock().unwrap().controls_enabled.last().copied()
        }

        pub fn clear_frames(&self) {
            self.recorded.lock().unwrap().frames.clear();
        }
    }

    impl DisplaySink for RecordingSink {
        fn show(&mut self, slot: &SlotKey, frame: &Frame) {
            self.recorded
                .lock()
                .unwrap()
                .frames
                .push((slot.clone(), frame.index));
        }
    }

    impl WarningSink for RecordingSink {
        fn warn(&mut self, message: &str) {
            self.recorded
                .lock()
                .unwrap()
                .warnings
                .push(message.to_string());
        }
    }

    impl TransportView for RecordingSink {
        fn set_play_label(&mut self, label: PlayLabel) {
            self.recorded.lock().unwrap().labels.push(label);
        }

        fn set_elapsed(&mut self, elapsed: Elapsed) {
            self.recorded.lock().unwrap().elapsed.push(elapsed);
        }

        fn set_seek_range(&mut self, max_frame: u64) {
            self.recorded.lock().unwrap().seek_ranges.push(max_frame);
        }

        fn set_seek_position(&mut self, frame: u64) {
            self.recorded.lock().unwrap().seek_positions.push(frame);
        }

        fn set_controls_enabled(&mut self, enabled: bool) {
            self.recorded.lock().unwrap().controls_enabled.push(enabled);
        }

        fn show_mode(&mut self, mode: ViewMode) {
            self.recorded.lock().unwrap().modes.push(mode);
        }
    }
}
