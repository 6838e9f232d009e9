use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of one video channel, e.g. "A1".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotKey(String);

impl SlotKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SlotKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("slot key cannot be empty".to_string());
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for SlotKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The slot keys used when no configuration overrides them.
pub fn default_slot_keys() -> Vec<SlotKey> {
    ["A1", "A2", "B1", "B2"].into_iter().map(SlotKey::from).collect()
}

/// One decoded video frame, packed RGB24.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Absolute frame index inside its source
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl Frame {
    pub fn new(index: u64, width: u32, height: u32, data: Bytes) -> Self {
        Self {
            index,
            width,
            height,
            data,
        }
    }
}

/// Playback position broken down for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elapsed {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl Elapsed {
    /// Floors `frame / fps` seconds into h/m/s. A non-positive fps yields zero.
    pub fn from_frame(frame: u64, fps: f64) -> Self {
        if fps <= 0.0 || !fps.is_finite() {
            return Self::default();
        }
        let total_seconds = (frame as f64 / fps).floor() as u64;
        Self {
            hours: total_seconds / 3600,
            minutes: (total_seconds % 3600) / 60,
            seconds: total_seconds % 60,
        }
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Elapsed: {:02}h {:02}m {:02}s",
            self.hours, self.minutes, self.seconds
        )
    }
}

/// Label shown on the play/pause control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayLabel {
    Play,
    Pause,
}

impl fmt::Display for PlayLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayLabel::Play => f.write_str("▶ Play"),
            PlayLabel::Pause => f.write_str("❚❚ Pause"),
        }
    }
}

/// Which UI page is in front.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewMode {
    /// Video wall
    #[default]
    Primary,
    /// Results page
    Secondary,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Primary => ViewMode::Secondary,
            ViewMode::Secondary => ViewMode::Primary,
        }
    }
}
