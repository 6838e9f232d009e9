use crate::ffmpeg::FfmpegConfig;
use crate::timeline::TimelineDefaults;
use quadview_common::{default_slot_keys, ConfigError, SlotKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Player configuration, read from TOML. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Slot layout and initial sources
    pub slots: SlotConfig,

    /// Decoder processes
    pub ffmpeg: FfmpegConfig,

    /// Fallbacks for unreadable metadata
    pub timeline: TimelineDefaults,

    /// View alternation while playing
    pub mode_switch: ModeSwitchConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotConfig {
    /// Configured slot keys, in display order
    pub keys: Vec<SlotKey>,

    /// Source opened into each slot at startup
    pub sources: BTreeMap<SlotKey, PathBuf>,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            keys: default_slot_keys(),
            sources: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeSwitchConfig {
    /// Time spent in the primary (video) view before switching
    #[serde(with = "crate::serde_helpers::millis")]
    pub primary_dwell: Duration,

    /// Time spent in the secondary (results) view before switching back
    #[serde(with = "crate::serde_helpers::millis")]
    pub secondary_dwell: Duration,
}

impl Default for ModeSwitchConfig {
    fn default() -> Self {
        Self {
            primary_dwell: Duration::from_secs(30),
            secondary_dwell: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Loads, validates and saves a `PlayerConfig` file.
pub struct ConfigManager {
    config_path: PathBuf,
    config: PlayerConfig,
}

impl ConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            config: PlayerConfig::default(),
        }
    }

    /// Read the file; a missing file keeps the defaults.
    pub async fn load(&mut self) -> Result<(), ConfigError> {
        if !self.config_path.exists() {
            debug!("No config at {:?}, using defaults", self.config_path);
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.config_path)
            .await
            .map_err(|source| ConfigError::Read {
                path: self.config_path.clone(),
                source,
            })?;

        self.config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        self.validate()?;

        info!("Loaded configuration from {:?}", self.config_path);
        Ok(())
    }

    pub async fn save(&self) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| ConfigError::Parse(format!("failed to serialize config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| ConfigError::Write {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        tokio::fs::write(&self.config_path, content)
            .await
            .map_err(|source| ConfigError::Write {
                path: self.config_path.clone(),
                source,
            })?;
        Ok(())
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut PlayerConfig {
        &mut self.config
    }

    pub fn into_config(self) -> PlayerConfig {
        self.config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate(&self.config)
    }
}

pub fn validate(config: &PlayerConfig) -> Result<(), ConfigError> {
    let invalid = |message: String| Err(ConfigError::Invalid { message });

    if config.slots.keys.is_empty() {
        return invalid("at least one slot key is required".to_string());
    }

    let mut seen = HashSet::new();
    for key in &config.slots.keys {
        if key.as_str().trim().is_empty() {
            return invalid("slot keys cannot be empty".to_string());
        }
        if !seen.insert(key) {
            return invalid(format!("duplicate slot key {}", key));
        }
    }

    if let Some(key) = config.slots.sources.keys().find(|k| !seen.contains(k)) {
        return invalid(format!("source configured for unknown slot {}", key));
    }

    if config.timeline.fallback_frame_count == 0 {
        return invalid("timeline.fallback_frame_count must be at least 1".to_string());
    }
    if !(config.timeline.default_fps.is_finite() && config.timeline.default_fps > 0.0) {
        return invalid("timeline.default_fps must be positive".to_string());
    }

    if config.mode_switch.primary_dwell.is_zero() || config.mode_switch.secondary_dwell.is_zero() {
        return invalid("mode_switch dwell times must be non-zero".to_string());
    }

    if config.ffmpeg.probe_timeout.is_zero() {
        return invalid("ffmpeg.probe_timeout must be non-zero".to_string());
    }

    match config.logging.level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => return invalid(format!("unknown log level {:?}", other)),
    }

    Ok(())
}

/// Environment variable overrides applied after the file is loaded.
pub struct EnvConfigOverride;

impl EnvConfigOverride {
    pub fn apply_overrides(config: &mut PlayerConfig) {
        Self::apply_from(config, |name| std::env::var(name).ok());
    }

    fn apply_from(config: &mut PlayerConfig, var: impl Fn(&str) -> Option<String>) {
        if let Some(level) = var("QUADVIEW_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(path) = var("QUADVIEW_FFMPEG_PATH") {
            config.ffmpeg.ffmpeg_path = path.into();
        }
        if let Some(path) = var("QUADVIEW_FFPROBE_PATH") {
            config.ffmpeg.ffprobe_path = path.into();
        }
    }
}
