use crate::types::SlotKey;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Source Open Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum OpenError {
    #[error("Cannot open video source {}: {reason}", path.display())]
    Unopenable { path: PathBuf, reason: String },

    #[error("Unknown slot: {0}")]
    UnknownSlot(SlotKey),
}

impl OpenError {
    pub fn unopenable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        OpenError::Unopenable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Per-frame Decode Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Decoder process failed: {0}")]
    Process(String),

    #[error("Decoder has been released")]
    Released,
}

// ============================================================================
// Configuration Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to write config file {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

// ============================================================================
// Results Table Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Metrics table has no header row")]
    EmptyTable,

    #[error("Row {line} has {actual} fields, expected {expected}")]
    RaggedRow {
        line: usize,
        expected: usize,
        actual: usize,
    },
}

// ============================================================================
// Engine Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Player engine is not running")]
    Stopped,

    #[error("Open failed: {0}")]
    Open(#[from] OpenError),
}
