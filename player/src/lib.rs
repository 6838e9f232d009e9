pub mod config;
pub mod decoder;
pub mod engine;
pub mod ffmpeg;
pub mod mode_switch;
pub mod registry;
pub mod results;
pub mod scheduler;
pub mod serde_helpers;
pub mod sink;
pub mod timeline;
pub mod transport;

pub use engine::{PlayerEngine, PlayerHandle};
pub use transport::{PlayerStatus, TransportController};
