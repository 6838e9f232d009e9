use async_trait::async_trait;
use quadview_common::{DecodeError, Frame, OpenError};
use std::path::Path;

// ============================================================================
// Decoder Capability
// ============================================================================

/// One opened video source with a sequential read cursor.
#[async_trait]
pub trait Decoder: Send {
    /// Path the decoder was opened from
    fn source(&self) -> &Path;

    /// Whether the handle is still usable
    fn is_open(&self) -> bool;

    /// Frame width in pixels; zero means there is no real video stream
    fn frame_width(&self) -> u32;

    /// Native frame count, `None` when the container does not report a positive value
    fn frame_count(&self) -> Option<u64>;

    /// Native frame rate, `None` when unreadable or non-positive
    fn fps(&self) -> Option<f64>;

    /// Absolute index of the frame the next `read_next` will return
    fn position(&self) -> u64;

    /// Position the read cursor at an absolute frame without decoding
    fn seek(&mut self, frame_idx: u64);

    /// Decode the frame under the cursor and advance by one.
    /// `Ok(None)` signals end of stream.
    async fn read_next(&mut self) -> Result<Option<Frame>, DecodeError>;

    /// Free the underlying resources; idempotent
    fn release(&mut self);
}

/// Opens decoders for source paths.
#[async_trait]
pub trait DecoderBackend: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Box<dyn Decoder>, OpenError>;
}

// ============================================================================
// Scripted decoder for tests
// ============================================================================
