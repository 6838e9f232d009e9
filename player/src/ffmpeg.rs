use crate::decoder::{Decoder, DecoderBackend};
use async_trait::async_trait;
use bytes::Bytes;
use quadview_common::{DecodeError, Frame, OpenError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command as AsyncCommand};
use tracing::{debug, info, warn};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FfmpegConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,

    /// Upper bound on one ffprobe run
    #[serde(with = "crate::serde_helpers::millis")]
    pub probe_timeout: Duration,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".into(),
            ffprobe_path: "ffprobe".into(),
            probe_timeout: Duration::from_secs(10),
        }
    }
}

// ============================================================================
// Probe Output
// ============================================================================

/// Stream metadata reported by ffprobe for the first video stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeInfo {
    pub width: u32,
    pub height: u32,
    pub frame_count: Option<u64>,
    pub fps: Option<f64>,
}

impl ProbeInfo {
    /// Parse `key=value` lines from
    /// `ffprobe -show_entries stream=... -of default=noprint_wrappers=1`.
    ///
    /// `N/A` and non-positive values are treated as unreadable. When
    /// `nb_frames` is missing the count is estimated from the stream duration.
    pub fn parse(output: &str) -> Self {
        let mut info = ProbeInfo::default();
        let mut avg_rate = None;
        let mut real_rate = None;
        let mut duration = None;

        for line in output.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "width" => info.width = value.parse().unwrap_or(0),
                "height" => info.height = value.parse().unwrap_or(0),
                "nb_frames" => info.frame_count = value.parse::<u64>().ok().filter(|n| *n > 0),
                "avg_frame_rate" => avg_rate = parse_rate(value),
                "r_frame_rate" => real_rate = parse_rate(value),
                "duration" => duration = value.parse::<f64>().ok().filter(|d| *d > 0.0),
                _ => {}
            }
        }

        info.fps = avg_rate.or(real_rate);
        if info.frame_count.is_none() {
            if let (Some(duration), Some(fps)) = (duration, info.fps) {
                info.frame_count = Some((duration * fps).round() as u64).filter(|n| *n > 0);
            }
        }
        info
    }
}

/// Parse an ffprobe rate such as `30000/1001` or `25`.
pub fn parse_rate(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

// ============================================================================
// Backend
// ============================================================================

/// Opens sources by probing them with ffprobe.
pub struct FfmpegBackend {
    config: FfmpegConfig,
}

impl FfmpegBackend {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    async fn probe(&self, path: &Path) -> Result<ProbeInfo, OpenError> {
        let result = tokio::time::timeout(
            self.config.probe_timeout,
            AsyncCommand::new(&self.config.ffprobe_path)
                .args([
                    "-v",
                    "error",
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "stream=width,height,nb_frames,avg_frame_rate,r_frame_rate,duration",
                    "-of",
                    "default=noprint_wrappers=1",
                ])
                .arg(path)
                .stdin(Stdio::null())
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(OpenError::unopenable(path, stderr.trim()));
                }
                Ok(ProbeInfo::parse(&String::from_utf8_lossy(&output.stdout)))
            }
            Ok(Err(e)) => Err(OpenError::unopenable(
                path,
                format!("failed to run {:?}: {}", self.config.ffprobe_path, e),
            )),
            Err(_) => Err(OpenError::unopenable(
                path,
                format!("probe timed out after {:?}", self.config.probe_timeout),
            )),
        }
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new(FfmpegConfig::default())
    }
}

#[async_trait]
impl DecoderBackend for FfmpegBackend {
    async fn open(&self, path: &Path) -> Result<Box<dyn Decoder>, OpenError> {
        tokio::fs::metadata(path)
            .await
            .map_err(|e| OpenError::unopenable(path, e.to_string()))?;

        let info = self.probe(path).await?;
        info!(
            "Probed {:?}: {}x{}, frames={:?}, fps={:?}",
            path, info.width, info.height, info.frame_count, info.fps
        );

        Ok(Box::new(FfmpegDecoder::new(
            path.to_path_buf(),
            info,
            self.config.ffmpeg_path.clone(),
        )))
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Streams raw RGB24 frames out of an `ffmpeg` child process.
///
/// The child is started lazily at the cursor position. `seek` only moves
/// the cursor and drops the child; the next read restarts ffmpeg there.
/// Once the child runs dry, reads report end of stream until the next seek.
pub struct FfmpegDecoder {
    path: PathBuf,
    info: ProbeInfo,
    ffmpeg_path: PathBuf,
    position: u64,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    end_of_stream: bool,
    open: bool,
}

impl FfmpegDecoder {
    pub fn new(path: PathBuf, info: ProbeInfo, ffmpeg_path: PathBuf) -> Self {
        Self {
            path,
            info,
            ffmpeg_path,
            position: 0,
            child: None,
            stdout: None,
            end_of_stream: false,
            open: true,
        }
    }

    fn frame_size(&self) -> usize {
        self.info.width as usize * self.info.height as usize * 3
    }

    fn spawn_at(&mut self, frame_idx: u64) -> Result<(), DecodeError> {
        let fps = self.info.fps.unwrap_or(30.0);
        let start = frame_idx as f64 / fps;
        let start_arg = format!("{:.6}", start);

        let mut child = AsyncCommand::new(&self.ffmpeg_path)
            .args(["-v", "error", "-ss", start_arg.as_str(), "-i"])
            .arg(&self.path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DecodeError::Process("ffmpeg stdout not captured".to_string()))?;

        debug!("Started ffmpeg for {:?} at frame {} ({:.3}s)", self.path, frame_idx, start);
        self.child = Some(child);
        self.stdout = Some(stdout);
        Ok(())
    }

    /// Decode the frame under the cursor without moving it. `Ok(None)` when
    /// ffmpeg has no more frames.
    async fn read_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        if self.info.height == 0 {
            return Err(DecodeError::Process("unknown frame height".to_string()));
        }
        if self.stdout.is_none() {
            self.spawn_at(self.position)?;
        }

        let mut buffer = vec![0u8; self.frame_size()];
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| DecodeError::Process("ffmpeg is not running".to_string()))?;

        match stdout.read_exact(&mut buffer).await {
            Ok(_) => Ok(Some(Frame::new(
                self.position,
                self.info.width,
                self.info.height,
                Bytes::from(buffer),
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn stop_child(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!("ffmpeg for {:?} already exited: {}", self.path, e);
            }
        }
    }
}

#[async_trait]
impl Decoder for FfmpegDecoder {
    fn source(&self) -> &Path {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn frame_width(&self) -> u32 {
        self.info.width
    }

    fn frame_count(&self) -> Option<u64> {
        self.info.frame_count
    }

    fn fps(&self) -> Option<f64> {
        self.info.fps
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, frame_idx: u64) {
        if frame_idx == self.position && self.stdout.is_some() {
            return;
        }
        self.position = frame_idx;
        self.end_of_stream = false;
        self.stop_child();
    }

    async fn read_next(&mut self) -> Result<Option<Frame>, DecodeError> {
        if !self.open {
            return Err(DecodeError::Released);
        }
        if self.end_of_stream || self.info.frame_count.is_some_and(|count| self.position >= count) {
            return Ok(None);
        }

        match self.read_frame().await {
            Ok(Some(frame)) => {
                self.position += 1;
                Ok(Some(frame))
            }
            Ok(None) => {
                debug!("ffmpeg for {:?} ended at frame {}", self.path, self.position);
                self.end_of_stream = true;
                self.stop_child();
                Ok(None)
            }
            Err(e) => {
                // The failed frame is skipped so the cursor stays in step
                // with the other slots; the next read restarts ffmpeg
                warn!("Reading frame {} of {:?} failed: {}", self.position, self.path, e);
                self.position += 1;
                self.stop_child();
                Err(e)
            }
        }
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.stop_child();
            debug!("Released {:?}", self.path);
        }
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        self.stop_child();
    }
}
