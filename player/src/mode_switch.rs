use quadview_common::ViewMode;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};
use tracing::{debug, info};

/// Alternates the active view on asymmetric dwell times while playback runs.
///
/// Primary dwells for `long`, Secondary for `short`. Disarming drops the
/// pending deadline, so a firing can never be observed after `disarm()`.
pub struct ModeSwitchScheduler {
    mode: ViewMode,
    long: Duration,
    short: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl ModeSwitchScheduler {
    pub fn new(long: Duration, short: Duration) -> Self {
        Self {
            mode: ViewMode::Primary,
            long,
            short,
            deadline: None,
        }
    }

    pub fn active_mode(&self) -> ViewMode {
        self.mode
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// How long the current mode lasts before the next switch
    pub fn dwell_interval(&self) -> Duration {
        match self.mode {
            ViewMode::Primary => self.long,
            ViewMode::Secondary => self.short,
        }
    }

    /// Restart the cycle at Primary with the long dwell.
    pub fn arm(&mut self) {
        self.mode = ViewMode::Primary;
        self.deadline = Some(Box::pin(sleep(self.long)));
        info!("Mode switch armed: Primary for {}s", self.long.as_secs_f64());
    }

    pub fn disarm(&mut self) {
        if self.deadline.take().is_some() {
            debug!("Mode switch disarmed in {:?}", self.mode);
        }
    }

    /// Resolves when the current dwell expires; pends forever while disarmed.
    pub async fn wait_fire(&mut self) {
        match self.deadline.as_mut() {
            Some(deadline) => deadline.as_mut().await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Flip to the other mode and schedule the next switch.
    pub fn fire(&mut self) -> ViewMode {
        self.mode = self.mode.toggled();
        let dwell = self.dwell_interval();
        if let Some(deadline) = self.deadline.as_mut() {
            deadline.as_mut().reset(Instant::now() + dwell);
        }
        debug!("Mode switched to {:?}, next switch in {:?}", self.mode, dwell);
        self.mode
    }
}
