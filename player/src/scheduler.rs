use crate::registry::StreamRegistry;
use crate::sink::DisplaySink;
use crate::timeline::TimelineSynchronizer;
use quadview_common::SlotKey;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Tick period for a frame rate: `1000 / fps` milliseconds, truncated.
pub fn tick_interval(fps: f64) -> Duration {
    let millis = if fps > 0.0 && fps.is_finite() {
        (1000.0 / fps) as u64
    } else {
        33 // 30fps
    };
    Duration::from_millis(millis.max(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Outcome of a single playback tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub frame: u64,
    pub looped: bool,
    pub displayed: usize,
}

/// Periodic advance-and-display loop.
///
/// The scheduler owns only its timer. Timeline and registry are borrowed for
/// the duration of a tick, so dropping the timer in `stop()` is enough to
/// guarantee no later tick is observed.
pub struct PlaybackScheduler {
    ticker: Option<Interval>,
    period: Duration,
    tick_count: u64,
    loop_count: u64,
    /// Consecutive ticks on which a slot produced no frame
    staleness: BTreeMap<SlotKey, u32>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self {
            ticker: None,
            period: tick_interval(30.0),
            tick_count: 0,
            loop_count: 0,
            staleness: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.ticker.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn loop_count(&self) -> u64 {
        self.loop_count
    }

    pub fn staleness(&self) -> &BTreeMap<SlotKey, u32> {
        &self.staleness
    }

    pub fn reset_staleness(&mut self) {
        self.staleness.clear();
    }

    /// Begin ticking every `tick_interval(fps)`. The first tick fires one
    /// period from now. Calling while running keeps the existing timer.
    pub fn start(&mut self, fps: f64) {
        if self.ticker.is_some() {
            debug!("Playback scheduler already running");
            return;
        }

        let period = tick_interval(fps);
        let mut ticker = interval_at(Instant::now() + period, period);
        // Never burst to catch up: the next tick is scheduled from the
        // completion of the previous one
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.period = period;
        self.ticker = Some(ticker);
        info!(
            "Playback scheduler started: fps={:.2}, interval={}ms",
            fps,
            period.as_millis()
        );
    }

    pub fn stop(&mut self) {
        if self.ticker.take().is_some() {
            info!("Playback scheduler stopped after {} tick(s)", self.tick_count);
        }
    }

    /// Resolves at the next tick deadline; pends forever while stopped.
    pub async fn wait_tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Advance the timeline one frame and show the next frame of every slot.
    ///
    /// Steady-state reads are sequential: the decoders are only re-positioned
    /// when the timeline loops. A slot whose decode fails keeps its last
    /// frame and does not affect the others.
    pub async fn tick(
        &mut self,
        timeline: &mut TimelineSynchronizer,
        registry: &mut StreamRegistry,
        sink: &mut dyn DisplaySink,
    ) -> TickReport {
        let looped = timeline.advance_one(registry);
        if looped {
            self.loop_count += 1;
            info!("Playback looped to start (loop #{})", self.loop_count);
        }

        let mut displayed = 0;
        for (key, decoder) in registry.valid_decoders_mut() {
            match decoder.read_next().await {
                Ok(Some(frame)) => {
                    sink.show(key, &frame);
                    self.staleness.remove(key);
                    displayed += 1;
                }
                Ok(None) => {
                    debug!("Slot {} has no frame at {}", key, decoder.position());
                    *self.staleness.entry(key.clone()).or_default() += 1;
                }
                Err(e) => {
                    debug!("Slot {} decode failed: {}", key, e);
                    *self.staleness.entry(key.clone()).or_default() += 1;
                }
            }
        }

        self.tick_count += 1;
        TickReport {
            frame: timeline.state().current_frame,
            looped,
            displayed,
        }
    }
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new()
    }
}
