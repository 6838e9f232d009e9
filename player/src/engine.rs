use crate::transport::{PlayerStatus, TransportController};
use quadview_common::{EngineError, OpenError, SlotKey};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Requests accepted by the engine task. Every command replies once it has
/// been fully applied.
#[derive(Debug)]
pub enum PlayerCommand {
    OpenSource {
        slot: SlotKey,
        path: PathBuf,
        reply: oneshot::Sender<Result<(), OpenError>>,
    },
    TogglePlayPause {
        reply: oneshot::Sender<bool>,
    },
    SeekTo {
        position: i64,
        reply: oneshot::Sender<u64>,
    },
    Status {
        reply: oneshot::Sender<PlayerStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Single task that owns the transport controller.
///
/// User commands, playback ticks and mode switches are all handled inside
/// one `select!` loop, so none of them can interleave with another.
pub struct PlayerEngine {
    handle: PlayerHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PlayerEngine {
    pub fn spawn(controller: TransportController) -> Self {
        let (tx, rx) = mpsc::channel(100);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(controller, rx, cancel.clone()));

        Self {
            handle: PlayerHandle { commands: tx },
            cancel,
            task,
        }
    }

    pub fn handle(&self) -> PlayerHandle {
        self.handle.clone()
    }

    /// Stop the engine without waiting for a reply
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) -> Result<(), EngineError> {
        let PlayerEngine { handle, task, .. } = self;
        drop(handle);
        task.await.map_err(|e| {
            warn!("Player engine task failed: {}", e);
            EngineError::Stopped
        })
    }
}

async fn run(
    mut controller: TransportController,
    mut commands: mpsc::Receiver<PlayerCommand>,
    cancel: CancellationToken,
) {
    info!("Player engine started");
    let mut shutdown_reply = None;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Player engine cancelled");
                break;
            }
            command = commands.recv() => match command {
                Some(command) => {
                    if let Some(reply) = handle_command(&mut controller, command).await {
                        shutdown_reply = Some(reply);
                        break;
                    }
                }
                None => {
                    debug!("All player handles dropped");
                    break;
                }
            },
            event = controller.next_event() => controller.handle_event(event).await,
        }
    }

    controller.shutdown();
    if let Some(reply) = shutdown_reply {
        let _ = reply.send(());
    }
    info!("Player engine stopped");
}

/// Apply one command. Returns the reply channel when the command asks the
/// engine to stop.
async fn handle_command(
    controller: &mut TransportController,
    command: PlayerCommand,
) -> Option<oneshot::Sender<()>> {
    match command {
        PlayerCommand::OpenSource { slot, path, reply } => {
            let result = controller.open_source(&slot, &path).await;
            let _ = reply.send(result);
        }
        PlayerCommand::TogglePlayPause { reply } => {
            let _ = reply.send(controller.toggle_play_pause());
        }
        PlayerCommand::SeekTo { position, reply } => {
            let _ = reply.send(controller.seek_to(position).await);
        }
        PlayerCommand::Status { reply } => {
            let _ = reply.send(controller.status());
        }
        PlayerCommand::Shutdown { reply } => return Some(reply),
    }
    None
}

/// Cloneable client side of the engine.
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    commands: mpsc::Sender<PlayerCommand>,
}

impl PlayerHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> PlayerCommand,
    ) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    pub async fn open_source(
        &self,
        slot: SlotKey,
        path: impl Into<PathBuf>,
    ) -> Result<(), EngineError> {
        let path = path.into();
        self.request(|reply| PlayerCommand::OpenSource { slot, path, reply })
            .await??;
        Ok(())
    }

    pub async fn toggle_play_pause(&self) -> Result<bool, EngineError> {
        self.request(|reply| PlayerCommand::TogglePlayPause { reply })
            .await
    }

    pub async fn seek_to(&self, position: i64) -> Result<u64, EngineError> {
        self.request(|reply| PlayerCommand::SeekTo { position, reply })
            .await
    }

    pub async fn status(&self) -> Result<PlayerStatus, EngineError> {
        self.request(|reply| PlayerCommand::Status { reply }).await
    }

    /// Stop both schedulers and release every source. Returns once done.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.request(|reply| PlayerCommand::Shutdown { reply }).await
    }
}
