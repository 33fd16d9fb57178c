use crate::catalog::TrackCatalog;
use crate::config::SyncConfig;
use crate::models::{Container, StartPosition, TrackMetadata};
use crate::playback::backend::{MediaBackend, MediaEvent, PlaybackError};
use crate::playback::progress::{ListenerBroadcast, PlaybackSnapshot, SubscriptionId};
use crate::playback::session::PlaybackSession;
use crate::playback::sync::{EndReason, SessionEvent, SyncController};
use crate::playback::timers::SessionTimers;
use crate::position_store::PositionCache;
use crate::remote::{RemotePositionService, RemotePositions};
use std::sync::Arc;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{info, warn};

/// Playback commands sent to the service
#[derive(Debug, Clone)]
pub enum PlaybackCommand {
    Play {
        track: TrackMetadata,
        start: StartPosition,
    },
    PlayContainer {
        container: Container,
        start_track: Option<String>,
    },
    Pause,
    Resume,
    TogglePlay,
    SeekRelative(f64), // seconds, may be negative
    SeekAbsolute(f64),
    Next,
    Previous,
    Stop,
    /// The app went to the background: pause, flush, end the session
    AppHidden,
    /// The app is going away: as `AppHidden`, and release the track
    Unload,
}

/// Handle to the playback service for sending commands
#[derive(Clone)]
pub struct PlaybackHandle {
    command_tx: tokio_mpsc::UnboundedSender<PlaybackCommand>,
    broadcast: ListenerBroadcast,
}

impl PlaybackHandle {
    fn send(&self, command: PlaybackCommand) {
        if self.command_tx.send(command).is_err() {
            warn!("Playback service is not running, command dropped");
        }
    }

    /// Play a track from its reconciled saved position
    pub fn play(&self, track: TrackMetadata) {
        self.play_from(track, StartPosition::Resume);
    }

    pub fn play_from(&self, track: TrackMetadata, start: StartPosition) {
        self.send(PlaybackCommand::Play { track, start });
    }

    /// Play a multi-track item; later tracks follow automatically
    pub fn play_container(&self, container: Container, start_track: Option<String>) {
        self.send(PlaybackCommand::PlayContainer {
            container,
            start_track,
        });
    }

    pub fn pause(&self) {
        self.send(PlaybackCommand::Pause);
    }

    pub fn resume(&self) {
        self.send(PlaybackCommand::Resume);
    }

    pub fn toggle_play(&self) {
        self.send(PlaybackCommand::TogglePlay);
    }

    pub fn seek_relative(&self, delta_seconds: f64) {
        self.send(PlaybackCommand::SeekRelative(delta_seconds));
    }

    pub fn seek_absolute(&self, position_seconds: f64) {
        self.send(PlaybackCommand::SeekAbsolute(position_seconds));
    }

    pub fn next(&self) {
        self.send(PlaybackCommand::Next);
    }

    pub fn previous(&self) {
        self.send(PlaybackCommand::Previous);
    }

    pub fn stop(&self) {
        self.send(PlaybackCommand::Stop);
    }

    pub fn app_hidden(&self) {
        self.send(PlaybackCommand::AppHidden);
    }

    pub fn unload(&self) {
        self.send(PlaybackCommand::Unload);
    }

    /// Like the named methods, but reports a stopped service to the caller
    pub fn send_command(&self, command: PlaybackCommand) -> Result<(), PlaybackError> {
        self.command_tx
            .send(command)
            .map_err(|_| PlaybackError::ServiceStopped)
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&PlaybackSnapshot) + Send + Sync + 'static,
    {
        self.broadcast.subscribe(callback)
    }

    pub fn subscribe_channel(&self) -> tokio_mpsc::UnboundedReceiver<PlaybackSnapshot> {
        self.broadcast.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.broadcast.unsubscribe(id)
    }

    /// The most recently published snapshot
    pub fn get_state(&self) -> PlaybackSnapshot {
        self.broadcast.latest()
    }

    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }
}

/// Playback service that serializes commands, media events and checkpoints
/// onto one task
pub struct PlaybackService {
    controller: SyncController,
    command_rx: tokio_mpsc::UnboundedReceiver<PlaybackCommand>,
    media_rx: tokio_mpsc::UnboundedReceiver<MediaEvent>,
    session_rx: tokio_mpsc::UnboundedReceiver<SessionEvent>,
}

impl PlaybackService {
    pub fn start(
        config: &SyncConfig,
        backend: Box<dyn MediaBackend>,
        media_events: tokio_mpsc::UnboundedReceiver<MediaEvent>,
        cache: PositionCache,
        remote_service: Arc<dyn RemotePositionService>,
        catalog: Arc<dyn TrackCatalog>,
        runtime_handle: tokio::runtime::Handle,
    ) -> PlaybackHandle {
        let (command_tx, command_rx) = tokio_mpsc::unbounded_channel();
        let (session_tx, session_rx) = tokio_mpsc::unbounded_channel();
        let broadcast = ListenerBroadcast::new();

        let handle = PlaybackHandle {
            command_tx,
            broadcast: broadcast.clone(),
        };

        let controller = SyncController::new(
            PlaybackSession::new(backend),
            cache,
            RemotePositions::new(remote_service, config.remote_throttle_window),
            catalog,
            broadcast,
            SessionTimers::new(config.local_checkpoint_interval, config.remote_sync_interval),
            session_tx,
        );

        let service = PlaybackService {
            controller,
            command_rx,
            media_rx: media_events,
            session_rx,
        };
        runtime_handle.spawn(service.run());

        handle
    }

    async fn run(mut self) {
        info!("PlaybackService started");

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = self.media_rx.recv() => {
                    self.controller.handle_media_event(event).await;
                }
                Some(event) = self.session_rx.recv() => {
                    self.controller.handle_session_event(event).await;
                }
                checkpoint = self.controller.timers.next() => {
                    self.controller.checkpoint(checkpoint).await;
                }
            }
        }

        self.controller.shutdown().await;
        info!("PlaybackService stopped");
    }

    async fn handle_command(&mut self, command: PlaybackCommand) {
        match command {
            PlaybackCommand::Play { track, start } => {
                self.controller.play(track, start).await;
            }
            PlaybackCommand::PlayContainer {
                container,
                start_track,
            } => {
                self.controller.play_container(container, start_track).await;
            }
            PlaybackCommand::Pause => {
                self.controller.pause().await;
            }
            PlaybackCommand::Resume => {
                self.controller.resume().await;
            }
            PlaybackCommand::TogglePlay => {
                self.controller.toggle_play().await;
            }
            PlaybackCommand::SeekRelative(delta) => {
                self.controller.seek_relative(delta).await;
            }
            PlaybackCommand::SeekAbsolute(position) => {
                self.controller.seek_absolute(position).await;
            }
            PlaybackCommand::Next => {
                self.controller.next().await;
            }
            PlaybackCommand::Previous => {
                self.controller.previous().await;
            }
            PlaybackCommand::Stop => {
                self.controller.stop().await;
            }
            PlaybackCommand::AppHidden => {
                self.controller.end(EndReason::Hidden).await;
            }
            PlaybackCommand::Unload => {
                self.controller.end(EndReason::Unload).await;
            }
        }
    }
}
