use crate::catalog::TrackCatalog;
use crate::models::{clamp_position, Container, StartPosition, TrackMetadata, TrackPosition};
use crate::playback::advance::AutoAdvance;
use crate::playback::backend::{MediaEvent, PlaybackError};
use crate::playback::progress::{ListenerBroadcast, PlaybackEvent, PlaybackSnapshot};
use crate::playback::session::PlaybackSession;
use crate::playback::timers::{Checkpoint, SessionTimers};
use crate::position_store::PositionCache;
use crate::remote::{NetworkError, RemotePositions};
use std::sync::Arc;
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle of the synchronization controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    /// The media backend reported an error; left only by a new play request
    Failed,
}

/// Why a session moved to `Ended`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Finished,
    Hidden,
    Unload,
}

/// Last-write-wins between the local and remote records.
///
/// The record with the strictly later `updated_at` wins; a tie goes to the
/// local record. A record with a timestamp always beats one without. With
/// no timestamps at all the result is position 0.
pub fn reconcile(local: TrackPosition, remote: TrackPosition) -> TrackPosition {
    match (local.updated_at, remote.updated_at) {
        (Some(local_at), Some(remote_at)) => {
            if remote_at > local_at {
                remote
            } else {
                local
            }
        }
        (Some(_), None) => local,
        (None, Some(_)) => remote,
        (None, None) => TrackPosition::zero(&local.track_id),
    }
}

/// Results of background work, tagged with the session that started it
pub(crate) enum SessionEvent {
    Reconciled {
        generation: u64,
        position: TrackPosition,
    },
    Resolved {
        generation: u64,
        track_id: String,
        start: StartPosition,
        result: Result<TrackMetadata, NetworkError>,
    },
}

/// Where a loading session starts
#[derive(Debug, Clone, Copy, PartialEq)]
enum StartTarget {
    /// Reconciled from saved records; only used when inside the duration
    Saved(f64),
    /// Asked for by the caller; clamped to the duration
    Explicit(f64),
}

/// Initial seek of a loading session. Consumed exactly once.
struct PendingStart {
    target: Option<StartTarget>,
    metadata_ready: bool,
}

/// Keeps one play position consistent between the media output, the
/// local cache and the remote service
pub struct SyncController {
    session: PlaybackSession,
    cache: PositionCache,
    remote: RemotePositions,
    catalog: Arc<dyn TrackCatalog>,
    broadcast: ListenerBroadcast,
    pub(crate) timers: SessionTimers,
    advance: AutoAdvance,
    phase: SyncPhase,
    generation: u64,
    pending: Option<PendingStart>,
    autoplay: bool,
    error: Option<String>,
    tasks: Vec<JoinHandle<()>>,
    events_tx: tokio_mpsc::UnboundedSender<SessionEvent>,
}

impl SyncController {
    pub(crate) fn new(
        session: PlaybackSession,
        cache: PositionCache,
        remote: RemotePositions,
        catalog: Arc<dyn TrackCatalog>,
        broadcast: ListenerBroadcast,
        timers: SessionTimers,
        events_tx: tokio_mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        SyncController {
            session,
            cache,
            remote,
            catalog,
            broadcast,
            timers,
            advance: AutoAdvance::new(),
            phase: SyncPhase::Idle,
            generation: 0,
            pending: None,
            autoplay: false,
            error: None,
            tasks: Vec::new(),
            events_tx,
        }
    }

    fn snapshot(&self, event: PlaybackEvent) -> PlaybackSnapshot {
        let state = self.session.state();
        PlaybackSnapshot {
            is_playing: state.is_playing,
            current_position: state.current_position,
            duration: state.duration,
            current_track: state.current_track.clone(),
            error: self.error.clone(),
            phase: self.phase,
            event,
        }
    }

    fn publish(&self, event: PlaybackEvent) {
        self.broadcast.publish(self.snapshot(event));
    }

    /// Drop the timers and in-flight work of the current session
    fn cancel_session(&mut self) {
        self.timers.stop();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.pending = None;
        self.generation += 1;
    }

    /// Save locally, then try a (throttled) remote push of the same record
    async fn flush(&mut self) {
        let Some(track_id) = self.session.track_id().map(str::to_string) else {
            return;
        };
        let position = clamp_position(self.session.position(), self.session.duration());
        let record = self.cache.save(&track_id, position).await;
        self.remote.push(record);
    }

    pub async fn play(&mut self, track: TrackMetadata, start: StartPosition) {
        self.autoplay = true;
        self.load_track(track, start).await;
    }

    async fn load_track(&mut self, track: TrackMetadata, start: StartPosition) {
        if self.phase == SyncPhase::Playing {
            self.flush().await;
        }
        self.cancel_session();
        self.error = None;
        self.phase = SyncPhase::Loading;

        if self.advance.select(&track.id) {
            if let Some(container) = self.advance.container() {
                self.remote.push_last_track(&container.id, &track.id);
            }
        } else {
            self.advance.clear();
        }

        info!("Loading track {} ({:?})", track.id, start);
        let track_id = track.id.clone();
        if let Err(e) = self.session.load(track) {
            self.fail(e).await;
            return;
        }

        let target = match start {
            StartPosition::Resume => None,
            StartPosition::Beginning => Some(StartTarget::Explicit(0.0)),
            StartPosition::At(position) => Some(StartTarget::Explicit(position)),
        };
        self.pending = Some(PendingStart {
            target,
            metadata_ready: false,
        });
        self.publish(PlaybackEvent::Loading);

        if target.is_none() {
            self.spawn_reconcile(track_id);
        }
    }

    fn spawn_reconcile(&mut self, track_id: String) {
        let cache = self.cache.clone();
        let remote = self.remote.clone();
        let events_tx = self.events_tx.clone();
        let generation = self.generation;

        self.tasks.push(tokio::spawn(async move {
            let (local, remote_record) =
                tokio::join!(cache.load(&track_id), remote.fetch(&track_id));
            let position = reconcile(local, remote_record);
            let _ = events_tx.send(SessionEvent::Reconciled {
                generation,
                position,
            });
        }));
    }

    /// Leave the current track while the next one is being looked up
    async fn begin_switch(&mut self) {
        if self.phase == SyncPhase::Playing {
            self.flush().await;
        }
        self.cancel_session();
        self.error = None;
        self.session.pause();
        self.phase = SyncPhase::Loading;
        self.publish(PlaybackEvent::Loading);
    }

    async fn resolve_and_play(&mut self, track_id: String, start: StartPosition) {
        self.begin_switch().await;

        let catalog = self.catalog.clone();
        let events_tx = self.events_tx.clone();
        let generation = self.generation;
        self.tasks.push(tokio::spawn(async move {
            let result = catalog.resolve(&track_id).await;
            let _ = events_tx.send(SessionEvent::Resolved {
                generation,
                track_id,
                start,
                result,
            });
        }));
    }

    /// Play a container, starting from `start_track`, the remote
    /// last-played marker, or the first track, in that order
    pub async fn play_container(&mut self, container: Container, start_track: Option<String>) {
        let Some(first) = container.track_ids.first().cloned() else {
            let error =
                PlaybackError::NoTrack(format!("container {} has no tracks", container.id));
            if matches!(
                self.phase,
                SyncPhase::Loading | SyncPhase::Playing | SyncPhase::Paused
            ) {
                self.reject(error);
            } else {
                self.fail(error).await;
            }
            return;
        };

        self.autoplay = true;
        let chosen = start_track.filter(|id| container.position_of(id).is_some());
        let container_id = container.id.clone();
        let track_ids = container.track_ids.clone();
        self.advance.set_container(container);
        self.begin_switch().await;

        let remote = self.remote.clone();
        let catalog = self.catalog.clone();
        let events_tx = self.events_tx.clone();
        let generation = self.generation;
        self.tasks.push(tokio::spawn(async move {
            let track_id = match chosen {
                Some(track_id) => track_id,
                None => match remote.last_track(&container_id).await {
                    Some(track_id) if track_ids.contains(&track_id) => track_id,
                    _ => first,
                },
            };
            let result = catalog.resolve(&track_id).await;
            let _ = events_tx.send(SessionEvent::Resolved {
                generation,
                track_id,
                start: StartPosition::Resume,
                result,
            });
        }));
    }

    pub async fn next(&mut self) {
        match self.advance.peek_next().map(str::to_string) {
            Some(track_id) => {
                self.autoplay = true;
                self.resolve_and_play(track_id, StartPosition::Resume).await;
            }
            None => debug!("No next track"),
        }
    }

    pub async fn previous(&mut self) {
        match self.advance.peek_previous().map(str::to_string) {
            Some(track_id) => {
                self.autoplay = true;
                self.resolve_and_play(track_id, StartPosition::Resume).await;
            }
            None => debug!("No previous track"),
        }
    }

    pub(crate) async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Reconciled {
                generation,
                position,
            } => {
                if generation != self.generation {
                    debug!("Discarding stale reconciliation for {}", position.track_id);
                    return;
                }
                if let Some(pending) = self.pending.as_mut() {
                    if pending.target.is_none() {
                        info!(
                            "Reconciled {} to {:.1}s (updated {:?})",
                            position.track_id, position.position_seconds, position.updated_at
                        );
                        pending.target = Some(StartTarget::Saved(position.position_seconds));
                    }
                }
                self.try_begin().await;
            }
            SessionEvent::Resolved {
                generation,
                track_id,
                start,
                result,
            } => {
                if generation != self.generation {
                    debug!("Discarding stale track resolution for {}", track_id);
                    return;
                }
                match result {
                    Ok(track) => self.load_track(track, start).await,
                    Err(source) => {
                        self.fail(PlaybackError::Unavailable { track_id, source })
                            .await
                    }
                }
            }
        }
    }

    /// Start playback once the stream is ready and the start position known
    async fn try_begin(&mut self) {
        if self.phase != SyncPhase::Loading {
            return;
        }
        let target = match &self.pending {
            Some(PendingStart {
                target: Some(target),
                metadata_ready: true,
            }) => *target,
            _ => return,
        };
        self.pending = None;

        match target {
            StartTarget::Saved(position) => {
                if let Some(duration) = self.session.duration() {
                    if position > 0.0 && position < duration {
                        let position = self.session.seek(position);
                        info!("Resuming at {:.1}s of {:.1}s", position, duration);
                    }
                }
            }
            StartTarget::Explicit(position) => {
                if position > 0.0 {
                    let position = self.session.seek(position);
                    info!("Starting at {:.1}s", position);
                }
            }
        }

        if self.autoplay {
            if let Err(e) = self.session.start() {
                self.fail(e).await;
                return;
            }
            self.phase = SyncPhase::Playing;
            self.timers.start();
            self.publish(PlaybackEvent::Play);
        } else {
            self.phase = SyncPhase::Paused;
            self.publish(PlaybackEvent::Pause);
        }
    }

    pub async fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::MetadataLoaded { .. } => {
                let accepted = match self.phase {
                    SyncPhase::Loading => self.pending.is_some(),
                    SyncPhase::Playing | SyncPhase::Paused => true,
                    _ => false,
                };
                if !accepted {
                    debug!("Ignoring metadata in {:?}", self.phase);
                    return;
                }
                self.session.apply(&event);
                self.publish(PlaybackEvent::MetadataLoaded);
                if let Some(pending) = self.pending.as_mut() {
                    pending.metadata_ready = true;
                }
                self.try_begin().await;
            }
            MediaEvent::TimeUpdate { .. } => {
                if matches!(self.phase, SyncPhase::Playing | SyncPhase::Paused) {
                    self.session.apply(&event);
                    self.publish(PlaybackEvent::TimeUpdate);
                }
            }
            MediaEvent::Ended => {
                if self.phase != SyncPhase::Playing {
                    debug!("Ignoring end of stream in {:?}", self.phase);
                    return;
                }
                self.session.apply(&event);
                self.end(EndReason::Finished).await;
                self.auto_advance().await;
            }
            MediaEvent::Error { ref message } => {
                if self.session.track().is_none() {
                    warn!("Media error with no track loaded: {}", message);
                    return;
                }
                let error = PlaybackError::Backend(message.clone());
                self.session.apply(&event);
                self.fail(error).await;
            }
        }
    }

    /// Move to `Ended`: flush, stop the timers, drop in-flight work
    pub async fn end(&mut self, reason: EndReason) {
        match self.phase {
            SyncPhase::Playing | SyncPhase::Paused => self.flush().await,
            SyncPhase::Loading => {}
            _ => {
                debug!("End ({:?}) ignored in {:?}", reason, self.phase);
                return;
            }
        }
        if reason != EndReason::Finished {
            self.session.pause();
        }
        self.cancel_session();
        if reason == EndReason::Unload {
            self.session.stop();
            self.advance.clear();
        }

        info!("Session ended ({:?})", reason);
        self.phase = SyncPhase::Ended;
        self.publish(PlaybackEvent::Ended);
    }

    async fn auto_advance(&mut self) {
        match self.advance.advance() {
            Some(track_id) => {
                info!("Auto-advancing to {}", track_id);
                self.autoplay = true;
                self.resolve_and_play(track_id, StartPosition::Beginning)
                    .await;
            }
            None => {
                if let Some(container) = self.advance.container() {
                    info!("Reached the end of container {}", container.id);
                }
            }
        }
    }

    pub async fn pause(&mut self) {
        match self.phase {
            SyncPhase::Playing => {
                self.session.pause();
                self.timers.stop();
                self.flush().await;
                self.phase = SyncPhase::Paused;
                self.publish(PlaybackEvent::Pause);
            }
            SyncPhase::Loading => {
                self.autoplay = false;
            }
            _ => debug!("Pause ignored in {:?}", self.phase),
        }
    }

    pub async fn resume(&mut self) {
        match self.phase {
            SyncPhase::Paused => {
                if let Err(e) = self.session.start() {
                    self.fail(e).await;
                    return;
                }
                self.phase = SyncPhase::Playing;
                self.timers.start();
                self.publish(PlaybackEvent::Play);
            }
            SyncPhase::Loading => {
                self.autoplay = true;
            }
            SyncPhase::Ended | SyncPhase::Failed => {
                if let Some(track) = self.session.track().cloned() {
                    self.play(track, StartPosition::Resume).await;
                }
            }
            SyncPhase::Idle | SyncPhase::Playing => {}
        }
    }

    pub async fn toggle_play(&mut self) {
        match self.phase {
            SyncPhase::Playing => self.pause().await,
            SyncPhase::Loading => self.autoplay = !self.autoplay,
            _ => self.resume().await,
        }
    }

    pub async fn seek_absolute(&mut self, position_seconds: f64) {
        match self.phase {
            SyncPhase::Playing | SyncPhase::Paused => {
                let position = self.session.seek(position_seconds);
                if let Some(track_id) = self.session.track_id().map(str::to_string) {
                    self.cache.save(&track_id, position).await;
                }
                self.publish(PlaybackEvent::Seeked);
            }
            SyncPhase::Loading => {
                // An explicit seek replaces whatever reconciliation would pick
                if let Some(pending) = self.pending.as_mut() {
                    pending.target = Some(StartTarget::Explicit(clamp_position(
                        position_seconds,
                        None,
                    )));
                }
                self.try_begin().await;
            }
            _ => debug!("Seek ignored in {:?}", self.phase),
        }
    }

    pub async fn seek_relative(&mut self, delta_seconds: f64) {
        if matches!(self.phase, SyncPhase::Playing | SyncPhase::Paused) {
            let target = self.session.position() + delta_seconds;
            self.seek_absolute(target).await;
        }
    }

    pub async fn checkpoint(&mut self, checkpoint: Checkpoint) {
        if self.phase != SyncPhase::Playing {
            return;
        }
        let Some(track_id) = self.session.track_id().map(str::to_string) else {
            return;
        };
        let position = clamp_position(self.session.position(), self.session.duration());
        match checkpoint {
            Checkpoint::Local => {
                self.cache.save(&track_id, position).await;
            }
            Checkpoint::Remote => {
                self.remote.push(TrackPosition::now(&track_id, position));
            }
        }
    }

    pub async fn stop(&mut self) {
        if self.phase == SyncPhase::Idle {
            return;
        }
        if matches!(self.phase, SyncPhase::Playing | SyncPhase::Paused) {
            self.flush().await;
        }
        self.cancel_session();
        self.session.stop();
        self.advance.clear();
        self.autoplay = false;
        self.error = None;
        self.phase = SyncPhase::Idle;
        self.publish(PlaybackEvent::Stopped);
    }

    /// Move to `Failed` with the output paused and the last position saved
    async fn fail(&mut self, error: PlaybackError) {
        error!("Playback failed: {}", error);
        if matches!(self.phase, SyncPhase::Playing | SyncPhase::Paused) {
            self.flush().await;
        }
        self.session.pause();
        self.cancel_session();
        self.phase = SyncPhase::Failed;
        self.error = Some(error.to_string());
        self.publish(PlaybackEvent::Error);
    }

    /// Report a request that could not start, leaving the current session alone
    fn reject(&self, error: PlaybackError) {
        warn!("Request rejected: {}", error);
        let mut snapshot = self.snapshot(PlaybackEvent::Error);
        snapshot.error = Some(error.to_string());
        self.broadcast.publish(snapshot);
    }

    /// Final flush when the service goes away
    pub async fn shutdown(&mut self) {
        if matches!(self.phase, SyncPhase::Playing | SyncPhase::Paused) {
            self.flush().await;
        }
        self.cancel_session();
        self.session.stop();
        info!("Synchronization controller shut down");
    }
}
