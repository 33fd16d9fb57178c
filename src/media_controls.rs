use crate::playback::{PlaybackCommand, PlaybackHandle};
use tracing::{info, warn};

/// Default skip for seek keys that carry no amount
pub const DEFAULT_SEEK_SECONDS: f64 = 15.0;

/// Transport controls from the OS (media keys, lock screen, headset)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaControlEvent {
    Play,
    Pause,
    Toggle,
    Next,
    Previous,
    Stop,
    /// Relative seek in seconds, negative for backward
    SeekBy(f64),
    SetPosition(f64),
}

/// Map a transport control onto the playback command it stands for
pub fn to_command(event: MediaControlEvent) -> PlaybackCommand {
    match event {
        MediaControlEvent::Play => PlaybackCommand::Resume,
        MediaControlEvent::Pause => PlaybackCommand::Pause,
        MediaControlEvent::Toggle => PlaybackCommand::TogglePlay,
        MediaControlEvent::Next => PlaybackCommand::Next,
        MediaControlEvent::Previous => PlaybackCommand::Previous,
        MediaControlEvent::Stop => PlaybackCommand::Stop,
        MediaControlEvent::SeekBy(delta) => PlaybackCommand::SeekRelative(delta),
        MediaControlEvent::SetPosition(position) => PlaybackCommand::SeekAbsolute(position),
    }
}

pub fn dispatch(playback: &PlaybackHandle, event: MediaControlEvent) {
    info!("Media control event received: {:?}", event);
    if let Err(e) = playback.send_command(to_command(event)) {
        warn!("Media control {:?} dropped: {}", event, e);
    }
}

#[cfg(feature = "os-media-controls")]
pub use os::setup_media_controls;

#[cfg(feature = "os-media-controls")]
mod os {
    use super::{dispatch, MediaControlEvent, DEFAULT_SEEK_SECONDS};
    use crate::playback::{PlaybackHandle, PlaybackSnapshot, SyncPhase};
    use souvlaki::{
        MediaControlEvent as OsEvent, MediaControls, MediaMetadata, MediaPlayback, MediaPosition,
        PlatformConfig, SeekDirection,
    };
    use std::sync::{Arc, Mutex, MutexGuard};
    use std::time::Duration;
    use tracing::{error, info, trace};

    fn signed(direction: SeekDirection, seconds: f64) -> f64 {
        match direction {
            SeekDirection::Forward => seconds,
            SeekDirection::Backward => -seconds,
        }
    }

    fn translate(event: OsEvent) -> Option<MediaControlEvent> {
        Some(match event {
            OsEvent::Play => MediaControlEvent::Play,
            OsEvent::Pause => MediaControlEvent::Pause,
            OsEvent::Toggle => MediaControlEvent::Toggle,
            OsEvent::Next => MediaControlEvent::Next,
            OsEvent::Previous => MediaControlEvent::Previous,
            OsEvent::Stop => MediaControlEvent::Stop,
            OsEvent::Seek(direction) => {
                MediaControlEvent::SeekBy(signed(direction, DEFAULT_SEEK_SECONDS))
            }
            OsEvent::SeekBy(direction, amount) => {
                MediaControlEvent::SeekBy(signed(direction, amount.as_secs_f64()))
            }
            OsEvent::SetPosition(MediaPosition(position)) => {
                MediaControlEvent::SetPosition(position.as_secs_f64())
            }
            _ => return None,
        })
    }

    fn lock(controls: &Mutex<MediaControls>) -> MutexGuard<'_, MediaControls> {
        controls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register with the OS media session and keep it in step with playback
    ///
    /// Returns the MediaControls handle which must be kept alive for the app lifetime
    pub fn setup_media_controls(
        playback: PlaybackHandle,
        display_name: &str,
        runtime_handle: tokio::runtime::Handle,
    ) -> Result<Arc<Mutex<MediaControls>>, souvlaki::Error> {
        let config = PlatformConfig {
            dbus_name: display_name,
            display_name,
            hwnd: None,
        };
        let mut controls = MediaControls::new(config)?;

        let playback_for_events = playback.clone();
        controls.attach(move |event: OsEvent| match translate(event.clone()) {
            Some(event) => dispatch(&playback_for_events, event),
            None => trace!("Unhandled media control event: {:?}", event),
        })?;

        let controls = Arc::new(Mutex::new(controls));
        let controls_for_progress = controls.clone();
        runtime_handle.spawn(async move {
            let mut snapshots = playback.subscribe_channel();
            let mut shown = None;
            while let Some(snapshot) = snapshots.recv().await {
                update(&controls_for_progress, &snapshot, &mut shown);
            }
        });

        info!("Media controls initialized");
        Ok(controls)
    }

    fn update(
        controls: &Mutex<MediaControls>,
        snapshot: &PlaybackSnapshot,
        shown: &mut Option<(Option<String>, Option<f64>)>,
    ) {
        let progress = Some(MediaPosition(Duration::from_secs_f64(
            snapshot.current_position,
        )));
        let playback = match snapshot.phase {
            SyncPhase::Playing => MediaPlayback::Playing { progress },
            SyncPhase::Paused | SyncPhase::Loading => MediaPlayback::Paused { progress },
            SyncPhase::Idle | SyncPhase::Ended | SyncPhase::Failed => MediaPlayback::Stopped,
        };

        let mut controls = lock(controls);
        if let Err(e) = controls.set_playback(playback) {
            error!("Failed to set playback state: {:?}", e);
        }

        // Metadata only changes with the track or its duration
        let key = (snapshot.track_id().map(str::to_string), snapshot.duration);
        if shown.as_ref() == Some(&key) {
            return;
        }
        let metadata = match &snapshot.current_track {
            Some(track) => MediaMetadata {
                title: Some(track.title.as_str()),
                artist: Some(track.artist.as_str()),
                album: None,
                cover_url: track.cover_url.as_deref(),
                duration: snapshot.duration.map(Duration::from_secs_f64),
            },
            None => MediaMetadata::default(),
        };
        if let Err(e) = controls.set_metadata(metadata) {
            error!("Failed to set media metadata: {:?}", e);
        }
        *shown = Some(key);
    }
}
