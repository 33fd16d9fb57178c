use crate::models::{clamp_position, TrackMetadata};
use crate::playback::backend::{MediaBackend, MediaEvent, PlaybackError};
use tracing::debug;

/// Live state of the one media output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_position: f64,
    pub duration: Option<f64>,
    pub current_track: Option<TrackMetadata>,
}

/// Owns the media backend and is the only writer of `PlaybackState`
pub struct PlaybackSession {
    backend: Box<dyn MediaBackend>,
    state: PlaybackState,
}

impl PlaybackSession {
    pub fn new(backend: Box<dyn MediaBackend>) -> Self {
        PlaybackSession {
            backend,
            state: PlaybackState::default(),
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn track(&self) -> Option<&TrackMetadata> {
        self.state.current_track.as_ref()
    }

    pub fn track_id(&self) -> Option<&str> {
        self.state.current_track.as_ref().map(|t| t.id.as_str())
    }

    pub fn position(&self) -> f64 {
        self.state.current_position
    }

    pub fn duration(&self) -> Option<f64> {
        self.state.duration
    }

    /// Point the output at a new stream. Position and duration reset.
    pub fn load(&mut self, track: TrackMetadata) -> Result<(), PlaybackError> {
        self.backend.stop();
        let loaded = self.backend.load(&track.stream_url);
        self.state = PlaybackState {
            is_playing: false,
            current_position: 0.0,
            duration: None,
            current_track: Some(track),
        };
        loaded
    }

    pub fn start(&mut self) -> Result<(), PlaybackError> {
        self.backend.play()?;
        self.state.is_playing = true;
        Ok(())
    }

    pub fn pause(&mut self) {
        self.backend.pause();
        self.state.is_playing = false;
    }

    /// Seek within the known duration, returning the clamped target
    pub fn seek(&mut self, position_seconds: f64) -> f64 {
        let target = clamp_position(position_seconds, self.state.duration);
        self.backend.seek(target);
        self.state.current_position = target;
        target
    }

    pub fn stop(&mut self) {
        self.backend.stop();
        self.state = PlaybackState::default();
    }

    /// Fold a backend event into the state
    pub fn apply(&mut self, event: &MediaEvent) {
        match event {
            MediaEvent::MetadataLoaded { duration } => {
                self.state.duration = (duration.is_finite() && *duration > 0.0).then_some(*duration);
                debug!("Media metadata loaded, duration: {:?}", self.state.duration);
            }
            MediaEvent::TimeUpdate { position } => {
                self.state.current_position = clamp_position(*position, self.state.duration);
            }
            MediaEvent::Ended => {
                self.state.is_playing = false;
                if let Some(duration) = self.state.duration {
                    self.state.current_position = duration;
                }
            }
            MediaEvent::Error { .. } => {
                self.state.is_playing = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mock_backend, track, BackendCall};

    #[test]
    fn test_load_resets_state() {
        let (backend, log) = mock_backend();
        let mut session = PlaybackSession::new(Box::new(backend));

        session.load(track("a")).unwrap();
        session.apply(&MediaEvent::MetadataLoaded { duration: 100.0 });
        session.apply(&MediaEvent::TimeUpdate { position: 40.0 });
        session.load(track("b")).unwrap();

        assert_eq!(session.track_id(), Some("b"));
        assert_eq!(session.position(), 0.0);
        assert_eq!(session.duration(), None);
        assert!(log.calls().contains(&BackendCall::Load("https://cdn.test/b.mp3".into())));
    }

    #[test]
    fn test_seek_is_clamped() {
        let (backend, log) = mock_backend();
        let mut session = PlaybackSession::new(Box::new(backend));
        session.load(track("a")).unwrap();
        session.apply(&MediaEvent::MetadataLoaded { duration: 100.0 });

        assert_eq!(session.seek(250.0), 100.0);
        assert_eq!(session.seek(-5.0), 0.0);
        assert_eq!(log.seeks(), vec![100.0, 0.0]);
    }

    #[test]
    fn test_ended_moves_to_duration() {
        let (backend, _log) = mock_backend();
        let mut session = PlaybackSession::new(Box::new(backend));
        session.load(track("a")).unwrap();
        session.apply(&MediaEvent::MetadataLoaded { duration: 100.0 });
        session.start().unwrap();

        session.apply(&MediaEvent::Ended);
        assert!(!session.state().is_playing);
        assert_eq!(session.position(), 100.0);
    }

    #[test]
    fn test_infinite_duration_is_unknown() {
        let (backend, _log) = mock_backend();
        let mut session = PlaybackSession::new(Box::new(backend));
        session.load(track("live")).unwrap();
        session.apply(&MediaEvent::MetadataLoaded { duration: f64::INFINITY });
        assert_eq!(session.duration(), None);
    }
}
