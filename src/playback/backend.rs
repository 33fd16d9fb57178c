use crate::remote::NetworkError;
use thiserror::Error;

/// Errors surfaced to listeners through the snapshot's `error` field
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Media backend error: {0}")]
    Backend(String),
    #[error("No track to play: {0}")]
    NoTrack(String),
    #[error("Track {track_id} unavailable: {source}")]
    Unavailable {
        track_id: String,
        #[source]
        source: NetworkError,
    },
    #[error("Playback service stopped")]
    ServiceStopped,
}

/// Events reported by the media output
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// The stream is ready and its duration is known
    MetadataLoaded { duration: f64 },
    TimeUpdate { position: f64 },
    Ended,
    Error { message: String },
}

/// The underlying media output (audio element, native player, ...)
///
/// Implementations report progress by sending `MediaEvent`s on the channel
/// handed to `PlaybackService::start`. Decoding and transport are theirs.
pub trait MediaBackend: Send {
    fn load(&mut self, stream_url: &str) -> Result<(), PlaybackError>;
    fn play(&mut self) -> Result<(), PlaybackError>;
    fn pause(&mut self);
    fn seek(&mut self, position_seconds: f64);
    fn stop(&mut self);
}
