pub mod handle;

use crate::models::TrackMetadata;
use crate::playback::sync::SyncPhase;
pub use handle::{ListenerBroadcast, SubscriptionId};

/// What caused a snapshot to be published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackEvent {
    Loading,
    MetadataLoaded,
    Play,
    Pause,
    Seeked,
    TimeUpdate,
    Ended,
    Error,
    #[default]
    Stopped,
}

/// State pushed to every listener on each state-affecting event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub current_position: f64,
    pub duration: Option<f64>,
    pub current_track: Option<TrackMetadata>,
    pub error: Option<String>,
    pub phase: SyncPhase,
    pub event: PlaybackEvent,
}

impl PlaybackSnapshot {
    pub fn track_id(&self) -> Option<&str> {
        self.current_track.as_ref().map(|t| t.id.as_str())
    }
}
