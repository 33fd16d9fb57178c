use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How far a listener got in a track
///
/// `updated_at` is `None` when nothing was ever recorded for the track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPosition {
    #[serde(default)]
    pub track_id: String,
    pub position_seconds: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TrackPosition {
    /// The "no saved position" record
    pub fn zero(track_id: &str) -> Self {
        TrackPosition {
            track_id: track_id.to_string(),
            position_seconds: 0.0,
            updated_at: None,
        }
    }

    /// A record stamped with the current wall-clock time
    pub fn now(track_id: &str, position_seconds: f64) -> Self {
        TrackPosition {
            track_id: track_id.to_string(),
            position_seconds: clamp_position(position_seconds, None),
            updated_at: Some(Utc::now()),
        }
    }
}

/// Clamp a position to `[0, duration]`.
///
/// Negative and non-finite values become 0. An unknown duration only
/// enforces the lower bound.
pub fn clamp_position(position_seconds: f64, duration: Option<f64>) -> f64 {
    if !position_seconds.is_finite() || position_seconds < 0.0 {
        return 0.0;
    }
    match duration {
        Some(duration) if duration.is_finite() && duration > 0.0 => position_seconds.min(duration),
        _ => position_seconds,
    }
}

/// Metadata the caller supplies with a play request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMetadata {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub cover_url: Option<String>,
    pub stream_url: String,
}

/// An ordered group of tracks played as one unit (an audiobook)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: String,
    pub track_ids: Vec<String>,
}

impl Container {
    pub fn new(id: impl Into<String>, track_ids: Vec<String>) -> Self {
        Container {
            id: id.into(),
            track_ids,
        }
    }

    pub fn position_of(&self, track_id: &str) -> Option<usize> {
        self.track_ids.iter().position(|id| id == track_id)
    }
}

/// Where a new session should start
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartPosition {
    /// Reconcile the local and remote records and resume from the newer one
    Resume,
    /// Start at 0 without looking at saved positions
    Beginning,
    /// Start at an explicit position (clamped once the duration is known)
    At(f64),
}
