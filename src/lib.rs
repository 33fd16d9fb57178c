// Library exports for the playback sync engine and its integration tests

pub mod catalog;
pub mod config;
pub mod media_controls;
pub mod models;
pub mod playback;
pub mod position_store;
pub mod remote;

// Fakes shared by unit and integration tests (hidden from docs)
#[doc(hidden)]
pub mod test_support;

pub use config::SyncConfig;
pub use models::{Container, StartPosition, TrackMetadata, TrackPosition};
pub use playback::{PlaybackHandle, PlaybackService, PlaybackSnapshot, SyncPhase};
