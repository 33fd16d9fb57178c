pub mod advance;
pub mod backend;
pub mod progress;
pub mod service;
pub mod session;
pub mod sync;
pub mod timers;

pub use backend::{MediaBackend, MediaEvent, PlaybackError};
pub use progress::{ListenerBroadcast, PlaybackEvent, PlaybackSnapshot, SubscriptionId};
pub use service::{PlaybackCommand, PlaybackHandle, PlaybackService};
pub use session::PlaybackState;
pub use sync::{reconcile, SyncPhase};
