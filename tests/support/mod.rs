#![allow(dead_code)]

use playsync::playback::{MediaEvent, PlaybackHandle, PlaybackService, PlaybackSnapshot, SyncPhase};
use playsync::position_store::PositionCache;
use playsync::test_support::{
    mock_backend, settle, BackendLog, MemoryPositionStore, MockRemoteService, StaticTrackCatalog,
};
use playsync::SyncConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A running playback service wired to in-memory fakes
pub struct PlaybackFixture {
    pub handle: PlaybackHandle,
    pub media: mpsc::UnboundedSender<MediaEvent>,
    pub store: Arc<MemoryPositionStore>,
    pub remote: Arc<MockRemoteService>,
    pub catalog: Arc<StaticTrackCatalog>,
    pub backend: BackendLog,
}

impl PlaybackFixture {
    /// Start the service on the current runtime with default intervals
    pub fn start() -> Self {
        Self::start_with(MemoryPositionStore::new(), MockRemoteService::new())
    }

    pub fn start_with(store: MemoryPositionStore, remote: MockRemoteService) -> Self {
        tracing_init();

        let store = Arc::new(store);
        let remote = Arc::new(remote);
        let catalog = Arc::new(StaticTrackCatalog::new());
        let (backend, log) = mock_backend();
        let (media, media_rx) = mpsc::unbounded_channel();

        let handle = PlaybackService::start(
            &SyncConfig::default(),
            Box::new(backend),
            media_rx,
            PositionCache::new(store.clone()),
            remote.clone(),
            catalog.clone(),
            tokio::runtime::Handle::current(),
        );

        PlaybackFixture {
            handle,
            media,
            store,
            remote,
            catalog,
            backend: log,
        }
    }

    /// Report a media event and let the service handle it
    pub async fn media_event(&self, event: MediaEvent) {
        self.media.send(event).expect("service dropped media channel");
        settle().await;
    }

    pub async fn metadata(&self, duration: f64) {
        self.media_event(MediaEvent::MetadataLoaded { duration }).await;
    }

    pub async fn time_update(&self, position: f64) {
        self.media_event(MediaEvent::TimeUpdate { position }).await;
    }

    pub fn state(&self) -> PlaybackSnapshot {
        self.handle.get_state()
    }

    pub fn phase(&self) -> SyncPhase {
        self.state().phase
    }
}

/// Sleep on the (paused) test clock, then let woken tasks run
pub async fn elapse(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}
