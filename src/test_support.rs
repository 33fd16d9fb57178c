// Test support utilities for both unit and integration tests

use crate::catalog::TrackCatalog;
use crate::models::{TrackMetadata, TrackPosition};
use crate::playback::backend::{MediaBackend, PlaybackError};
use crate::position_store::{PositionStore, StorageError};
use crate::remote::{NetworkError, RemotePositionService};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Track metadata with a predictable stream URL
pub fn track(id: &str) -> TrackMetadata {
    TrackMetadata {
        id: id.to_string(),
        title: format!("Track {}", id),
        artist: "Test Artist".to_string(),
        cover_url: None,
        stream_url: format!("https://cdn.test/{}.mp3", id),
    }
}

/// Let spawned tasks (pushes, reconciliation) run to completion
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// In-memory position store
#[derive(Default)]
pub struct MemoryPositionStore {
    records: Mutex<HashMap<String, TrackPosition>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn insert(&self, record: TrackPosition) {
        self.records
            .lock()
            .unwrap()
            .insert(record.track_id.clone(), record);
    }

    pub fn get(&self, track_id: &str) -> Option<TrackPosition> {
        self.records.lock().unwrap().get(track_id).cloned()
    }
}

#[async_trait::async_trait]
impl PositionStore for MemoryPositionStore {
    async fn write(&self, record: &TrackPosition) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.insert(record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, track_id: &str) -> Result<Option<TrackPosition>, StorageError> {
        Ok(self.get(track_id))
    }
}

/// Mock remote service
///
/// Keeps positions and last-played markers in memory and records every
/// push it receives.
#[derive(Default)]
pub struct MockRemoteService {
    positions: Mutex<HashMap<String, TrackPosition>>,
    last_tracks: Mutex<HashMap<String, String>>,
    pushes: Mutex<Vec<TrackPosition>>,
    last_track_pushes: Mutex<Vec<(String, String)>>,
    fetch_delay: Mutex<Option<Duration>>,
    fail: AtomicBool,
}

impl MockRemoteService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_requests(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Delay every position fetch, to keep a reconciliation in flight
    pub fn delay_fetches(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn insert_position(&self, record: TrackPosition) {
        self.positions
            .lock()
            .unwrap()
            .insert(record.track_id.clone(), record);
    }

    pub fn insert_last_track(&self, container_id: &str, track_id: &str) {
        self.last_tracks
            .lock()
            .unwrap()
            .insert(container_id.to_string(), track_id.to_string());
    }

    pub fn pushes(&self) -> Vec<TrackPosition> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn pushes_for(&self, track_id: &str) -> Vec<TrackPosition> {
        self.pushes()
            .into_iter()
            .filter(|record| record.track_id == track_id)
            .collect()
    }

    pub fn last_track_pushes(&self) -> Vec<(String, String)> {
        self.last_track_pushes.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), NetworkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NetworkError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemotePositionService for MockRemoteService {
    async fn get_position(&self, track_id: &str) -> Result<Option<TrackPosition>, NetworkError> {
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check()?;
        Ok(self.positions.lock().unwrap().get(track_id).cloned())
    }

    async fn set_position(&self, record: &TrackPosition) -> Result<(), NetworkError> {
        self.check()?;
        self.pushes.lock().unwrap().push(record.clone());
        self.insert_position(record.clone());
        Ok(())
    }

    async fn get_last_track(&self, container_id: &str) -> Result<Option<String>, NetworkError> {
        self.check()?;
        Ok(self.last_tracks.lock().unwrap().get(container_id).cloned())
    }

    async fn set_last_track(
        &self,
        container_id: &str,
        track_id: &str,
    ) -> Result<(), NetworkError> {
        self.check()?;
        self.last_track_pushes
            .lock()
            .unwrap()
            .push((container_id.to_string(), track_id.to_string()));
        self.insert_last_track(container_id, track_id);
        Ok(())
    }
}

/// Catalog that resolves any id through `track`, except ids marked missing
#[derive(Default)]
pub struct StaticTrackCatalog {
    missing: Mutex<HashSet<String>>,
}

impl StaticTrackCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_missing(&self, track_id: &str) {
        self.missing.lock().unwrap().insert(track_id.to_string());
    }
}

#[async_trait::async_trait]
impl TrackCatalog for StaticTrackCatalog {
    async fn resolve(&self, track_id: &str) -> Result<TrackMetadata, NetworkError> {
        if self.missing.lock().unwrap().contains(track_id) {
            return Err(NetworkError::Status {
                status: 404,
                body: format!("no track {}", track_id),
            });
        }
        Ok(track(track_id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Load(String),
    Play,
    Pause,
    Seek(f64),
    Stop,
}

/// Shared record of the calls a `MockMediaBackend` received
#[derive(Debug, Clone, Default)]
pub struct BackendLog {
    calls: Arc<Mutex<Vec<BackendCall>>>,
}

impl BackendLog {
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Seek(position) => Some(position),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &BackendCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Media backend that only records what it was asked to do
///
/// Tests drive its events by sending `MediaEvent`s on the service's
/// media channel.
pub struct MockMediaBackend {
    log: BackendLog,
}

pub fn mock_backend() -> (MockMediaBackend, BackendLog) {
    let log = BackendLog::default();
    (MockMediaBackend { log: log.clone() }, log)
}

impl MediaBackend for MockMediaBackend {
    fn load(&mut self, stream_url: &str) -> Result<(), PlaybackError> {
        self.log.record(BackendCall::Load(stream_url.to_string()));
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        self.log.record(BackendCall::Play);
        Ok(())
    }

    fn pause(&mut self) {
        self.log.record(BackendCall::Pause);
    }

    fn seek(&mut self, position_seconds: f64) {
        self.log.record(BackendCall::Seek(position_seconds));
    }

    fn stop(&mut self) {
        self.log.record(BackendCall::Stop);
    }
}
