use crate::models::TrackPosition;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Errors that can occur while reading or writing saved positions
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid track id: {0:?}")]
    InvalidKey(String),
}

/// Trait for on-device position storage (allows mocking for tests)
#[async_trait::async_trait]
pub trait PositionStore: Send + Sync {
    async fn write(&self, record: &TrackPosition) -> Result<(), StorageError>;
    async fn read(&self, track_id: &str) -> Result<Option<TrackPosition>, StorageError>;
}

/// Stores one JSON file per track id under a directory
pub struct FilePositionStore {
    dir: PathBuf,
}

impl FilePositionStore {
    /// Create the store, making sure the directory exists
    pub async fn new(dir: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&dir).await?;
        Ok(FilePositionStore { dir })
    }

    /// Track ids are percent-encoded so they can never escape the directory
    fn record_path(&self, track_id: &str) -> Result<PathBuf, StorageError> {
        if track_id.trim().is_empty() {
            return Err(StorageError::InvalidKey(track_id.to_string()));
        }
        let file_name = format!("{}.json", urlencoding::encode(track_id));
        Ok(self.dir.join(file_name))
    }
}

#[async_trait::async_trait]
impl PositionStore for FilePositionStore {
    async fn write(&self, record: &TrackPosition) -> Result<(), StorageError> {
        let path = self.record_path(&record.track_id)?;
        let json = serde_json::to_vec(record)?;

        // Write next to the target and rename so a crash never leaves half a record
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn read(&self, track_id: &str) -> Result<Option<TrackPosition>, StorageError> {
        let path = self.record_path(track_id)?;
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut record: TrackPosition = serde_json::from_slice(&data)?;
        record.track_id = track_id.to_string();
        Ok(Some(record))
    }
}

/// Local position cache used by the playback path
///
/// Never fails: write errors are logged and dropped, read errors and
/// missing records both come back as the zero position.
#[derive(Clone)]
pub struct PositionCache {
    store: Arc<dyn PositionStore>,
}

impl std::fmt::Debug for PositionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionCache")
            .field("store", &"<dyn PositionStore>")
            .finish()
    }
}

impl PositionCache {
    pub fn new(store: Arc<dyn PositionStore>) -> Self {
        PositionCache { store }
    }

    /// Open a file-backed cache in `dir`
    pub async fn open(dir: PathBuf) -> Result<Self, StorageError> {
        let store = FilePositionStore::new(dir).await?;
        Ok(PositionCache::new(Arc::new(store)))
    }

    /// Save a position stamped with the current time
    pub async fn save(&self, track_id: &str, position_seconds: f64) -> TrackPosition {
        let record = TrackPosition::now(track_id, position_seconds);
        match self.store.write(&record).await {
            Ok(()) => debug!(
                "Saved local position {:.1}s for {}",
                record.position_seconds, track_id
            ),
            Err(e) => warn!("Failed to save local position for {}: {}", track_id, e),
        }
        record
    }

    pub async fn load(&self, track_id: &str) -> TrackPosition {
        match self.store.read(track_id).await {
            Ok(Some(record)) => record,
            Ok(None) => TrackPosition::zero(track_id),
            Err(e) => {
                warn!("Failed to load local position for {}: {}", track_id, e);
                TrackPosition::zero(track_id)
            }
        }
    }
}
