use crate::config::SyncConfig;
use crate::models::TrackPosition;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Remote service not configured: {0}")]
    NotConfigured(String),
}

/// Trait for the server that keeps positions and last-played markers
/// (allows mocking for tests)
#[async_trait::async_trait]
pub trait RemotePositionService: Send + Sync {
    async fn get_position(&self, track_id: &str) -> Result<Option<TrackPosition>, NetworkError>;
    async fn set_position(&self, record: &TrackPosition) -> Result<(), NetworkError>;
    async fn get_last_track(&self, container_id: &str) -> Result<Option<String>, NetworkError>;
    async fn set_last_track(&self, container_id: &str, track_id: &str)
        -> Result<(), NetworkError>;
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionBody {
    #[serde(default)]
    position_seconds: f64,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastTrackBody {
    track_id: Option<String>,
}

/// Shared HTTP plumbing for the positions API: base URL, bearer auth and
/// status handling
pub(crate) struct ApiClient {
    base_url: String,
    auth_token: Option<String>,
    http: reqwest::Client,
}

impl ApiClient {
    pub(crate) fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        ApiClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
            http: reqwest::Client::new(),
        }
    }

    /// `{base}/{segments...}` with every segment percent-encoded
    pub(crate) fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    pub(crate) fn get(&self, url: String) -> reqwest::RequestBuilder {
        self.http.get(url)
    }

    pub(crate) fn put(&self, url: String) -> reqwest::RequestBuilder {
        self.http.put(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Returns `None` on 404, the response on success, an error otherwise
    pub(crate) async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<reqwest::Response>, NetworkError> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(Some(response))
    }
}

pub(crate) async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, NetworkError> {
    response
        .json()
        .await
        .map_err(|e| NetworkError::Decode(e.to_string()))
}

/// JSON-over-HTTP remote service
pub struct HttpRemoteService {
    api: ApiClient,
}

impl HttpRemoteService {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        HttpRemoteService {
            api: ApiClient::new(base_url, auth_token),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, NetworkError> {
        let base_url = config
            .remote_base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| NetworkError::NotConfigured("remote base URL is empty".to_string()))?;
        Ok(Self::new(base_url, config.remote_auth_token.clone()))
    }

    fn progress_url(&self, track_id: &str) -> String {
        self.api.url(&["progress", track_id])
    }

    fn last_track_url(&self, container_id: &str) -> String {
        self.api.url(&["containers", container_id, "last-track"])
    }
}

#[async_trait::async_trait]
impl RemotePositionService for HttpRemoteService {
    async fn get_position(&self, track_id: &str) -> Result<Option<TrackPosition>, NetworkError> {
        let Some(response) = self.api.send(self.api.get(self.progress_url(track_id))).await?
        else {
            return Ok(None);
        };
        let body: PositionBody = decode(response).await?;

        Ok(Some(TrackPosition {
            track_id: track_id.to_string(),
            position_seconds: body.position_seconds,
            updated_at: body.updated_at,
        }))
    }

    async fn set_position(&self, record: &TrackPosition) -> Result<(), NetworkError> {
        let body = PositionBody {
            position_seconds: record.position_seconds,
            updated_at: record.updated_at,
        };
        let request = self.api.put(self.progress_url(&record.track_id)).json(&body);
        match self.api.send(request).await? {
            Some(_) => Ok(()),
            None => Err(NetworkError::Status {
                status: StatusCode::NOT_FOUND.as_u16(),
                body: String::new(),
            }),
        }
    }

    async fn get_last_track(&self, container_id: &str) -> Result<Option<String>, NetworkError> {
        let Some(response) = self
            .api
            .send(self.api.get(self.last_track_url(container_id)))
            .await?
        else {
            return Ok(None);
        };
        let body: LastTrackBody = decode(response).await?;
        Ok(body.track_id.filter(|id| !id.is_empty()))
    }

    async fn set_last_track(
        &self,
        container_id: &str,
        track_id: &str,
    ) -> Result<(), NetworkError> {
        let body = LastTrackBody {
            track_id: Some(track_id.to_string()),
        };
        let request = self.api.put(self.last_track_url(container_id)).json(&body);
        self.api.send(request).await?;
        Ok(())
    }
}

/// Minimum-interval gate, keyed by track id
///
/// A key is admitted when it has never been sent or its last send is at
/// least `window` ago. Admission records the send time.
#[derive(Debug)]
pub struct Throttle {
    window: Duration,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Throttle {
            window,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    pub fn try_acquire(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut last_sent = match self.last_sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match last_sent.get(key) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                // Entries past the window no longer suppress anything
                let window = self.window;
                last_sent.retain(|_, last| now.duration_since(*last) < window);
                last_sent.insert(key.to_string(), now);
                true
            }
        }
    }
}

/// Remote side of synchronization, as seen by the playback path
///
/// Fetches degrade to the zero position, pushes are throttled and
/// fire-and-forget. Nothing here returns an error.
#[derive(Clone)]
pub struct RemotePositions {
    service: Arc<dyn RemotePositionService>,
    throttle: Arc<Throttle>,
}

impl std::fmt::Debug for RemotePositions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePositions")
            .field("service", &"<dyn RemotePositionService>")
            .field("throttle", &self.throttle)
            .finish()
    }
}

impl RemotePositions {
    pub fn new(service: Arc<dyn RemotePositionService>, throttle_window: Duration) -> Self {
        RemotePositions {
            service,
            throttle: Arc::new(Throttle::new(throttle_window)),
        }
    }

    pub async fn fetch(&self, track_id: &str) -> TrackPosition {
        match self.service.get_position(track_id).await {
            Ok(Some(mut record)) => {
                record.track_id = track_id.to_string();
                record
            }
            Ok(None) => TrackPosition::zero(track_id),
            Err(e) => {
                warn!("Failed to fetch remote position for {}: {}", track_id, e);
                TrackPosition::zero(track_id)
            }
        }
    }

    /// Push a record unless the throttle window for its track is still open.
    ///
    /// Returns whether a push was issued. The push itself runs in the
    /// background; a failure is only logged, the next tick sends a newer value.
    pub fn push(&self, record: TrackPosition) -> bool {
        if !self.throttle.try_acquire(&record.track_id) {
            debug!(
                "Remote push for {} throttled ({:.1}s)",
                record.track_id, record.position_seconds
            );
            return false;
        }

        let service = self.service.clone();
        tokio::spawn(async move {
            match service.set_position(&record).await {
                Ok(()) => debug!(
                    "Pushed remote position {:.1}s for {}",
                    record.position_seconds, record.track_id
                ),
                Err(e) => warn!("Failed to push remote position for {}: {}", record.track_id, e),
            }
        });
        true
    }

    pub async fn last_track(&self, container_id: &str) -> Option<String> {
        match self.service.get_last_track(container_id).await {
            Ok(track_id) => track_id,
            Err(e) => {
                warn!("Failed to fetch last track for {}: {}", container_id, e);
                None
            }
        }
    }

    pub fn push_last_track(&self, container_id: &str, track_id: &str) {
        let service = self.service.clone();
        let container_id = container_id.to_string();
        let track_id = track_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = service.set_last_track(&container_id, &track_id).await {
                warn!("Failed to push last track for {}: {}", container_id, e);
            }
        });
    }
}
