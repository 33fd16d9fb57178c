use crate::models::TrackMetadata;
use crate::remote::{decode, ApiClient, NetworkError};
use reqwest::StatusCode;

/// Resolves a track id to a playable stream URL and display metadata
#[async_trait::async_trait]
pub trait TrackCatalog: Send + Sync {
    async fn resolve(&self, track_id: &str) -> Result<TrackMetadata, NetworkError>;
}

/// Catalog served by the same API as the remote positions
///
/// `GET {base}/tracks/{trackId}` returns a `TrackMetadata` JSON object.
pub struct HttpTrackCatalog {
    api: ApiClient,
}

impl HttpTrackCatalog {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        HttpTrackCatalog {
            api: ApiClient::new(base_url, auth_token),
        }
    }
}

#[async_trait::async_trait]
impl TrackCatalog for HttpTrackCatalog {
    async fn resolve(&self, track_id: &str) -> Result<TrackMetadata, NetworkError> {
        let request = self.api.get(self.api.url(&["tracks", track_id]));
        match self.api.send(request).await? {
            Some(response) => decode(response).await,
            None => Err(NetworkError::Status {
                status: StatusCode::NOT_FOUND.as_u16(),
                body: format!("track {} not found", track_id),
            }),
        }
    }
}
